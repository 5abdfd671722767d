/// 人脸识别 (Face Recognition)
///
/// - Gallery:    人脸库 (身份 → 特征)
/// - Recognizer: 检测框 → 身份索引
pub mod gallery;
pub mod recognizer;

pub use gallery::{EmbeddingsGallery, GalleryEntry, IdentityFace, IdentityRecord, IdentitySource};
pub use recognizer::{
    DefaultRecognizer, EmbeddingEngine, FaceRecognizer, LandmarksEngine, ALIGNED_FACE_SIZE,
};
