/// 检测系统 (Detection System)
///
/// - Detector: 人脸检测 (独立工作线程)
/// - Tracker:  人脸跟踪
pub mod detector;
pub mod tracker;
pub mod types;

pub use detector::{AsyncDetection, DetectorEngine, FaceDetection};
pub use tracker::{Tracker, TrackerParams};
pub use types::{DetectedObject, Rect, TrackedObject, UNKNOWN_ID};
