//! 人脸识别器 (Face Recognizer)
//! 人脸框 → 五点关键点 → 相似变换对齐 → 特征提取 → 人脸库匹配

use image::{imageops, RgbImage};
use tracing::{debug, info, warn};

use super::gallery::{
    read_gallery_file, EmbeddingsGallery, IdentityFace, IdentityRecord, IdentitySource,
};
use crate::detection::{DetectedObject, DetectorEngine, Rect, UNKNOWN_ID};
use crate::error::{ChannelError, ChannelResult};
use crate::models::landmarks::FivePoints;
use crate::models::{LandmarksModel, Model, ReidModel};
use crate::utils::affine_transform::{get_similarity_transform, warp_affine_rgb};

/// 对齐后的人脸尺寸
pub const ALIGNED_FACE_SIZE: u32 = 112;

/// 标准五点模板 (单位正方形内, 基于 96×112 参考人脸)
pub const REFERENCE_LANDMARKS: FivePoints = [
    (30.2946 / 96.0, 51.6963 / 112.0),
    (65.5318 / 96.0, 51.5014 / 112.0),
    (48.0252 / 96.0, 71.7366 / 112.0),
    (33.5493 / 96.0, 92.3655 / 112.0),
    (62.7299 / 96.0, 92.2041 / 112.0),
];

/// 关键点引擎: 人脸裁剪图 → 归一化五点
pub trait LandmarksEngine: Send {
    fn landmarks(&mut self, crops: &[RgbImage]) -> anyhow::Result<Vec<FivePoints>>;
}

/// 特征引擎: 对齐人脸 → 特征向量
pub trait EmbeddingEngine: Send {
    fn embed(&mut self, faces: &[RgbImage]) -> anyhow::Result<Vec<Vec<f32>>>;
}

impl LandmarksEngine for LandmarksModel {
    fn landmarks(&mut self, crops: &[RgbImage]) -> anyhow::Result<Vec<FivePoints>> {
        self.forward_batched(crops)
    }
}

impl EmbeddingEngine for ReidModel {
    fn embed(&mut self, faces: &[RgbImage]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.forward_batched(faces)
    }
}

/// 以人脸中心扩展为正方形,并裁剪到画面内
fn square_crop_rect(rect: &Rect, width: u32, height: u32) -> Rect {
    let side = rect.width.max(rect.height);
    let (cx, cy) = rect.center();
    Rect::new(
        (cx - side as f32 / 2.0).round() as i32,
        (cy - side as f32 / 2.0).round() as i32,
        side,
        side,
    )
    .clip(width, height)
}

/// 完整识别器
pub struct DefaultRecognizer {
    landmarks: Box<dyn LandmarksEngine>,
    reid: Box<dyn EmbeddingEngine>,
    /// 注册用检测器 (人脸库图片中找人脸)
    registration: Box<dyn DetectorEngine>,
    gallery: EmbeddingsGallery,
    face_size: u32,
}

impl DefaultRecognizer {
    pub fn new(
        landmarks: Box<dyn LandmarksEngine>,
        reid: Box<dyn EmbeddingEngine>,
        registration: Box<dyn DetectorEngine>,
        reid_threshold: f32,
    ) -> Self {
        Self {
            landmarks,
            reid,
            registration,
            gallery: EmbeddingsGallery::empty(reid_threshold),
            face_size: ALIGNED_FACE_SIZE,
        }
    }

    pub fn gallery(&self) -> &EmbeddingsGallery {
        &self.gallery
    }

    /// 对齐并提取特征,返回与 rects 一一对应的特征向量
    fn embed_faces(&mut self, image: &RgbImage, rects: &[Rect]) -> anyhow::Result<Vec<Vec<f32>>> {
        if rects.is_empty() {
            return Ok(Vec::new());
        }
        let (w, h) = image.dimensions();

        // 1. 裁剪
        let crop_rects: Vec<Rect> = rects.iter().map(|r| square_crop_rect(r, w, h)).collect();
        let crops: Vec<RgbImage> = crop_rects
            .iter()
            .map(|r| {
                let r = if r.is_empty() { Rect::new(0, 0, 1, 1).clip(w, h) } else { *r };
                imageops::crop_imm(
                    image,
                    r.x as u32,
                    r.y as u32,
                    r.width.max(1) as u32,
                    r.height.max(1) as u32,
                )
                .to_image()
            })
            .collect();

        // 2. 关键点
        let points = self.landmarks.landmarks(&crops)?;
        if points.len() != crops.len() {
            anyhow::bail!("landmarks count {} != faces {}", points.len(), crops.len());
        }

        // 3. 对齐
        let size = self.face_size as f32;
        let template: Vec<(f32, f32)> = REFERENCE_LANDMARKS
            .iter()
            .map(|&(x, y)| (x * size, y * size))
            .collect();

        let mut aligned = Vec::with_capacity(crops.len());
        for ((crop_rect, crop), pts) in crop_rects.iter().zip(&crops).zip(&points) {
            let (cw, ch) = crop.dimensions();
            let src: Vec<(f32, f32)> = pts
                .iter()
                .map(|&(px, py)| {
                    (
                        crop_rect.x as f32 + px * cw as f32,
                        crop_rect.y as f32 + py * ch as f32,
                    )
                })
                .collect();
            let face = get_similarity_transform(&src, &template)
                .and_then(|m| warp_affine_rgb(image, &m, (self.face_size, self.face_size)))
                .unwrap_or_else(|| {
                    // 关键点退化时直接缩放裁剪图
                    imageops::resize(crop, self.face_size, self.face_size, imageops::FilterType::Triangle)
                });
            aligned.push(face);
        }

        // 4. 特征
        let embeddings = self.reid.embed(&aligned)?;
        if embeddings.len() != aligned.len() {
            anyhow::bail!("embeddings count {} != faces {}", embeddings.len(), aligned.len());
        }
        Ok(embeddings)
    }

    /// 每个检测框一个身份索引 (与输入顺序一致)
    pub fn recognize(&mut self, image: &RgbImage, detections: &[DetectedObject]) -> Vec<i32> {
        if detections.is_empty() {
            return Vec::new();
        }
        if self.gallery.is_empty() {
            return vec![UNKNOWN_ID; detections.len()];
        }

        let rects: Vec<Rect> = detections.iter().map(|d| d.rect).collect();
        match self.embed_faces(image, &rects) {
            Ok(embeddings) => self.gallery.identify(&embeddings),
            Err(e) => {
                warn!("⚠️ 人脸识别失败, 本帧全部视为未知: {}", e);
                vec![UNKNOWN_ID; detections.len()]
            }
        }
    }

    pub fn label_of(&self, id: i32) -> &str {
        self.gallery.label_by_id(id)
    }

    /// 注册记录 → 新人脸库 (不修改当前库)
    fn build_gallery(&mut self, records: Vec<IdentityRecord>) -> ChannelResult<EmbeddingsGallery> {
        let mut identities = Vec::with_capacity(records.len());
        for record in records {
            let mut embeddings = Vec::with_capacity(record.faces.len());
            for face in record.faces {
                match face {
                    IdentityFace::Embedding(v) => embeddings.push(v),
                    IdentityFace::Image(img) => {
                        let faces = self.registration.detect(&img).map_err(|e| {
                            ChannelError::gallery(format!(
                                "face detection failed for '{}': {}",
                                record.label, e
                            ))
                        })?;
                        let largest = faces
                            .iter()
                            .max_by_key(|f| f.rect.area())
                            .ok_or_else(|| {
                                ChannelError::gallery(format!(
                                    "no face detected in image for '{}'",
                                    record.label
                                ))
                            })?;
                        let mut embedded = self.embed_faces(&img, &[largest.rect]).map_err(|e| {
                            ChannelError::gallery(format!(
                                "cannot embed face for '{}': {}",
                                record.label, e
                            ))
                        })?;
                        if let Some(v) = embedded.pop() {
                            embeddings.push(v);
                        }
                    }
                }
            }
            identities.push((record.label, embeddings));
        }
        EmbeddingsGallery::from_embeddings(identities, self.gallery.threshold())
    }

    /// 替换人脸库: 全部校验通过才生效,失败时保留旧库
    ///
    /// 返回旧身份索引到新身份索引的映射,供跟踪器修正历史身份
    pub fn set_identity_db(&mut self, source: IdentitySource) -> ChannelResult<Vec<i32>> {
        let records = match source {
            IdentitySource::Records(records) => records,
            IdentitySource::File(path) => read_gallery_file(&path)?,
        };
        let gallery = self.build_gallery(records)?;
        info!("✅ 人脸库已更新: {} 个身份", gallery.len());
        let index_map = gallery.index_map_from(&self.gallery);
        self.gallery = gallery;
        Ok(index_map)
    }
}

/// 人脸识别 (创建时二选一)
pub enum FaceRecognizer {
    /// 模型未配置: 所有人脸都是未知身份
    Null,
    Default(Box<DefaultRecognizer>),
}

impl FaceRecognizer {
    pub fn is_null(&self) -> bool {
        matches!(self, FaceRecognizer::Null)
    }

    pub fn recognize(&mut self, image: &RgbImage, detections: &[DetectedObject]) -> Vec<i32> {
        match self {
            FaceRecognizer::Null => vec![UNKNOWN_ID; detections.len()],
            FaceRecognizer::Default(r) => r.recognize(image, detections),
        }
    }

    pub fn label_of(&self, id: i32) -> &str {
        match self {
            FaceRecognizer::Null => "",
            FaceRecognizer::Default(r) => r.label_of(id),
        }
    }

    pub fn set_identity_db(&mut self, source: IdentitySource) -> ChannelResult<Vec<i32>> {
        match self {
            FaceRecognizer::Null => {
                debug!("识别未启用, 忽略人脸库更新");
                Ok(Vec::new())
            }
            FaceRecognizer::Default(r) => r.set_identity_db(source),
        }
    }
}
