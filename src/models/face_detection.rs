// SSD 人脸检测模型
// 输入: [N, 3, 300, 300] BGR 0-255
// 输出: [1, 1, K, 7] = (image_id, label, conf, x_min, y_min, x_max, y_max), 坐标归一化

use std::path::Path;

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{Array, Axis, IxDyn};
use tracing::debug;

use super::{to_bgr_nchw, Model};
use crate::detection::{DetectedObject, DetectorEngine, Rect};
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

pub const SSD_INPUT_SIZE: u32 = 300;

pub struct SsdFaceDetector {
    engine: OrtBackend,
    width: u32,
    height: u32,
    conf: f32,
}

impl SsdFaceDetector {
    pub fn new(model: &Path, ep: OrtEP, conf: f32) -> Result<Self> {
        // 检测模型逐帧推理,批大小固定为1
        let engine = OrtBackend::build(OrtConfig::new(model, ep, 1))?;
        Ok(Self {
            engine,
            width: SSD_INPUT_SIZE,
            height: SSD_INPUT_SIZE,
            conf,
        })
    }
}

/// 解码 SSD 输出行,按 image_id 分组
fn decode_ssd_rows(
    output: &Array<f32, IxDyn>,
    images: &[RgbImage],
    conf: f32,
) -> Result<Vec<Vec<DetectedObject>>> {
    if output.len() % 7 != 0 {
        bail!("unexpected SSD output shape {:?}", output.shape());
    }
    let rows = output
        .to_shape((output.len() / 7, 7))
        .map_err(|e| anyhow::anyhow!("Failed to reshape SSD output: {}", e))?;

    let mut results = vec![Vec::new(); images.len()];
    for row in rows.axis_iter(Axis(0)) {
        let image_id = row[0];
        if image_id < 0.0 {
            break;
        }
        let score = row[2];
        if score < conf {
            continue;
        }
        let Some(image) = images.get(image_id as usize) else {
            continue;
        };
        let (w, h) = image.dimensions();
        let rect = Rect::from_corners(
            (row[3] * w as f32).round() as i32,
            (row[4] * h as f32).round() as i32,
            (row[5] * w as f32).round() as i32,
            (row[6] * h as f32).round() as i32,
        )
        .clip(w, h);
        if rect.is_empty() {
            continue;
        }
        results[image_id as usize].push(DetectedObject::new(rect, score));
    }
    Ok(results)
}

impl Model for SsdFaceDetector {
    type Output = Vec<DetectedObject>;

    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        to_bgr_nchw(images, self.width, self.height)
    }

    fn postprocess(
        &self,
        ys: Vec<Array<f32, IxDyn>>,
        images: &[RgbImage],
    ) -> Result<Vec<Self::Output>> {
        let Some(output) = ys.first() else {
            bail!("SSD model produced no outputs");
        };
        decode_ssd_rows(output, images, self.conf)
    }

    fn engine_mut(&mut self) -> &mut OrtBackend {
        &mut self.engine
    }
}

impl DetectorEngine for SsdFaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedObject>> {
        let mut results = self.forward(std::slice::from_ref(image))?;
        let faces = results.pop().unwrap_or_default();
        debug!("👤 检测到 {} 张人脸", faces.len());
        Ok(faces)
    }
}
