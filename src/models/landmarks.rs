// 人脸五点关键点回归模型
// 输入: [N, 3, 48, 48] BGR 0-255
// 输出: [N, 10] (或 [N, 10, 1, 1]) = 五个点的 (x, y), 相对人脸裁剪框归一化

use std::path::Path;

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{Array, IxDyn};

use super::{to_bgr_nchw, Model};
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

pub const LANDMARKS_INPUT_SIZE: u32 = 48;

/// 五点关键点: 左眼, 右眼, 鼻尖, 左嘴角, 右嘴角
pub type FivePoints = [(f32, f32); 5];

pub struct LandmarksModel {
    engine: OrtBackend,
    size: u32,
}

impl LandmarksModel {
    pub fn new(model: &Path, ep: OrtEP, max_batch: usize) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig::new(model, ep, max_batch))?;
        Ok(Self {
            engine,
            size: LANDMARKS_INPUT_SIZE,
        })
    }
}

fn decode_points(output: &Array<f32, IxDyn>, n: usize) -> Result<Vec<FivePoints>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    if output.len() < n * 10 {
        bail!("unexpected landmarks output shape {:?}", output.shape());
    }
    let values: Vec<f32> = output.iter().copied().collect();
    let per_face = values.len() / n;

    Ok(values
        .chunks(per_face)
        .take(n)
        .map(|v| {
            let mut pts = [(0.0, 0.0); 5];
            for (i, p) in pts.iter_mut().enumerate() {
                *p = (v[2 * i], v[2 * i + 1]);
            }
            pts
        })
        .collect())
}

impl Model for LandmarksModel {
    type Output = FivePoints;

    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        to_bgr_nchw(images, self.size, self.size)
    }

    fn postprocess(
        &self,
        ys: Vec<Array<f32, IxDyn>>,
        images: &[RgbImage],
    ) -> Result<Vec<Self::Output>> {
        let Some(output) = ys.first() else {
            bail!("landmarks model produced no outputs");
        };
        decode_points(output, images.len())
    }

    fn engine_mut(&mut self) -> &mut OrtBackend {
        &mut self.engine
    }
}
