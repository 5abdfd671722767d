// 人脸特征提取模型 (Face re-identification)
// 输入: [N, 3, 128, 128] BGR 0-255, 已对齐的人脸
// 输出: [N, 256] (或 [N, 256, 1, 1]) 特征向量

use std::path::Path;

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{Array, IxDyn};

use super::{to_bgr_nchw, Model};
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

pub const REID_INPUT_SIZE: u32 = 128;

pub struct ReidModel {
    engine: OrtBackend,
    size: u32,
}

impl ReidModel {
    pub fn new(model: &Path, ep: OrtEP, max_batch: usize) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig::new(model, ep, max_batch))?;
        Ok(Self {
            engine,
            size: REID_INPUT_SIZE,
        })
    }
}

/// L2 归一化 (零向量保持不变)
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-6 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// 输出张量 → 每张人脸一个归一化特征
fn decode_embeddings(output: &Array<f32, IxDyn>, n: usize) -> Result<Vec<Vec<f32>>> {
    if n == 0 || output.is_empty() || output.len() % n != 0 {
        bail!("unexpected reid output shape {:?} for {} faces", output.shape(), n);
    }

    let values: Vec<f32> = output.iter().copied().collect();
    Ok(values
        .chunks(values.len() / n)
        .map(|v| {
            let mut embedding = v.to_vec();
            l2_normalize(&mut embedding);
            embedding
        })
        .collect())
}

impl Model for ReidModel {
    type Output = Vec<f32>;

    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        to_bgr_nchw(images, self.size, self.size)
    }

    fn postprocess(
        &self,
        ys: Vec<Array<f32, IxDyn>>,
        images: &[RgbImage],
    ) -> Result<Vec<Self::Output>> {
        let Some(output) = ys.first() else {
            bail!("reid model produced no outputs");
        };
        decode_embeddings(output, images.len())
    }

    fn engine_mut(&mut self) -> &mut OrtBackend {
        &mut self.engine
    }
}
