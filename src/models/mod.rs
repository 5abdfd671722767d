/// 模型统一接口与实现
///
/// # 架构说明
///
/// 三个人脸模型都走同一套流程: preprocess → run → postprocess
/// - **SsdFaceDetector**: 人脸检测 (SSD, 输出 [1,1,N,7])
///   - 文件: `face_detection.rs`
/// - **LandmarksModel**: 五点关键点回归 (输出 10 个归一化坐标)
///   - 文件: `landmarks.rs`
/// - **ReidModel**: 人脸特征提取 (输出 256 维向量)
///   - 文件: `reid.rs`
///
/// 推理引擎统一由 `OrtBackend` 提供
use anyhow::{anyhow, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{Array, IxDyn};

use crate::ort_backend::OrtBackend;

/// 统一的深度学习模型接口
///
/// ## 核心流程
/// ```text
/// RGB图片 → preprocess → ndarray张量 (NCHW)
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 每张图片一个结果
/// ```
pub trait Model {
    /// 每张输入图片对应的结果类型
    type Output;

    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine_mut().run(xs)
    }

    /// 后处理: 原始输出 → 结果
    ///
    /// * `images` - 原始图片(用于坐标还原)
    fn postprocess(
        &self,
        ys: Vec<Array<f32, IxDyn>>,
        images: &[RgbImage],
    ) -> Result<Vec<Self::Output>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[RgbImage]) -> Result<Vec<Self::Output>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let xs = self.preprocess(images)?;
        let ys = self.run(xs)?;
        self.postprocess(ys, images)
    }

    /// 按引擎批大小分批执行 forward
    fn forward_batched(&mut self, images: &[RgbImage]) -> Result<Vec<Self::Output>> {
        let batch = self.engine_mut().batch().max(1);
        let mut outputs = Vec::with_capacity(images.len());
        for chunk in images.chunks(batch) {
            outputs.extend(self.forward(chunk)?);
        }
        Ok(outputs)
    }

    /// 获取底层推理引擎的可变引用
    fn engine_mut(&mut self) -> &mut OrtBackend;
}

/// 使用 fast_image_resize 缩放RGB图像
pub fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (w0, h0) = image.dimensions();
    if (w0, h0) == (width, height) {
        return Ok(image.clone());
    }

    let src = fr::images::Image::from_vec_u8(w0, h0, image.as_raw().clone(), fr::PixelType::U8x3)
        .map_err(|e| anyhow!("Failed to wrap source image: {}", e))?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| anyhow!("Failed to resize image: {}", e))?;

    RgbImage::from_raw(width, height, dst.buffer().to_vec())
        .ok_or_else(|| anyhow!("RGB图像转换失败"))
}

/// 缩放后写入 NCHW 张量, BGR 通道顺序, 原始 0-255 取值
pub fn to_bgr_nchw(images: &[RgbImage], width: u32, height: u32) -> Result<Array<f32, IxDyn>> {
    let mut ys = Array::zeros((images.len(), 3, height as usize, width as usize)).into_dyn();
    for (idx, image) in images.iter().enumerate() {
        let resized = resize_rgb(image, width, height)?;
        for (x, y, rgb) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[[idx, 0, y, x]] = b as f32;
            ys[[idx, 1, y, x]] = g as f32;
            ys[[idx, 2, y, x]] = r as f32;
        }
    }
    Ok(ys)
}

// 各模型的具体实现
pub mod face_detection;
pub mod landmarks;
pub mod reid;

// Re-exports
pub use face_detection::SsdFaceDetector;
pub use landmarks::LandmarksModel;
pub use reid::ReidModel;

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_bgr_nchw_layout() {
        let img = RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]));
        let ys = to_bgr_nchw(&[img], 4, 2).unwrap();
        assert_eq!(ys.shape(), &[1, 3, 2, 4]);
        assert_eq!(ys[[0, 0, 1, 3]], 30.0);
        assert_eq!(ys[[0, 1, 0, 0]], 20.0);
        assert_eq!(ys[[0, 2, 0, 0]], 10.0);
    }

    #[test]
    fn test_resize_uniform_image() {
        let img = RgbImage::from_pixel(40, 20, Rgb([90, 90, 90]));
        let out = resize_rgb(&img, 10, 10).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert!(out.pixels().all(|p| p.0 == [90, 90, 90]));
    }
}
