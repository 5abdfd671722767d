/// 仿射变换工具模块
/// 人脸对齐: 相似变换估计 + 类似 cv2::warpAffine 的双线性重采样
use image::{Rgb, RgbImage};

/// 仿射变换矩阵 (2x3)
/// | a11 a12 b1 |
/// | a21 a22 b2 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f32,
    pub a12: f32,
    pub b1: f32,
    pub a21: f32,
    pub a22: f32,
    pub b2: f32,
}

impl AffineMatrix {
    /// 创建单位仿射矩阵
    pub fn identity() -> Self {
        Self::scale(1.0, 1.0)
    }

    /// 创建平移矩阵
    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            b1: dx,
            b2: dy,
            ..Self::identity()
        }
    }

    /// 创建缩放矩阵
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a11: sx,
            a12: 0.0,
            b1: 0.0,
            a21: 0.0,
            a22: sy,
            b2: 0.0,
        }
    }

    /// 应用仿射变换到点 (x, y)
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a11 * x + self.a12 * y + self.b1,
            self.a21 * x + self.a22 * y + self.b2,
        )
    }

    /// 计算逆矩阵 (用于反向映射)
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a11 * self.a22 - self.a12 * self.a21;
        if det.abs() < 1e-10 {
            return None;
        }

        let inv_det = 1.0 / det;
        Some(Self {
            a11: self.a22 * inv_det,
            a12: -self.a12 * inv_det,
            b1: (self.a12 * self.b2 - self.a22 * self.b1) * inv_det,
            a21: -self.a21 * inv_det,
            a22: self.a11 * inv_det,
            b2: (self.a21 * self.b1 - self.a11 * self.b2) * inv_det,
        })
    }

    /// 矩阵组合 (self * other)
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            b1: self.a11 * other.b1 + self.a12 * other.b2 + self.b1,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            b2: self.a21 * other.b1 + self.a22 * other.b2 + self.b2,
        }
    }
}

/// 最小二乘估计相似变换 (旋转 + 等比缩放 + 平移), src → dst
///
/// 点数少于2或源点重合时返回 None
pub fn get_similarity_transform(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<AffineMatrix> {
    if src.len() != dst.len() || src.len() < 2 {
        return None;
    }
    let n = src.len() as f32;

    let mean = |pts: &[(f32, f32)]| {
        let (sx, sy) = pts
            .iter()
            .fold((0.0f32, 0.0f32), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (mx, my) = mean(src);
    let (mu, mv) = mean(dst);

    let mut num_a = 0.0f32;
    let mut num_b = 0.0f32;
    let mut denom = 0.0f32;
    for (&(x, y), &(u, v)) in src.iter().zip(dst) {
        let (xs, ys) = (x - mx, y - my);
        let (us, vs) = (u - mu, v - mv);
        num_a += xs * us + ys * vs;
        num_b += xs * vs - ys * us;
        denom += xs * xs + ys * ys;
    }
    if denom < 1e-10 {
        return None;
    }

    let a = num_a / denom;
    let b = num_b / denom;
    Some(AffineMatrix {
        a11: a,
        a12: -b,
        b1: mu - (a * mx - b * my),
        a21: b,
        a22: a,
        b2: mv - (b * mx + a * my),
    })
}

/// 仿射变换 (RGB图像, 双线性插值, 边缘复制)
///
/// # 参数
/// - `src`: 源图像
/// - `matrix`: 源 → 目标 的仿射矩阵
/// - `dst_size`: 目标图像尺寸 (width, height)
///
/// 矩阵不可逆或源图像为空时返回 None
pub fn warp_affine_rgb(
    src: &RgbImage,
    matrix: &AffineMatrix,
    dst_size: (u32, u32),
) -> Option<RgbImage> {
    let (src_w, src_h) = src.dimensions();
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let inv = matrix.inverse()?;

    let (dst_w, dst_h) = dst_size;
    let mut dst = RgbImage::new(dst_w, dst_h);
    let max_x = src_w as i32 - 1;
    let max_y = src_h as i32 - 1;

    for dst_y in 0..dst_h {
        for dst_x in 0..dst_w {
            // 反向映射到源图像坐标
            let (sx, sy) = inv.transform_point(dst_x as f32, dst_y as f32);
            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let px = |x: i32, y: i32| src.get_pixel(x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32);
            let p00 = px(x0, y0);
            let p10 = px(x0 + 1, y0);
            let p01 = px(x0, y0 + 1);
            let p11 = px(x0 + 1, y0 + 1);

            let mut out = [0u8; 3];
            for c in 0..3 {
                let v0 = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
                let v1 = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
                out[c] = (v0 * (1.0 - fy) + v1 * fy).round().clamp(0.0, 255.0) as u8;
            }
            dst.put_pixel(dst_x, dst_y, Rgb(out));
        }
    }

    Some(dst)
}
