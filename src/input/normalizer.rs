/// 帧格式归一化
/// I420 / RGB / BGR 原始缓冲区 → RGB图像 (所有下游阶段使用的统一格式)
use image::RgbImage;

use super::frame::{FrameData, FrameFormat};
use crate::error::{ChannelError, ChannelResult};

/// 检查帧是否可用,返回有效的像素缓冲区
///
/// 不做任何颜色转换,代价很低,可以在节流判断之前调用
pub fn validate<'a>(frame: &FrameData<'a>) -> ChannelResult<&'a [u8]> {
    let data = frame
        .data
        .ok_or_else(|| ChannelError::invalid_frame("frame buffer is null"))?;

    if frame.width == 0 || frame.height == 0 {
        return Err(ChannelError::invalid_frame(format!(
            "illegal frame size {}x{}",
            frame.width, frame.height
        )));
    }

    if let FrameFormat::Unknown(tag) = frame.format {
        return Err(ChannelError::invalid_frame(format!(
            "unrecognized frame format tag {}",
            tag
        )));
    }
    let required = frame
        .format
        .required_len(frame.width, frame.height)
        .ok_or_else(|| {
            ChannelError::invalid_frame(format!(
                "frame size {}x{} overflows the addressable buffer",
                frame.width, frame.height
            ))
        })?;

    if data.len() < required {
        return Err(ChannelError::invalid_frame(format!(
            "{} buffer too short: {} < {} bytes for {}x{}",
            frame.format.name(),
            data.len(),
            required,
            frame.width,
            frame.height
        )));
    }

    Ok(data)
}

/// 原始帧 → RGB图像 (纯函数,不修改源缓冲区)
pub fn to_canonical(frame: &FrameData<'_>) -> ChannelResult<RgbImage> {
    let data = validate(frame)?;
    let (w, h) = (frame.width as usize, frame.height as usize);

    let rgb = match frame.format {
        FrameFormat::I420 => i420_to_rgb(data, w, h),
        FrameFormat::Rgb => data[..w * h * 3].to_vec(),
        FrameFormat::Bgr => bgr_to_rgb(&data[..w * h * 3]),
        FrameFormat::Unknown(tag) => {
            return Err(ChannelError::invalid_frame(format!(
                "unrecognized frame format tag {}",
                tag
            )))
        }
    };

    RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| ChannelError::invalid_frame("RGB图像转换失败"))
}

/// I420 → RGB (BT.601 定点系数,乘以128避免浮点)
fn i420_to_rgb(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let uv_stride = width.div_ceil(2);
    let uv_size = uv_stride * height.div_ceil(2);
    let (y_plane, rest) = data.split_at(width * height);
    let (u_plane, rest) = rest.split_at(uv_size);
    let v_plane = &rest[..uv_size];

    let mut out = vec![0u8; width * height * 3];
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * width;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = y_plane[y_row + x] as i32;
            let u_val = u_plane[uv_row + (x >> 1)] as i32 - 128;
            let v_val = v_plane[uv_row + (x >> 1)] as i32 - 128;

            out[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            out[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            out[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
    out
}

/// BGR → RGB (交换B/R通道)
fn bgr_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for px in data.chunks_exact(3) {
        out.push(px[2]);
        out.push(px[1]);
        out.push(px[0]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i420_solid(w: usize, h: usize, y: u8, u: u8, v: u8) -> Vec<u8> {
        let chroma = w.div_ceil(2) * h.div_ceil(2);
        let mut buf = vec![y; w * h];
        buf.extend(std::iter::repeat(u).take(chroma));
        buf.extend(std::iter::repeat(v).take(chroma));
        buf
    }

    #[test]
    fn test_i420_gray() {
        let buf = i420_solid(4, 4, 128, 128, 128);
        let img = to_canonical(&FrameData::new(&buf, 4, 4, FrameFormat::I420)).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
        assert!(img.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn test_i420_red() {
        let buf = i420_solid(2, 2, 76, 85, 255);
        let img = to_canonical(&FrameData::new(&buf, 2, 2, FrameFormat::I420)).unwrap();
        let [r, g, b] = img.get_pixel(1, 1).0;
        assert!(r > 240, "r={}", r);
        assert!(g < 10, "g={}", g);
        assert!(b < 10, "b={}", b);
    }

    #[test]
    fn test_i420_odd_size() {
        let buf = i420_solid(3, 3, 200, 128, 128);
        let img = to_canonical(&FrameData::new(&buf, 3, 3, FrameFormat::I420)).unwrap();
        assert_eq!(img.get_pixel(2, 2).0, [200, 200, 200]);
    }

    #[test]
    fn test_bgr_swaps_channels() {
        let buf = [1u8, 2, 3, 4, 5, 6];
        let img = to_canonical(&FrameData::new(&buf, 2, 1, FrameFormat::Bgr)).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(img.get_pixel(1, 0).0, [6, 5, 4]);
        // 源缓冲区不变
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rgb_passthrough() {
        let buf = [10u8, 20, 30];
        let img = to_canonical(&FrameData::new(&buf, 1, 1, FrameFormat::Rgb)).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_invalid_frames() {
        let null = FrameData::null(4, 4, FrameFormat::Bgr);
        assert!(matches!(to_canonical(&null), Err(ChannelError::InvalidFrame(_))));

        let buf = vec![0u8; 48];
        let unknown = FrameData::new(&buf, 4, 4, FrameFormat::Unknown(5));
        assert!(matches!(to_canonical(&unknown), Err(ChannelError::InvalidFrame(_))));

        let short = FrameData::new(&buf[..40], 4, 4, FrameFormat::Rgb);
        assert!(matches!(to_canonical(&short), Err(ChannelError::InvalidFrame(_))));

        let empty = FrameData::new(&buf, 0, 4, FrameFormat::Rgb);
        assert!(matches!(validate(&empty), Err(ChannelError::InvalidFrame(_))));
    }

    #[test]
    fn test_huge_dimensions_are_invalid() {
        let buf = vec![0u8; 48];
        for format in [FrameFormat::Rgb, FrameFormat::Bgr, FrameFormat::I420] {
            let huge = FrameData::new(&buf, u32::MAX, u32::MAX, format);
            assert!(matches!(validate(&huge), Err(ChannelError::InvalidFrame(_))));
            assert!(matches!(to_canonical(&huge), Err(ChannelError::InvalidFrame(_))));
        }
    }
}
