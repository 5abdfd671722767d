/// 原始帧格式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// 平面 YUV 4:2:0 (Y平面 + U平面 + V平面)
    I420,
    /// 紧凑RGB
    Rgb,
    /// 紧凑BGR
    Bgr,
    /// 未识别的格式标签
    Unknown(i32),
}

impl From<i32> for FrameFormat {
    fn from(tag: i32) -> Self {
        match tag {
            0 => FrameFormat::I420,
            1 => FrameFormat::Rgb,
            2 => FrameFormat::Bgr,
            other => FrameFormat::Unknown(other),
        }
    }
}

impl FrameFormat {
    /// 给定尺寸下需要的最小字节数,未知格式或尺寸溢出时返回None
    pub fn required_len(&self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        let pixels = w.checked_mul(h)?;
        match self {
            FrameFormat::I420 => {
                let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?;
                pixels.checked_add(chroma.checked_mul(2)?)
            }
            FrameFormat::Rgb | FrameFormat::Bgr => pixels.checked_mul(3),
            FrameFormat::Unknown(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameFormat::I420 => "I420",
            FrameFormat::Rgb => "RGB",
            FrameFormat::Bgr => "BGR",
            FrameFormat::Unknown(_) => "Unknown",
        }
    }
}

/// 一帧原始输入 (借用调用方缓冲区,不做拷贝)
#[derive(Debug, Clone, Copy)]
pub struct FrameData<'a> {
    pub data: Option<&'a [u8]>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub timestamp: Option<u64>, // 毫秒
}

impl<'a> FrameData<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            data: Some(data),
            width,
            height,
            format,
            timestamp: None,
        }
    }

    /// 空缓冲区帧 (对应C接口中的空指针)
    pub fn null(width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            data: None,
            width,
            height,
            format,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
