//! 通道错误类型 (Channel error types)

use thiserror::Error;

/// 通道操作结果
pub type ChannelResult<T> = Result<T, ChannelError>;

/// 通道处理过程中可能出现的错误
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 设备/模型初始化失败,通道不可用
    #[error("Channel creation failed: {0}")]
    CreationFailure(String),

    /// 单帧输入非法 (空缓冲区、未知格式、尺寸不符),通道仍然可用
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Identity gallery error: {0}")]
    Gallery(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unknown channel handle: {0}")]
    UnknownChannel(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChannelError {
    pub fn creation_failure(message: impl Into<String>) -> Self {
        Self::CreationFailure(message.into())
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }

    pub fn gallery(message: impl Into<String>) -> Self {
        Self::Gallery(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// 兼容C接口的状态码: 非法帧为 -1,其余错误为 -2
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidFrame(_) => -1,
            _ => -2,
        }
    }
}
