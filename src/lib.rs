// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 通道配置参数
pub mod detection; // 人脸检测 + 跟踪
pub mod error; // 通道错误类型
pub mod input; // 视频帧输入
pub mod models; // 模型接口与具体实现
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod pipeline; // 通道流水线
pub mod recognition; // 人脸识别 + 人脸库
pub mod utils; // 仿射变换等工具

pub use crate::config::ChannelParams;
pub use crate::detection::{DetectedObject, Rect, TrackedObject, UNKNOWN_ID};
pub use crate::error::{ChannelError, ChannelResult};
pub use crate::input::{FrameData, FrameFormat};
pub use crate::models::Model;
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{
    status_code, Channel, ChannelHandle, ChannelManager, FaceResult, ProcessOutcome, ResultRect,
};
pub use crate::recognition::{IdentityFace, IdentityRecord, IdentitySource};
