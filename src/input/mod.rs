/// 视频帧输入 (Frame Input)
///
/// - FrameData:  调用方传入的原始帧 (I420 / RGB / BGR)
/// - Normalizer: 原始帧 → 统一的RGB图像 (canonical image)
pub mod frame;
pub mod normalizer;

pub use frame::{FrameData, FrameFormat};
pub use normalizer::{to_canonical, validate};
