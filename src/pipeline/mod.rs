/// 通道处理流水线 (Channel Pipeline)
///
/// 每个通道一条同步流水线:
/// - Throttle: 检测节流
/// - Stages:   检测 → 识别 → 跟踪
/// - Results:  跟踪对象 → 对外结果
/// - Manager:  多通道句柄管理
pub mod channel;
pub mod manager;
pub mod results;
pub mod stages;
pub mod throttle;

pub use channel::{status_code, Channel, ProcessOutcome};
pub use manager::{ChannelHandle, ChannelManager};
pub use results::{FaceResult, ResultRect};
pub use throttle::ThrottleGate;
