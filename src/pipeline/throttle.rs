/// 检测节流 (每隔N帧做一次完整检测)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleGate {
    interval: u32,
}

impl ThrottleGate {
    /// interval = 0 或 1 时每帧都处理
    pub fn new(interval: u32) -> Self {
        Self { interval }
    }

    /// 当前帧是否需要跑完整流水线
    pub fn should_process(&self, frame_id: u64, force: bool) -> bool {
        force || self.interval == 0 || frame_id % self.interval as u64 == 0
    }
}
