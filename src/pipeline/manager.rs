//! 通道管理器: 句柄 → 通道
//!
//! 不同通道可在不同线程并发处理,同一通道的调用串行执行

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use super::channel::{Channel, ProcessOutcome};
use crate::config::ChannelParams;
use crate::error::{ChannelError, ChannelResult};
use crate::input::FrameData;
use crate::recognition::IdentitySource;

/// 通道句柄 (稳定、不复用)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(pub u64);

#[derive(Default)]
pub struct ChannelManager {
    channels: RwLock<HashMap<ChannelHandle, Arc<Mutex<Channel>>>>,
    next_handle: AtomicU64,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建通道并登记
    pub fn create_channel(&self, params: ChannelParams) -> ChannelResult<ChannelHandle> {
        let channel = Channel::create(params)?;
        Ok(self.insert(channel))
    }

    /// 登记一个已创建的通道
    pub fn insert(&self, channel: Channel) -> ChannelHandle {
        let handle = ChannelHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let channel_id = channel.channel_id();
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, Arc::new(Mutex::new(channel)));
        info!("📋 通道 #{} 已登记: {:?}", channel_id, handle);
        handle
    }

    fn get(&self, handle: ChannelHandle) -> ChannelResult<Arc<Mutex<Channel>>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or(ChannelError::UnknownChannel(handle.0))
    }

    /// 销毁通道; 未知句柄或重复销毁为空操作
    pub fn destroy_channel(&self, handle: ChannelHandle) {
        let removed = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);

        match removed {
            // 其他线程仍持有时, 最后一个引用释放时才真正销毁
            Some(channel) => match Arc::try_unwrap(channel) {
                Ok(mutex) => mutex
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .destroy(),
                Err(_) => debug!("通道 {:?} 仍在使用, 延迟释放", handle),
            },
            None => debug!("销毁未知通道 {:?}, 忽略", handle),
        }
    }

    pub fn process(
        &self,
        handle: ChannelHandle,
        frame: &FrameData<'_>,
        force: bool,
    ) -> ChannelResult<ProcessOutcome> {
        let channel = self.get(handle)?;
        let mut channel = channel.lock().unwrap_or_else(PoisonError::into_inner);
        channel.process(frame, force)
    }

    pub fn set_identity_db(
        &self,
        handle: ChannelHandle,
        source: IdentitySource,
    ) -> ChannelResult<()> {
        let channel = self.get(handle)?;
        let mut channel = channel.lock().unwrap_or_else(PoisonError::into_inner);
        channel.set_identity_db(source)
    }

    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
