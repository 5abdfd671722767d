//! 人脸分析通道 (Face analytics channel)
//!
//! 生命周期: create → process* / set_identity_db* → destroy

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info, warn};

use super::results::{assemble, FaceResult};
use super::stages::Stages;
use super::throttle::ThrottleGate;
use crate::config::ChannelParams;
use crate::detection::{FaceDetection, Tracker, TrackerParams};
use crate::error::{ChannelError, ChannelResult};
use crate::input::{normalizer, FrameData};
use crate::models::{LandmarksModel, ReidModel, SsdFaceDetector};
use crate::ort_backend::OrtEP;
use crate::recognition::{DefaultRecognizer, FaceRecognizer, IdentitySource};

/// 注册人脸库时检测器的置信度阈值
pub const REGISTRATION_DETECT_THRESHOLD: f32 = 0.9;

/// 单次处理的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Processed(Vec<FaceResult>),
    /// 被节流跳过 (不是错误)
    Throttled,
}

impl ProcessOutcome {
    pub fn results(&self) -> &[FaceResult] {
        match self {
            ProcessOutcome::Processed(results) => results,
            ProcessOutcome::Throttled => &[],
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, ProcessOutcome::Throttled)
    }

    /// 兼容C接口的状态码: 处理成功 0, 节流 1
    pub fn status_code(&self) -> i32 {
        match self {
            ProcessOutcome::Processed(_) => 0,
            ProcessOutcome::Throttled => 1,
        }
    }
}

/// 处理结果 → 状态码 (错误见 `ChannelError::status_code`)
pub fn status_code(outcome: &ChannelResult<ProcessOutcome>) -> i32 {
    match outcome {
        Ok(o) => o.status_code(),
        Err(e) => e.status_code(),
    }
}

pub struct Channel {
    params: ChannelParams,
    stages: Stages,
    gate: ThrottleGate,
    /// 下一次调用分配的帧号
    frame_id: u64,
    frame: Option<Arc<RgbImage>>,
    prev_frame: Option<Arc<RgbImage>>,
}

fn creation_failure(what: &str) -> impl Fn(anyhow::Error) -> ChannelError + '_ {
    move |e| ChannelError::creation_failure(format!("{}: {:#}", what, e))
}

impl Channel {
    /// 创建通道: 校验配置 → 选择设备 → 加载模型 → 加载人脸库
    ///
    /// 任何一步失败都返回 `CreationFailure`,不会留下半初始化的通道
    pub fn create(params: ChannelParams) -> ChannelResult<Self> {
        params.validate()?;
        let ep = OrtEP::from_device(params.device_name())
            .map_err(creation_failure("inference device"))?;
        info!("🚀 创建通道 #{} (设备: {})", params.channel_id, ep.name());

        let detector = match params.detect_model() {
            Some(path) => {
                let engine = SsdFaceDetector::new(path, ep, params.detect_threshold)
                    .map_err(creation_failure("face detection model"))?;
                FaceDetection::from_engine(Box::new(engine))?
            }
            None => {
                warn!("⚠️ 未配置人脸检测模型, 检测结果始终为空");
                FaceDetection::Null
            }
        };

        let mut recognizer = match (
            params.detect_model(),
            params.landmarks_model(),
            params.recog_model(),
        ) {
            (Some(det), Some(lm), Some(reid)) => {
                let registration = SsdFaceDetector::new(det, ep, REGISTRATION_DETECT_THRESHOLD)
                    .map_err(creation_failure("registration detector"))?;
                let landmarks = LandmarksModel::new(lm, ep, params.max_batch_size)
                    .map_err(creation_failure("landmarks model"))?;
                let reid = ReidModel::new(reid, ep, params.max_batch_size)
                    .map_err(creation_failure("face recognition model"))?;
                FaceRecognizer::Default(Box::new(DefaultRecognizer::new(
                    Box::new(landmarks),
                    Box::new(reid),
                    Box::new(registration),
                    params.reid_threshold,
                )))
            }
            _ => {
                info!("识别模型未完整配置, 所有人脸标记为未知");
                FaceRecognizer::Null
            }
        };

        if let (Some(gallery), false) = (params.gallery_path(), recognizer.is_null()) {
            recognizer
                .set_identity_db(IdentitySource::File(gallery.to_path_buf()))
                .map_err(|e| ChannelError::creation_failure(format!("reid gallery: {}", e)))?;
        }

        Ok(Self::with_components(params, detector, recognizer))
    }

    /// 使用外部提供的检测器/识别器组装通道 (跳过模型加载)
    pub fn with_components(
        params: ChannelParams,
        detector: FaceDetection,
        recognizer: FaceRecognizer,
    ) -> Self {
        params.print_summary();
        let gate = ThrottleGate::new(params.detect_interval);
        let tracker = Tracker::new(TrackerParams::default());
        Self {
            params,
            stages: Stages::new(detector, recognizer, tracker),
            gate,
            frame_id: 0,
            frame: None,
            prev_frame: None,
        }
    }

    /// 释放通道 (模型、检测线程、缓存帧)
    pub fn destroy(self) {
        info!(
            "🛑 通道 #{} 已销毁 (共处理 {} 帧)",
            self.params.channel_id, self.frame_id
        );
    }

    /// 处理一帧
    ///
    /// 无论成功、节流还是非法帧,帧号都递增一次
    pub fn process(&mut self, frame: &FrameData<'_>, force: bool) -> ChannelResult<ProcessOutcome> {
        let frame_id = self.frame_id;
        self.frame_id += 1;

        if let Err(e) = normalizer::validate(frame) {
            warn!("⚠️ 通道 #{} 帧{}: {}", self.params.channel_id, frame_id, e);
            return Err(e);
        }

        if !self.gate.should_process(frame_id, force) {
            debug!("帧{} 被节流跳过", frame_id);
            return Ok(ProcessOutcome::Throttled);
        }

        debug!(
            "🎬 通道 #{} 帧{} 开始处理 (时间戳: {:?} ms)",
            self.params.channel_id, frame_id, frame.timestamp
        );
        let image = Arc::new(normalizer::to_canonical(frame)?);
        if frame_id > 0 {
            self.prev_frame = self.frame.take();
        }
        self.frame = Some(Arc::clone(&image));

        let tracked = self.stages.run(image, frame_id)?;
        Ok(ProcessOutcome::Processed(assemble(
            &tracked,
            &self.stages.recognizer,
            frame_id,
        )))
    }

    /// 替换人脸库 (在两次处理之间生效)
    ///
    /// 成功后按标签重映射跟踪器中的历史身份,旧库独有的身份作废
    pub fn set_identity_db(&mut self, source: IdentitySource) -> ChannelResult<()> {
        let index_map = self.stages.recognizer.set_identity_db(source)?;
        self.stages.tracker.remap_labels(&index_map);
        Ok(())
    }

    pub fn channel_id(&self) -> i32 {
        self.params.channel_id
    }

    /// 下一次调用将分配的帧号 (= 已调用次数)
    pub fn next_frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn current_frame(&self) -> Option<&RgbImage> {
        self.frame.as_deref()
    }

    pub fn previous_frame(&self) -> Option<&RgbImage> {
        self.prev_frame.as_deref()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.stages.tracker
    }
}
