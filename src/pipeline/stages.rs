//! 阶段编排: 检测 → 识别 → 跟踪 (严格顺序)

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, error};

use crate::detection::{FaceDetection, TrackedObject, Tracker, UNKNOWN_ID};
use crate::error::ChannelResult;
use crate::recognition::FaceRecognizer;

pub struct Stages {
    pub detector: FaceDetection,
    pub recognizer: FaceRecognizer,
    pub tracker: Tracker,
}

impl Stages {
    pub fn new(detector: FaceDetection, recognizer: FaceRecognizer, tracker: Tracker) -> Self {
        Self {
            detector,
            recognizer,
            tracker,
        }
    }

    /// 跑一帧完整流水线,返回当前全部跟踪对象
    pub fn run(&mut self, frame: Arc<RgbImage>, frame_id: u64) -> ChannelResult<Vec<TrackedObject>> {
        // 1. 检测 (提交后立即阻塞等待)
        self.detector.enqueue(Arc::clone(&frame));
        self.detector.submit_request()?;
        self.detector.wait()?;
        let detections = self.detector.fetch_results();

        // 2. 识别: 每个检测框一个身份
        let mut ids = self.recognizer.recognize(&frame, &detections);
        if ids.len() != detections.len() {
            error!(
                "❌ 帧{}: 识别结果数量 {} 与检测数量 {} 不一致, 全部视为未知",
                frame_id,
                ids.len(),
                detections.len()
            );
            ids = vec![UNKNOWN_ID; detections.len()];
        }

        // 3. 跟踪候选
        let candidates: Vec<TrackedObject> = detections
            .iter()
            .zip(&ids)
            .map(|(det, &id)| TrackedObject::candidate(det, id, frame_id))
            .collect();

        // 4. 跟踪
        self.tracker.process(&frame, &candidates, frame_id);
        let tracked = self.tracker.tracked_detections_with_labels();
        debug!(
            "帧{}: 检测 {} | 跟踪输出 {}",
            frame_id,
            detections.len(),
            tracked.len()
        );
        Ok(tracked)
    }
}
