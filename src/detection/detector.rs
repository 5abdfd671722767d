//! 人脸检测器 (Face Detector)
//! 职责: 接收规范化帧 → 工作线程执行检测 → 阻塞等待结果

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use tracing::{debug, error, info};

use super::types::DetectedObject;
use crate::error::{ChannelError, ChannelResult};

/// 检测引擎接口 (ONNX模型或测试替身)
pub trait DetectorEngine: Send {
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<DetectedObject>>;
}

type DetectionReply = anyhow::Result<Vec<DetectedObject>>;

/// 工作线程检测器
///
/// 调用顺序: enqueue → submit_request → wait → fetch_results
/// 同一时刻最多一个未完成请求
pub struct AsyncDetection {
    request_tx: Option<Sender<Arc<RgbImage>>>,
    result_rx: Receiver<DetectionReply>,
    worker: Option<JoinHandle<()>>,
    pending: Option<Arc<RgbImage>>,
    in_flight: bool,
    results: Vec<DetectedObject>,
}

impl AsyncDetection {
    pub fn new(mut engine: Box<dyn DetectorEngine>) -> ChannelResult<Self> {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<Arc<RgbImage>>(1);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<DetectionReply>(1);

        let worker = thread::Builder::new()
            .name("face-detector".to_string())
            .spawn(move || {
                debug!("🔍 检测线程启动");
                for image in request_rx.iter() {
                    let reply = engine.detect(&image);
                    if result_tx.send(reply).is_err() {
                        break;
                    }
                }
                debug!("🔍 检测线程退出");
            })
            .map_err(|e| ChannelError::creation_failure(format!("检测线程启动失败: {}", e)))?;

        info!("✅ 人脸检测线程已就绪");

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            worker: Some(worker),
            pending: None,
            in_flight: false,
            results: Vec::new(),
        })
    }

    /// 放入待检测帧 (覆盖之前未提交的帧)
    pub fn enqueue(&mut self, image: Arc<RgbImage>) {
        self.pending = Some(image);
    }

    /// 提交请求到工作线程
    pub fn submit_request(&mut self) -> ChannelResult<()> {
        let Some(image) = self.pending.take() else {
            return Ok(());
        };
        let tx = self
            .request_tx
            .as_ref()
            .ok_or_else(|| ChannelError::inference("检测线程已关闭"))?;
        tx.send(image)
            .map_err(|_| ChannelError::inference("检测线程已退出"))?;
        self.in_flight = true;
        Ok(())
    }

    /// 阻塞等待当前请求完成
    pub fn wait(&mut self) -> ChannelResult<()> {
        if !self.in_flight {
            return Ok(());
        }
        self.in_flight = false;

        match self.result_rx.recv() {
            Ok(Ok(detections)) => {
                self.results = detections;
                Ok(())
            }
            Ok(Err(e)) => {
                error!("❌ 人脸检测失败: {}", e);
                self.results.clear();
                Err(ChannelError::inference(format!("face detection failed: {}", e)))
            }
            Err(_) => {
                self.results.clear();
                Err(ChannelError::inference("检测线程已退出"))
            }
        }
    }

    /// 取出最近一次检测结果
    pub fn fetch_results(&mut self) -> Vec<DetectedObject> {
        std::mem::take(&mut self.results)
    }
}

impl Drop for AsyncDetection {
    fn drop(&mut self) {
        // 关闭请求通道,工作线程随之退出
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("❌ 检测线程异常退出");
            }
        }
    }
}

/// 人脸检测 (创建时二选一)
pub enum FaceDetection {
    /// 未配置检测模型: 永远没有检测结果
    Null,
    Async(AsyncDetection),
}

impl FaceDetection {
    pub fn from_engine(engine: Box<dyn DetectorEngine>) -> ChannelResult<Self> {
        Ok(FaceDetection::Async(AsyncDetection::new(engine)?))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FaceDetection::Null)
    }

    pub fn enqueue(&mut self, image: Arc<RgbImage>) {
        if let FaceDetection::Async(d) = self {
            d.enqueue(image);
        }
    }

    pub fn submit_request(&mut self) -> ChannelResult<()> {
        match self {
            FaceDetection::Null => Ok(()),
            FaceDetection::Async(d) => d.submit_request(),
        }
    }

    pub fn wait(&mut self) -> ChannelResult<()> {
        match self {
            FaceDetection::Null => Ok(()),
            FaceDetection::Async(d) => d.wait(),
        }
    }

    pub fn fetch_results(&mut self) -> Vec<DetectedObject> {
        match self {
            FaceDetection::Null => Vec::new(),
            FaceDetection::Async(d) => d.fetch_results(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Rect;

    struct WidthDetector;

    impl DetectorEngine for WidthDetector {
        fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<DetectedObject>> {
            Ok(vec![DetectedObject::new(
                Rect::new(0, 0, image.width() as i32, image.height() as i32),
                0.9,
            )])
        }
    }

    struct FailingDetector;

    impl DetectorEngine for FailingDetector {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<DetectedObject>> {
            anyhow::bail!("model exploded")
        }
    }

    fn run_once(det: &mut FaceDetection, image: RgbImage) -> ChannelResult<Vec<DetectedObject>> {
        det.enqueue(Arc::new(image));
        det.submit_request()?;
        det.wait()?;
        Ok(det.fetch_results())
    }

    #[test]
    fn test_null_detector_is_empty() {
        let mut det = FaceDetection::Null;
        assert!(run_once(&mut det, RgbImage::new(8, 8)).unwrap().is_empty());
    }

    #[test]
    fn test_worker_round_trip() {
        let mut det = FaceDetection::from_engine(Box::new(WidthDetector)).unwrap();
        for w in [16, 32] {
            let out = run_once(&mut det, RgbImage::new(w, 8)).unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].rect.width, w as i32);
        }
        // 结果取出后清空
        assert!(det.fetch_results().is_empty());
    }

    #[test]
    fn test_wait_without_submit() {
        let mut det = FaceDetection::from_engine(Box::new(WidthDetector)).unwrap();
        det.wait().unwrap();
        assert!(det.fetch_results().is_empty());
    }

    #[test]
    fn test_engine_error_is_reported() {
        let mut det = FaceDetection::from_engine(Box::new(FailingDetector)).unwrap();
        let err = run_once(&mut det, RgbImage::new(4, 4)).unwrap_err();
        assert!(matches!(err, ChannelError::Inference(_)));
        // 失败后仍可继续使用
        assert!(matches!(
            run_once(&mut det, RgbImage::new(4, 4)),
            Err(ChannelError::Inference(_))
        ));
    }
}
