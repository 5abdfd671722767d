//! 通道流水线集成测试 (使用替身引擎, 不依赖ONNX模型)

use facetrack_rs::detection::{DetectedObject, DetectorEngine, FaceDetection, Rect};
use facetrack_rs::models::landmarks::FivePoints;
use facetrack_rs::recognition::recognizer::REFERENCE_LANDMARKS;
use facetrack_rs::recognition::{
    DefaultRecognizer, EmbeddingEngine, FaceRecognizer, IdentityRecord, IdentitySource,
    LandmarksEngine,
};
use facetrack_rs::{
    Channel, ChannelError, ChannelParams, FrameData, FrameFormat, ProcessOutcome, ResultRect,
};
use image::{Rgb, RgbImage};

// ========== 替身引擎 ==========

/// 每帧返回固定的人脸框
struct FixedDetector(Vec<DetectedObject>);

impl DetectorEngine for FixedDetector {
    fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<DetectedObject>> {
        Ok(self.0.clone())
    }
}

struct FailingDetector;

impl DetectorEngine for FailingDetector {
    fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<DetectedObject>> {
        anyhow::bail!("device lost")
    }
}

struct TemplateLandmarks;

impl LandmarksEngine for TemplateLandmarks {
    fn landmarks(&mut self, crops: &[RgbImage]) -> anyhow::Result<Vec<FivePoints>> {
        Ok(vec![REFERENCE_LANDMARKS; crops.len()])
    }
}

/// 特征 = 平均颜色
struct MeanColor;

impl EmbeddingEngine for MeanColor {
    fn embed(&mut self, faces: &[RgbImage]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(faces
            .iter()
            .map(|f| {
                let n = (f.width() * f.height()) as f32;
                let mut sum = vec![0.0f32; 3];
                for p in f.pixels() {
                    for c in 0..3 {
                        sum[c] += p.0[c] as f32 / n;
                    }
                }
                sum
            })
            .collect())
    }
}

// ========== 辅助函数 ==========

const RED: [u8; 3] = [250, 10, 10];
const GREEN: [u8; 3] = [10, 250, 10];
const BLUE: [u8; 3] = [10, 10, 250];

/// 300×100 三色竖条: 红 | 绿 | 蓝
fn stripes() -> RgbImage {
    RgbImage::from_fn(300, 100, |x, _| match x / 100 {
        0 => Rgb(RED),
        1 => Rgb(GREEN),
        _ => Rgb(BLUE),
    })
}

fn face(x: i32, y: i32, w: i32, h: i32) -> DetectedObject {
    DetectedObject::new(Rect::new(x, y, w, h), 0.95)
}

fn recognizer() -> FaceRecognizer {
    let mut r = DefaultRecognizer::new(
        Box::new(TemplateLandmarks),
        Box::new(MeanColor),
        Box::new(FixedDetector(vec![])),
        0.99,
    );
    r.set_identity_db(IdentitySource::Records(vec![
        IdentityRecord::from_embedding("red", vec![1.0, 0.04, 0.04]),
        IdentityRecord::from_embedding("green", vec![0.04, 1.0, 0.04]),
        IdentityRecord::from_embedding("blue", vec![0.04, 0.04, 1.0]),
    ]))
    .unwrap();
    FaceRecognizer::Default(Box::new(r))
}

fn channel(interval: u32, faces: Vec<DetectedObject>, recognizer: FaceRecognizer) -> Channel {
    let params = ChannelParams {
        detect_interval: interval,
        ..Default::default()
    };
    let detector = FaceDetection::from_engine(Box::new(FixedDetector(faces))).unwrap();
    Channel::with_components(params, detector, recognizer)
}

fn rgb_frame(img: &RgbImage) -> FrameData<'_> {
    FrameData::new(img.as_raw(), img.width(), img.height(), FrameFormat::Rgb)
}

// ========== 测试 ==========

#[test]
fn frame_ids_increase_for_every_call() {
    let img = stripes();
    let mut ch = channel(3, vec![face(20, 20, 40, 40)], FaceRecognizer::Null);

    let null = FrameData::null(300, 100, FrameFormat::Rgb);
    let mut processed_ids = Vec::new();
    for call in 0..7u64 {
        assert_eq!(ch.next_frame_id(), call);
        let outcome = if call == 4 {
            ch.process(&null, false)
        } else {
            ch.process(&rgb_frame(&img), false)
        };
        if let Ok(ProcessOutcome::Processed(results)) = outcome {
            processed_ids.extend(results.iter().map(|r| r.frame_id));
        }
    }
    assert_eq!(ch.next_frame_id(), 7);
    assert_eq!(processed_ids, vec![0, 3, 6]);
}

#[test]
fn throttling_every_third_frame() {
    let img = stripes();
    let mut ch = channel(3, vec![face(20, 20, 40, 40)], FaceRecognizer::Null);

    let outcomes: Vec<bool> = (0..7)
        .map(|_| ch.process(&rgb_frame(&img), false).unwrap().is_throttled())
        .collect();
    assert_eq!(outcomes, vec![false, true, true, false, true, true, false]);
}

#[test]
fn force_overrides_throttling() {
    let img = stripes();
    let mut ch = channel(3, vec![face(20, 20, 40, 40)], FaceRecognizer::Null);

    ch.process(&rgb_frame(&img), false).unwrap();
    let out = ch.process(&rgb_frame(&img), true).unwrap();
    assert!(!out.is_throttled());
    assert_eq!(out.results().len(), 1);
    assert_eq!(out.results()[0].frame_id, 1);
    assert!(ch.process(&rgb_frame(&img), false).unwrap().is_throttled());
}

#[test]
fn identities_stay_aligned_with_detections() {
    let img = stripes();
    // 检测顺序与颜色顺序交错
    let faces = vec![face(220, 20, 40, 40), face(20, 20, 40, 40), face(120, 20, 40, 40)];
    let mut ch = channel(0, faces, recognizer());

    for _ in 0..3 {
        let out = ch.process(&rgb_frame(&img), false).unwrap();
        assert_eq!(out.results().len(), 3);
        for r in out.results() {
            let expected = match r.rect.left / 100 {
                0 => "red",
                1 => "green",
                _ => "blue",
            };
            assert_eq!(r.label, expected, "result {:?}", r);
        }
    }
}

#[test]
fn unknown_faces_have_empty_labels() {
    let img = RgbImage::from_pixel(300, 100, Rgb([128, 128, 128]));
    let mut ch = channel(0, vec![face(20, 20, 40, 40), face(150, 20, 40, 40)], recognizer());

    let out = ch.process(&rgb_frame(&img), false).unwrap();
    assert_eq!(out.results().len(), 2);
    assert!(out.results().iter().all(|r| r.label.is_empty()));
}

#[test]
fn result_rectangle_is_exact() {
    let img = stripes();
    let mut ch = channel(0, vec![face(10, 20, 30, 40)], FaceRecognizer::Null);

    let out = ch.process(&rgb_frame(&img), false).unwrap();
    assert_eq!(
        out.results()[0].rect,
        ResultRect {
            left: 10,
            top: 20,
            right: 40,
            bottom: 60
        }
    );
}

#[test]
fn channel_without_models_reports_nothing() {
    let mut ch = Channel::create(ChannelParams::default()).unwrap();
    let img = stripes();
    for _ in 0..3 {
        let out = ch.process(&rgb_frame(&img), false).unwrap();
        assert_eq!(out, ProcessOutcome::Processed(vec![]));
    }
    ch.destroy();
}

#[test]
fn stationary_face_keeps_track_and_label() {
    let img = stripes();
    let mut ch = channel(0, vec![face(120, 30, 50, 50)], recognizer());

    let mut track_ids = Vec::new();
    for frame in 0..3u64 {
        let out = ch.process(&rgb_frame(&img), false).unwrap();
        assert_eq!(out.results().len(), 1);
        let r = &out.results()[0];
        assert_eq!(r.frame_id, frame);
        if frame >= 1 {
            assert_eq!(r.label, "green");
        }
        track_ids.push(r.track_id);
    }
    assert!(track_ids.iter().all(|&id| id == track_ids[0]));
}

#[test]
fn null_buffer_is_invalid_and_channel_recovers() {
    let img = stripes();
    let mut ch = channel(0, vec![face(20, 20, 40, 40)], FaceRecognizer::Null);

    let err = ch
        .process(&FrameData::null(300, 100, FrameFormat::Bgr), false)
        .unwrap_err();
    assert!(matches!(err, ChannelError::InvalidFrame(_)));
    assert_eq!(err.status_code(), -1);
    assert_eq!(ch.next_frame_id(), 1);

    let out = ch.process(&rgb_frame(&img), false).unwrap();
    assert_eq!(out.results()[0].frame_id, 1);
}

#[test]
fn i420_frames_are_processed() {
    let (w, h) = (64usize, 48usize);
    let chroma = (w / 2) * (h / 2);
    let mut buf = vec![128u8; w * h];
    buf.extend(std::iter::repeat(128u8).take(2 * chroma));

    let mut ch = channel(0, vec![face(10, 10, 20, 20)], FaceRecognizer::Null);
    let out = ch
        .process(&FrameData::new(&buf, w as u32, h as u32, FrameFormat::I420), false)
        .unwrap();
    assert_eq!(out.results().len(), 1);
    assert_eq!(ch.current_frame().unwrap().get_pixel(0, 0).0, [128, 128, 128]);

    let short = &buf[..buf.len() - 1];
    assert!(matches!(
        ch.process(&FrameData::new(short, w as u32, h as u32, FrameFormat::I420), false),
        Err(ChannelError::InvalidFrame(_))
    ));
}

#[test]
fn malformed_gallery_file_keeps_previous_identities() {
    let img = stripes();
    let mut ch = channel(0, vec![face(20, 20, 40, 40)], recognizer());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gallery.json");
    std::fs::write(&path, r#"{"a": [[1.0, 0.0]], "b": [[1.0]]}"#).unwrap();
    assert!(matches!(
        ch.set_identity_db(IdentitySource::File(path)),
        Err(ChannelError::Gallery(_))
    ));

    let out = ch.process(&rgb_frame(&img), false).unwrap();
    assert_eq!(out.results()[0].label, "red");
}

#[test]
fn gallery_file_replaces_identities() {
    let img = stripes();
    let mut ch = channel(0, vec![face(20, 20, 40, 40)], recognizer());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gallery.json");
    std::fs::write(&path, r#"{"crimson": [[1.0, 0.04, 0.04]]}"#).unwrap();
    ch.set_identity_db(IdentitySource::File(path)).unwrap();

    let out = ch.process(&rgb_frame(&img), false).unwrap();
    assert_eq!(out.results()[0].label, "crimson");
}

#[test]
fn gallery_swap_keeps_live_track_labels_correct() {
    let img = stripes();
    let mut ch = channel(0, vec![face(20, 20, 40, 40)], recognizer());

    for _ in 0..3 {
        let out = ch.process(&rgb_frame(&img), false).unwrap();
        assert_eq!(out.results()[0].label, "red");
    }
    let track_id = ch.process(&rgb_frame(&img), false).unwrap().results()[0].track_id;

    // 同一批人换了顺序
    ch.set_identity_db(IdentitySource::Records(vec![
        IdentityRecord::from_embedding("blue", vec![0.04, 0.04, 1.0]),
        IdentityRecord::from_embedding("red", vec![1.0, 0.04, 0.04]),
    ]))
    .unwrap();
    assert_eq!(ch.tracker().active_track_count(), 1);

    let out = ch.process(&rgb_frame(&img), false).unwrap();
    assert_eq!(out.results()[0].track_id, track_id);
    assert_eq!(out.results()[0].label, "red");

    // 旧身份从库中移除后,历史投票不再生效
    ch.set_identity_db(IdentitySource::Records(vec![IdentityRecord::from_embedding(
        "green",
        vec![0.04, 1.0, 0.04],
    )]))
    .unwrap();
    let out = ch.process(&rgb_frame(&img), false).unwrap();
    assert_eq!(out.results()[0].track_id, track_id);
    assert_eq!(out.results()[0].label, "");
}

#[test]
fn detector_failure_is_reported_and_channel_survives() {
    let params = ChannelParams::default();
    let detector = FaceDetection::from_engine(Box::new(FailingDetector)).unwrap();
    let mut ch = Channel::with_components(params, detector, FaceRecognizer::Null);

    let img = stripes();
    let err = ch.process(&rgb_frame(&img), false).unwrap_err();
    assert!(matches!(err, ChannelError::Inference(_)));
    assert!(ch.process(&rgb_frame(&img), false).is_err());
    assert_eq!(ch.next_frame_id(), 2);
}
