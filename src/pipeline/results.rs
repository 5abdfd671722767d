//! 结果组装: 跟踪对象 → 对外结果

use serde::Serialize;

use crate::detection::TrackedObject;
use crate::recognition::FaceRecognizer;

/// 结果矩形 (left, top, right, bottom)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResultRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// 单个人脸的处理结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FaceResult {
    pub rect: ResultRect,
    pub frame_id: u64,
    /// 身份名称,未知为空字符串
    pub label: String,
    pub track_id: u32,
}

/// 按跟踪器输出顺序生成结果
pub fn assemble(
    tracked: &[TrackedObject],
    recognizer: &FaceRecognizer,
    frame_id: u64,
) -> Vec<FaceResult> {
    tracked
        .iter()
        .map(|obj| FaceResult {
            rect: ResultRect {
                left: obj.rect.x,
                top: obj.rect.y,
                right: obj.rect.right(),
                bottom: obj.rect.bottom(),
            },
            frame_id,
            label: recognizer.label_of(obj.label).to_string(),
            track_id: obj.object_id,
        })
        .collect()
}
