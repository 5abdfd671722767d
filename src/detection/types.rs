/// 人脸检测/跟踪数据结构定义
/// Data structures for face detection & tracking
use serde::Serialize;

// ========== 公共常量 ==========

/// 未知身份 (Unknown identity sentinel)
pub const UNKNOWN_ID: i32 = -1;

// ========== 数据结构 ==========

/// 整数像素矩形 (x, y, width, height)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 由左上/右下角点构造
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// 中心点
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// 裁剪到图像范围内 [0, w) × [0, h)
    pub fn clip(&self, w: u32, h: u32) -> Rect {
        let (w, h) = (w as i32, h as i32);
        let x1 = self.x.clamp(0, w);
        let y1 = self.y.clamp(0, h);
        let x2 = self.right().clamp(0, w);
        let y2 = self.bottom().clamp(0, h);
        Rect::from_corners(x1, y1, x2, y2)
    }
}

/// 检测框 (Detection bounding box)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectedObject {
    pub rect: Rect,
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(rect: Rect, confidence: f32) -> Self {
        Self { rect, confidence }
    }
}

/// 跟踪对象 (跟踪器输入的候选 / 跟踪器输出的结果共用)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedObject {
    pub rect: Rect,
    pub confidence: f32,
    /// 身份索引,UNKNOWN_ID 表示未知
    pub label: i32,
    /// 跟踪ID (候选阶段为0)
    pub object_id: u32,
    pub frame_idx: u64,
}

impl TrackedObject {
    /// 由检测框 + 身份构造跟踪候选
    pub fn candidate(detection: &DetectedObject, label: i32, frame_idx: u64) -> Self {
        Self {
            rect: detection.rect,
            confidence: detection.confidence,
            label,
            object_id: 0,
            frame_idx,
        }
    }

    /// 身份未知 (未识别或已从人脸库移除)
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_ID
    }
}
