//! 人脸多目标跟踪
//! Multi-face tracker: Kalman预测 + 形状/运动亲和度 + 贪心匹配

use std::collections::HashMap;

use image::RgbImage;
use tracing::debug;

use super::types::{Rect, TrackedObject, UNKNOWN_ID};

// ========== 跟踪参数 ==========

/// 跟踪器参数
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerParams {
    /// 输出前轨迹最少需要的帧数
    pub min_track_duration: usize,
    /// 丢失超过该帧数后轨迹被遗忘 (不再参与匹配)
    pub forget_delay: u64,
    /// 亲和度阈值 (形状 × 运动)
    pub affinity_thr: f32,
    /// 输出矩形的平均窗口
    pub averaging_window_size_for_rects: usize,
    /// 身份投票窗口,None 表示整条轨迹
    pub averaging_window_size_for_labels: Option<usize>,
    /// 候选框高度范围 [min, max]
    pub bbox_heights_range: (i32, i32),
    /// 是否删除被遗忘的轨迹
    pub drop_forgotten_tracks: bool,
    /// 每条轨迹保留的最大对象数,None 表示不限制
    pub max_num_objects_in_track: Option<usize>,
    pub object_type: String,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            min_track_duration: 1,
            forget_delay: 50,
            affinity_thr: 0.8,
            averaging_window_size_for_rects: 1,
            averaging_window_size_for_labels: None,
            bbox_heights_range: (10, 1080),
            drop_forgotten_tracks: false,
            max_num_objects_in_track: None,
            object_type: "face".to_string(),
        }
    }
}

// ========== 卡尔曼滤波器 ==========

/// 简化卡尔曼滤波器 (单个人脸框的位置/尺寸预测)
/// 状态向量: [cx, cy, w, h, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    /// 估计误差协方差 (对角阵)
    p: [f32; 8],
    /// 过程噪声
    q: f32,
    /// 观测噪声
    r: f32,
    /// 速度衰减因子
    velocity_decay: f32,
}

impl KalmanBoxFilter {
    pub fn new(rect: &Rect, q: f32, r: f32) -> Self {
        let (cx, cy) = rect.center();
        Self {
            state: [
                cx,
                cy,
                rect.width as f32,
                rect.height as f32,
                0.0,
                0.0,
                0.0,
                0.0,
            ],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
        }
    }

    /// 预测下一帧状态 (匀速模型 + 速度衰减)
    pub fn predict(&mut self) {
        for i in 4..8 {
            self.state[i] *= self.velocity_decay;
        }
        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }
        for p in self.p.iter_mut() {
            *p += self.q;
        }
    }

    /// 融合观测值
    pub fn update(&mut self, rect: &Rect) {
        let (cx, cy) = rect.center();
        let z = [cx, cy, rect.width as f32, rect.height as f32];

        for i in 0..4 {
            let residual = z[i] - self.state[i];
            let k = self.p[i] / (self.p[i] + self.r);
            let kv = self.p[i + 4] / (self.p[i + 4] + self.r * 10.0);
            self.state[i] += k * residual;
            self.state[i + 4] += kv * residual;
            self.p[i] *= 1.0 - k;
            self.p[i + 4] *= 1.0 - kv;
        }
    }

    /// 当前状态对应的矩形
    pub fn rect(&self) -> Rect {
        let w = self.state[2].max(1.0);
        let h = self.state[3].max(1.0);
        Rect::new(
            (self.state[0] - w / 2.0).round() as i32,
            (self.state[1] - h / 2.0).round() as i32,
            w.round() as i32,
            h.round() as i32,
        )
    }
}

// ========== 轨迹 ==========

#[derive(Clone, Debug)]
struct Track {
    id: u32,
    objects: Vec<TrackedObject>,
    filter: KalmanBoxFilter,
    /// 轨迹累计更新次数
    length: usize,
    last_frame: u64,
    forgotten: bool,
}

impl Track {
    fn new(id: u32, mut object: TrackedObject) -> Self {
        object.object_id = id;
        Self {
            id,
            filter: KalmanBoxFilter::new(&object.rect, 0.5, 5.0),
            last_frame: object.frame_idx,
            objects: vec![object],
            length: 1,
            forgotten: false,
        }
    }

    fn push(&mut self, mut object: TrackedObject, max_objects: Option<usize>) {
        object.object_id = self.id;
        self.filter.update(&object.rect);
        self.last_frame = object.frame_idx;
        self.length += 1;
        self.objects.push(object);
        if let Some(max) = max_objects {
            let max = max.max(1);
            if self.objects.len() > max {
                let excess = self.objects.len() - max;
                self.objects.drain(..excess);
            }
        }
    }

    /// 最近 window 个对象的平均矩形
    fn averaged_rect(&self, window: usize) -> Rect {
        let window = window.clamp(1, self.objects.len());
        let recent = &self.objects[self.objects.len() - window..];
        let n = recent.len() as f64;
        let (mut x, mut y, mut w, mut h) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for o in recent {
            x += o.rect.x as f64;
            y += o.rect.y as f64;
            w += o.rect.width as f64;
            h += o.rect.height as f64;
        }
        Rect::new(
            (x / n).round() as i32,
            (y / n).round() as i32,
            (w / n).round() as i32,
            (h / n).round() as i32,
        )
    }

    /// 身份投票: 出现次数最多的已知身份,次数相同取最近出现的
    fn voted_label(&self, window: Option<usize>) -> i32 {
        let start = match window {
            Some(w) => self.objects.len().saturating_sub(w.max(1)),
            None => 0,
        };

        let mut votes: HashMap<i32, (usize, usize)> = HashMap::new();
        for (pos, o) in self.objects[start..].iter().enumerate() {
            if o.is_unknown() {
                continue;
            }
            let entry = votes.entry(o.label).or_insert((0, pos));
            entry.0 += 1;
            entry.1 = pos;
        }

        votes
            .into_iter()
            .max_by_key(|&(_, (count, last_pos))| (count, last_pos))
            .map(|(label, _)| label)
            .unwrap_or(UNKNOWN_ID)
    }
}

// ========== 跟踪器 ==========

/// 形状亲和度: exp(-(|Δw|/(w1+w2) + |Δh|/(h1+h2)))
fn shape_affinity(a: &Rect, b: &Rect) -> f32 {
    let w_sum = (a.width + b.width).max(1) as f32;
    let h_sum = (a.height + b.height).max(1) as f32;
    let dw = (a.width - b.width).abs() as f32 / w_sum;
    let dh = (a.height - b.height).abs() as f32 / h_sum;
    (-(dw + dh)).exp()
}

/// 运动亲和度: exp(-0.5 (dx²/w² + dy²/h²)), 以候选框尺寸归一化
fn motion_affinity(candidate: &Rect, predicted: &Rect) -> f32 {
    let w = candidate.width.max(1) as f32;
    let h = candidate.height.max(1) as f32;
    let dx = (candidate.x - predicted.x) as f32;
    let dy = (candidate.y - predicted.y) as f32;
    (-0.5 * (dx * dx / (w * w) + dy * dy / (h * h))).exp()
}

/// 人脸跟踪器
pub struct Tracker {
    params: TrackerParams,
    tracks: Vec<Track>,
    next_id: u32,
    last_frame: Option<u64>,
}

impl Tracker {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            params,
            tracks: Vec::new(),
            next_id: 0,
            last_frame: None,
        }
    }

    /// 处理一帧的候选框
    pub fn process(&mut self, frame: &RgbImage, detections: &[TrackedObject], frame_idx: u64) {
        let (fw, fh) = frame.dimensions();
        let (min_h, max_h) = self.params.bbox_heights_range;

        // 1. 候选过滤: 高度范围 + 必须落在画面内
        let candidates: Vec<TrackedObject> = detections
            .iter()
            .filter(|d| d.rect.height >= min_h && d.rect.height <= max_h)
            .filter(|d| !d.rect.clip(fw, fh).is_empty())
            .map(|d| TrackedObject {
                frame_idx,
                ..*d
            })
            .collect();

        // 2. 遗忘长时间丢失的轨迹
        for track in self.tracks.iter_mut().filter(|t| !t.forgotten) {
            if frame_idx.saturating_sub(track.last_frame) > self.params.forget_delay {
                track.forgotten = true;
                debug!("🗑️ 轨迹 #{} 已遗忘 (最后出现: 帧{})", track.id, track.last_frame);
            }
        }
        if self.params.drop_forgotten_tracks {
            self.tracks.retain(|t| !t.forgotten);
        }

        // 3. 预测
        for track in self.tracks.iter_mut().filter(|t| !t.forgotten) {
            track.filter.predict();
        }

        // 4. 匹配
        let matches = self.match_candidates(&candidates);

        let mut candidate_used = vec![false; candidates.len()];
        for (track_idx, cand_idx) in matches {
            candidate_used[cand_idx] = true;
            self.tracks[track_idx].push(candidates[cand_idx], self.params.max_num_objects_in_track);
        }

        // 5. 未匹配候选 → 新轨迹
        for (cand_idx, used) in candidate_used.iter().enumerate() {
            if !used {
                let id = self.next_id;
                self.next_id += 1;
                self.tracks.push(Track::new(id, candidates[cand_idx]));
                debug!("🆕 新轨迹 #{} (帧{})", id, frame_idx);
            }
        }

        self.last_frame = Some(frame_idx);
    }

    /// 贪心匹配: 按亲和度降序,每条轨迹/每个候选最多匹配一次
    fn match_candidates(&self, candidates: &[TrackedObject]) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (t_idx, track) in self.tracks.iter().enumerate() {
            if track.forgotten {
                continue;
            }
            let predicted = track.filter.rect();
            for (c_idx, cand) in candidates.iter().enumerate() {
                let affinity =
                    shape_affinity(&cand.rect, &predicted) * motion_affinity(&cand.rect, &predicted);
                if affinity >= self.params.affinity_thr {
                    pairs.push((affinity, t_idx, c_idx));
                }
            }
        }

        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_used = vec![false; self.tracks.len()];
        let mut cand_used = vec![false; candidates.len()];
        let mut matches = Vec::new();
        for (_, t_idx, c_idx) in pairs {
            if track_used[t_idx] || cand_used[c_idx] {
                continue;
            }
            track_used[t_idx] = true;
            cand_used[c_idx] = true;
            matches.push((t_idx, c_idx));
        }
        matches
    }

    /// 当前帧被更新的轨迹 (按创建顺序),附带投票后的身份和平均矩形
    pub fn tracked_detections_with_labels(&self) -> Vec<TrackedObject> {
        let Some(frame_idx) = self.last_frame else {
            return Vec::new();
        };

        self.tracks
            .iter()
            .filter(|t| !t.forgotten && t.last_frame == frame_idx)
            .filter(|t| t.length >= self.params.min_track_duration)
            .filter_map(|t| {
                let last = t.objects.last()?;
                Some(TrackedObject {
                    rect: t.averaged_rect(self.params.averaging_window_size_for_rects),
                    confidence: last.confidence,
                    label: t.voted_label(self.params.averaging_window_size_for_labels),
                    object_id: t.id,
                    frame_idx,
                })
            })
            .collect()
    }

    /// 累计创建的轨迹数
    pub fn count(&self) -> usize {
        self.next_id as usize
    }

    /// 未被遗忘的轨迹数
    pub fn active_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| !t.forgotten).count()
    }

    /// 人脸库替换后重映射历史身份: `index_map[旧索引] = 新索引`
    ///
    /// 不在映射表中的旧索引变为 UNKNOWN_ID
    pub fn remap_labels(&mut self, index_map: &[i32]) {
        for object in self.tracks.iter_mut().flat_map(|t| t.objects.iter_mut()) {
            if object.is_unknown() {
                continue;
            }
            object.label = usize::try_from(object.label)
                .ok()
                .and_then(|idx| index_map.get(idx).copied())
                .unwrap_or(UNKNOWN_ID);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> RgbImage {
        RgbImage::new(640, 480)
    }

    fn cand(x: i32, y: i32, w: i32, h: i32, label: i32) -> TrackedObject {
        TrackedObject {
            rect: Rect::new(x, y, w, h),
            confidence: 0.9,
            label,
            object_id: 0,
            frame_idx: 0,
        }
    }

    #[test]
    fn test_stationary_face_keeps_id() {
        let mut tracker = Tracker::new(TrackerParams::default());
        let img = frame();
        for f in 0..5 {
            tracker.process(&img, &[cand(100, 100, 60, 60, UNKNOWN_ID)], f);
            let out = tracker.tracked_detections_with_labels();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].object_id, 0);
            assert_eq!(out[0].rect, Rect::new(100, 100, 60, 60));
        }
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_slow_motion_is_matched() {
        let mut tracker = Tracker::new(TrackerParams::default());
        let img = frame();
        for f in 0..10u64 {
            let x = 100 + 4 * f as i32;
            tracker.process(&img, &[cand(x, 100, 60, 60, UNKNOWN_ID)], f);
        }
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_two_faces_get_distinct_ids_in_creation_order() {
        let mut tracker = Tracker::new(TrackerParams::default());
        let img = frame();
        let faces = [cand(50, 50, 60, 60, 0), cand(400, 200, 80, 80, 1)];
        tracker.process(&img, &faces, 0);
        tracker.process(&img, &faces, 1);
        let out = tracker.tracked_detections_with_labels();
        let ids: Vec<u32> = out.iter().map(|o| o.object_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(out[0].label, 0);
        assert_eq!(out[1].label, 1);
    }

    #[test]
    fn test_height_filter() {
        let mut tracker = Tracker::new(TrackerParams::default());
        tracker.process(&frame(), &[cand(10, 10, 5, 5, UNKNOWN_ID)], 0);
        assert!(tracker.tracked_detections_with_labels().is_empty());
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_lost_track_not_reported_then_recovered() {
        let mut tracker = Tracker::new(TrackerParams::default());
        let img = frame();
        tracker.process(&img, &[cand(100, 100, 60, 60, UNKNOWN_ID)], 0);
        tracker.process(&img, &[], 1);
        assert!(tracker.tracked_detections_with_labels().is_empty());
        tracker.process(&img, &[cand(100, 100, 60, 60, UNKNOWN_ID)], 2);
        let out = tracker.tracked_detections_with_labels();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].object_id, 0);
    }

    #[test]
    fn test_forgotten_track_gets_new_id() {
        let mut tracker = Tracker::new(TrackerParams::default());
        let img = frame();
        tracker.process(&img, &[cand(100, 100, 60, 60, 3)], 0);
        tracker.process(&img, &[cand(100, 100, 60, 60, 3)], 51);
        let out = tracker.tracked_detections_with_labels();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].object_id, 1);
        // 默认策略不删除遗忘轨迹
        assert_eq!(tracker.active_track_count(), 1);
        assert_eq!(tracker.count(), 2);
    }

    #[test]
    fn test_drop_forgotten_tracks() {
        let params = TrackerParams {
            drop_forgotten_tracks: true,
            forget_delay: 2,
            ..Default::default()
        };
        let mut tracker = Tracker::new(params);
        let img = frame();
        tracker.process(&img, &[cand(100, 100, 60, 60, UNKNOWN_ID)], 0);
        tracker.process(&img, &[], 5);
        assert_eq!(tracker.tracks.len(), 0);
    }

    #[test]
    fn test_label_vote_majority_and_tie() {
        let mut tracker = Tracker::new(TrackerParams::default());
        let img = frame();
        let labels = [UNKNOWN_ID, 2, 2, 5];
        for (f, &l) in labels.iter().enumerate() {
            tracker.process(&img, &[cand(100, 100, 60, 60, l)], f as u64);
        }
        assert_eq!(tracker.tracked_detections_with_labels()[0].label, 2);

        // 2:2 平局 → 最近出现的身份
        tracker.process(&img, &[cand(100, 100, 60, 60, 5)], 4);
        assert_eq!(tracker.tracked_detections_with_labels()[0].label, 5);
    }

    #[test]
    fn test_remap_labels_after_gallery_swap() {
        let mut tracker = Tracker::new(TrackerParams::default());
        let img = frame();
        for f in 0..3 {
            tracker.process(&img, &[cand(100, 100, 60, 60, 0)], f);
        }
        // 旧库 [red, blue] → 新库 [blue, red]
        tracker.remap_labels(&[1, 0]);
        tracker.process(&img, &[cand(100, 100, 60, 60, 1)], 3);
        assert_eq!(tracker.tracked_detections_with_labels()[0].label, 1);

        // 身份被移除 → 历史标签作废
        tracker.remap_labels(&[]);
        tracker.process(&img, &[cand(100, 100, 60, 60, UNKNOWN_ID)], 4);
        assert_eq!(tracker.tracked_detections_with_labels()[0].label, UNKNOWN_ID);
    }

    #[test]
    fn test_all_unknown_label() {
        let mut tracker = Tracker::new(TrackerParams::default());
        tracker.process(&frame(), &[cand(100, 100, 60, 60, UNKNOWN_ID)], 0);
        assert_eq!(tracker.tracked_detections_with_labels()[0].label, UNKNOWN_ID);
    }

    #[test]
    fn test_min_track_duration() {
        let params = TrackerParams {
            min_track_duration: 2,
            ..Default::default()
        };
        let mut tracker = Tracker::new(params);
        let img = frame();
        tracker.process(&img, &[cand(100, 100, 60, 60, UNKNOWN_ID)], 0);
        assert!(tracker.tracked_detections_with_labels().is_empty());
        tracker.process(&img, &[cand(100, 100, 60, 60, UNKNOWN_ID)], 1);
        assert_eq!(tracker.tracked_detections_with_labels().len(), 1);
    }

    #[test]
    fn test_affinities() {
        let a = Rect::new(0, 0, 50, 50);
        assert!((shape_affinity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((motion_affinity(&a, &a) - 1.0).abs() < 1e-6);
        let far = Rect::new(200, 0, 50, 50);
        assert!(motion_affinity(&far, &a) < 0.01);
    }
}
