//! 贪心IOU跟踪器
//! Greedy IoU tracker
//!
//! 核心思想:
//! 1. 只在相同标签之间计算IOU
//! 2. 按IOU降序贪心匹配 (并列时轨迹ID小者优先, 再按检测输入顺序)
//! 3. 未匹配检测 → 新建轨迹; 未匹配轨迹 → 丢失计数+1
//! 4. 丢失超过上限的轨迹被删除

use std::cmp::Ordering;

use super::tracker::{compute_iou, TrackedObject, Tracker};
use super::types::Detection;

/// 默认关联IOU阈值
pub const DEFAULT_ASSOCIATION_IOU: f32 = 0.3;

/// 默认最大允许丢失帧数
pub const DEFAULT_MAX_MISSED_FRAMES: u32 = 10;

/// 候选匹配对
struct Candidate {
    iou: f32,
    track_id: u32,
    track_idx: usize,
    det_idx: usize,
}

/// 贪心IOU追踪器
pub struct ObjectTracker {
    /// 当前跟踪的物体
    tracked_objects: Vec<TrackedObject>,

    /// 下一个分配的ID
    next_id: u32,

    /// 关联IOU阈值
    association_iou: f32,

    /// 最大允许丢失帧数
    max_missed_frames: u32,
}

impl ObjectTracker {
    pub fn new(association_iou: f32, max_missed_frames: u32) -> Self {
        Self {
            tracked_objects: Vec::new(),
            next_id: 1,
            association_iou,
            max_missed_frames,
        }
    }

    /// 当前轨迹 (只读)
    pub fn tracks(&self) -> &[TrackedObject] {
        &self.tracked_objects
    }

    /// IOU 匹配: 返回 (track_idx, det_idx)
    fn match_detections(&self, detections: &[Detection]) -> Vec<(usize, usize)> {
        if detections.is_empty() || self.tracked_objects.is_empty() {
            return Vec::new();
        }

        // 计算同标签的 IOU 候选
        let mut candidates = Vec::new();
        for (track_idx, track) in self.tracked_objects.iter().enumerate() {
            for (det_idx, detection) in detections.iter().enumerate() {
                if detection.label != track.label {
                    continue;
                }
                let iou = compute_iou(&track.bbox, &detection.bbox);
                if iou > 0.0 && iou >= self.association_iou {
                    candidates.push(Candidate {
                        iou,
                        track_id: track.id,
                        track_idx,
                        det_idx,
                    });
                }
            }
        }

        // 贪心匹配: IOU降序, 轨迹ID升序, 检测顺序升序
        candidates.sort_by(|a, b| {
            b.iou
                .partial_cmp(&a.iou)
                .unwrap_or(Ordering::Equal)
                .then(a.track_id.cmp(&b.track_id))
                .then(a.det_idx.cmp(&b.det_idx))
        });

        let mut assignments = Vec::new();
        let mut used_track = vec![false; self.tracked_objects.len()];
        let mut used_det = vec![false; detections.len()];

        for candidate in candidates {
            if !used_track[candidate.track_idx] && !used_det[candidate.det_idx] {
                assignments.push((candidate.track_idx, candidate.det_idx));
                used_track[candidate.track_idx] = true;
                used_det[candidate.det_idx] = true;
            }
        }

        assignments
    }

    /// 获取跟踪统计信息
    pub fn get_stats(&self) -> String {
        format!(
            "跟踪: {} 个 | 总ID: {}",
            self.tracked_objects.len(),
            self.next_id - 1
        )
    }
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ASSOCIATION_IOU, DEFAULT_MAX_MISSED_FRAMES)
    }
}

impl Tracker for ObjectTracker {
    fn update(&mut self, detections: &[Detection], frame_id: u64) -> Vec<TrackedObject> {
        // 1. 匹配
        let assignments = self.match_detections(detections);

        let mut matched_track = vec![false; self.tracked_objects.len()];
        let mut matched_det = vec![false; detections.len()];

        for (track_idx, det_idx) in assignments {
            matched_track[track_idx] = true;
            matched_det[det_idx] = true;
            self.tracked_objects[track_idx].observe(&detections[det_idx], frame_id);
        }

        // 2. 未匹配的轨迹 → 标记丢失
        for (track_idx, &matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracked_objects[track_idx].mark_lost();
            }
        }

        // 3. 未匹配的检测 → 新建轨迹
        for (det_idx, &matched) in matched_det.iter().enumerate() {
            if !matched {
                let tracked = TrackedObject::new(self.next_id, &detections[det_idx], frame_id);
                log::trace!(
                    "🆕 新轨迹 #{} label={} frame={}",
                    tracked.id,
                    tracked.label,
                    frame_id
                );
                self.tracked_objects.push(tracked);
                self.next_id += 1;
            }
        }

        // 4. 删除丢失太久的轨迹
        let max_missed = self.max_missed_frames;
        self.tracked_objects.retain(|t| {
            let keep = t.missed_frames <= max_missed;
            if !keep {
                log::trace!("🗑️  轨迹 #{} ({}) 已退役", t.id, t.label);
            }
            keep
        });

        self.tracked_objects.clone()
    }

    fn reset(&mut self) {
        self.tracked_objects.clear();
    }

    fn track_count(&self) -> usize {
        self.tracked_objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::BBox;

    fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(label, 0.9, BBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn small_shift_keeps_id() {
        let mut tracker = ObjectTracker::default();
        let first = tracker.update(&[det("frontdoor", 100.0, 100.0, 200.0, 200.0)], 1);
        // 平移10% 宽度, IOU ≈ 0.82
        let second = tracker.update(&[det("frontdoor", 110.0, 100.0, 210.0, 200.0)], 2);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].last_seen_frame, 2);
        assert_eq!(second[0].hits, 2);
    }

    #[test]
    fn different_labels_never_match() {
        let mut tracker = ObjectTracker::default();
        let first = tracker.update(&[det("frontdoor", 0.0, 0.0, 100.0, 100.0)], 1);
        let second = tracker.update(&[det("backdoor", 0.0, 0.0, 100.0, 100.0)], 2);
        assert_eq!(second.len(), 2);
        let backdoor = second.iter().find(|t| t.label == "backdoor").unwrap();
        assert_ne!(backdoor.id, first[0].id);
    }

    #[test]
    fn track_retires_after_limit_plus_one_misses() {
        let limit = 3;
        let mut tracker = ObjectTracker::new(0.3, limit);
        tracker.update(&[det("stop", 0.0, 0.0, 50.0, 50.0)], 1);

        // N 次丢失后仍存在
        for frame in 2..(2 + limit as u64) {
            let tracks = tracker.update(&[], frame);
            assert_eq!(tracks.len(), 1, "frame {}", frame);
        }
        assert_eq!(tracker.tracks()[0].missed_frames, limit);

        // 第 N+1 次丢失后被删除
        let tracks = tracker.update(&[], 2 + limit as u64);
        assert!(tracks.is_empty());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn ids_are_not_reused() {
        let mut tracker = ObjectTracker::new(0.3, 0);
        let a = tracker.update(&[det("stop", 0.0, 0.0, 10.0, 10.0)], 1);
        tracker.update(&[], 2);
        let b = tracker.update(&[det("stop", 0.0, 0.0, 10.0, 10.0)], 3);
        assert!(b[0].id > a[0].id);

        // reset 后ID继续递增
        tracker.reset();
        assert_eq!(tracker.track_count(), 0);
        let c = tracker.update(&[det("stop", 0.0, 0.0, 10.0, 10.0)], 4);
        assert!(c[0].id > b[0].id);
    }

    #[test]
    fn duplicate_detections_spawn_second_track() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[det("stoppoint", 0.0, 0.0, 10.0, 10.0)], 1);
        let tracks = tracker.update(
            &[
                det("stoppoint", 0.0, 0.0, 10.0, 10.0),
                det("stoppoint", 0.0, 0.0, 10.0, 10.0),
            ],
            2,
        );
        // 一个轨迹每轮最多匹配一个检测
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, 1);
        assert_eq!(tracks[0].hits, 2);
        assert_eq!(tracks[1].id, 2);
    }

    #[test]
    fn higher_overlap_wins_and_ties_prefer_lower_track_id() {
        let mut tracker = ObjectTracker::default();
        // 两条同位置轨迹 (id 1, 2)
        tracker.update(
            &[
                det("frontdoor", 0.0, 0.0, 100.0, 100.0),
                det("frontdoor", 0.0, 0.0, 100.0, 100.0),
            ],
            1,
        );
        // 一个检测与两者IOU相同 → 分配给ID较小的轨迹
        let tracks = tracker.update(&[det("frontdoor", 0.0, 0.0, 100.0, 100.0)], 2);
        let t1 = tracks.iter().find(|t| t.id == 1).unwrap();
        let t2 = tracks.iter().find(|t| t.id == 2).unwrap();
        assert!(t1.is_visible());
        assert_eq!(t2.missed_frames, 1);
    }

    #[test]
    fn zero_area_detection_never_matches() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[det("stop", 5.0, 5.0, 5.0, 5.0)], 1);
        let tracks = tracker.update(&[det("stop", 5.0, 5.0, 5.0, 5.0)], 2);
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn large_jump_spawns_new_track() {
        let mut tracker = ObjectTracker::default();
        tracker.update(&[det("83bus", 0.0, 0.0, 100.0, 100.0)], 1);
        let tracks = tracker.update(&[det("83bus", 300.0, 0.0, 400.0, 100.0)], 2);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracker.get_stats(), "跟踪: 2 个 | 总ID: 2");
    }
}
