//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use super::types::{BBox, Detection};

// ========== 公共数据结构 ==========

/// 跟踪对象 (跨帧持续存在的同一物体)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    /// 唯一跟踪ID (跟踪期间不复用)
    pub id: u32,

    /// 检测标签
    pub label: String,

    /// 当前边界框 (相机帧坐标)
    pub bbox: BBox,

    /// 最近一次匹配到的检测置信度
    pub confidence: f32,

    /// 最近一次被看到的帧序号
    pub last_seen_frame: u64,

    /// 连续丢失帧数
    pub missed_frames: u32,

    /// 总共被匹配的次数
    pub hits: u32,

    /// 显示颜色 (每个ID不同颜色)
    pub color: (u8, u8, u8),
}

impl TrackedObject {
    pub fn new(id: u32, detection: &Detection, frame_id: u64) -> Self {
        Self {
            id,
            label: detection.label.clone(),
            bbox: detection.bbox,
            confidence: detection.confidence,
            last_seen_frame: frame_id,
            missed_frames: 0,
            hits: 1,
            color: id_to_color(id),
        }
    }

    /// 本轮是否被检测到
    pub fn is_visible(&self) -> bool {
        self.missed_frames == 0
    }

    pub(crate) fn observe(&mut self, detection: &Detection, frame_id: u64) {
        self.bbox = detection.bbox;
        self.confidence = detection.confidence;
        self.last_seen_frame = frame_id;
        self.missed_frames = 0;
        self.hits += 1;
    }

    pub(crate) fn mark_lost(&mut self) {
        self.missed_frames += 1;
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧的检测 (相机帧坐标)
    /// - `frame_id`: 单调递增的帧序号
    ///
    /// # 返回
    /// 当前所有活跃跟踪对象的快照; 空检测列表只会让已有轨迹老化
    fn update(&mut self, detections: &[Detection], frame_id: u64) -> Vec<TrackedObject>;

    /// 重置跟踪器 (清除所有跟踪)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
///
/// 零面积框的IOU恒为0
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
