//! 检测系统数据结构定义
//! Data structures for the detection system
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 检测器输入尺寸 (SSD MobileNet 300x300)
pub const INF_SIZE: u32 = 300;

// ========== 数据结构 ==========

/// 检测框 (Axis-aligned bounding box, 左上 + 右下)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 以中心点和宽高构造
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// 水平中点 (方位判断用)
    pub fn mid_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }
}

/// 单帧检测结果 (模型输出, 不可变)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// 返回坐标替换后的新检测 (坐标映射不修改原值)
    pub fn with_bbox(&self, bbox: BBox) -> Self {
        Self {
            label: self.label.clone(),
            confidence: self.confidence,
            bbox,
        }
    }
}
