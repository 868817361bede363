/// 帧处理流水线 (Frame Pipeline)
///
/// 双线程架构,通过crossbeam通道通信:
/// - 采集线程: 调用 `submit_frame` (从不阻塞)
/// - 工作线程: 检测 → 坐标映射 → 跟踪 → 导航策略 → 语音去抖
///
/// UI 消费端从 `UiEvent` 通道读取结果。
pub mod controller;

use std::sync::Arc;

pub use controller::FramePipeline;

use crate::detection::tracker::TrackedObject;
use crate::guidance::policy::GuidanceInstruction;
use crate::guidance::speech::Notification;

// ========== 消息类型定义 ==========

/// 相机帧 (采集线程 → 流水线)
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 传感器相对屏幕的旋转角度
    pub rotation: i32,
}

impl CameraFrame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32, rotation: i32) -> Self {
        Self {
            rgba,
            width,
            height,
            rotation,
        }
    }

    /// 纯色帧 (演示/测试用)
    pub fn solid(width: u32, height: u32, rotation: i32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        Self::new(rgba.repeat(pixels), width, height, rotation)
    }
}

/// 提交结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDisposition {
    /// 已交给工作线程
    Dispatched { frame_id: u64 },
    /// 工作线程忙, 帧被丢弃
    Dropped { frame_id: u64 },
}

impl FrameDisposition {
    pub fn frame_id(&self) -> u64 {
        match self {
            FrameDisposition::Dispatched { frame_id } | FrameDisposition::Dropped { frame_id } => {
                *frame_id
            }
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, FrameDisposition::Dispatched { .. })
    }
}

/// 单帧统计 (屏幕调试信息)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame_width: u32,
    pub frame_height: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub inference_ms: f64,
}

/// 渲染快照 (工作线程 → UI)
#[derive(Clone, Debug, Default)]
pub struct RenderSnapshot {
    pub frame_id: u64,
    /// 跟踪结果 (相机帧坐标)
    pub objects: Vec<TrackedObject>,
    pub instruction: Option<GuidanceInstruction>,
    /// 提示是否被语音播报接受
    pub spoken: bool,
    pub stats: FrameStats,
}

/// UI 事件
#[derive(Clone, Debug)]
pub enum UiEvent {
    /// 请求重绘
    Invalidate,
    /// 新的检测结果
    Frame(Arc<RenderSnapshot>),
    /// 提示消息 (替换上一条)
    Notify(Notification),
}

/// 运行时配置消息 (控制端 → 工作线程)
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigMessage {
    UseNnapi(bool),
    NumThreads(usize),
}
