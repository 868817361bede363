// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 会话配置参数
pub mod detection; // 检测边界与目标跟踪
pub mod error; // 错误类型
pub mod guidance; // 导航策略与语音播报
pub mod pipeline; // 帧处理流水线
pub mod utils; // 坐标变换

pub use crate::config::GuideConfig;
pub use crate::detection::{BBox, Detection, Detector, ObjectTracker, ReplayDetector, Tracker};
pub use crate::error::{DetectorConfigError, GeometryError, GuideError, Result};
pub use crate::guidance::{ActiveCommand, GuidanceInstruction, LogSpeechEngine, SpeechEngine};
pub use crate::pipeline::{CameraFrame, FrameDisposition, FramePipeline, RenderSnapshot, UiEvent};
