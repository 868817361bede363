/// 检测系统 (Detection System)
///
/// - Detector: 目标检测边界
/// - Tracker:  跨帧目标追踪
pub mod detector;
pub mod object_tracker;
pub mod tracker;
pub mod types;

pub use detector::{load_labels, Detector, ReplayDetector, ReplayScript};
pub use object_tracker::ObjectTracker;
pub use tracker::{compute_iou, TrackedObject, Tracker};
pub use types::{BBox, Detection, INF_SIZE};
