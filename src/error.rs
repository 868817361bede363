//! 错误类型
//! Error types for the guidance pipeline

use thiserror::Error;

/// 导航流水线结果类型
pub type Result<T> = std::result::Result<T, GuideError>;

/// 导航流水线错误
#[derive(Debug, Error)]
pub enum GuideError {
    /// 坐标变换错误 (编程契约违规)
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// 检测器/模型初始化失败 (致命,会话结束)
    #[error("detector could not be initialized: {0}")]
    DetectorInit(String),

    /// 检测器运行参数修改失败 (可恢复)
    #[error("detector configuration rejected: {0}")]
    DetectorConfig(#[from] DetectorConfigError),

    /// 相机帧数据与尺寸不符
    #[error("invalid camera frame: {0}")]
    InvalidFrame(String),

    /// 语音引擎错误
    #[error("speech engine error: {0}")]
    Speech(String),

    /// 配置错误
    #[error("configuration error: {0}")]
    Config(String),

    /// 流水线已停止
    #[error("pipeline is not running")]
    PipelineStopped,

    /// IO错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON错误
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 仿射变换错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("invalid dimensions {width}x{height}: both sides must be positive")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("transform is not invertible (determinant {determinant:e})")]
    Singular { determinant: f64 },
}

/// 检测器参数修改错误
///
/// 对应推理后端的两类失败: 不支持的加速模式 / 非法线程数
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectorConfigError {
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
