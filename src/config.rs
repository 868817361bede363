//! 会话配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detection::types::INF_SIZE;
use crate::error::{GuideError, Result};
use crate::guidance::{ActiveCommand, GuidanceTable};

/// 导航会话参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    // === 相机参数 ===
    pub preview_width: u32,
    pub preview_height: u32,
    pub sensor_rotation: i32, // 传感器相对屏幕的旋转角度

    // === 检测参数 ===
    pub input_size: u32,       // 检测器输入尺寸 (正方形)
    pub maintain_aspect: bool, // 保持宽高比 (裁掉多余部分)
    pub min_confidence: f32,   // 最低置信度
    pub num_threads: usize,
    pub use_nnapi: bool,

    // === 跟踪参数 ===
    pub association_iou: f32,
    pub max_missed_frames: u32,

    // === 导航参数 ===
    pub command: ActiveCommand,
    pub guidance: GuidanceTable,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            preview_width: 640,
            preview_height: 480,
            sensor_rotation: 90,

            input_size: INF_SIZE,
            maintain_aspect: false,
            min_confidence: 0.5,
            num_threads: 4,
            use_nnapi: false,

            association_iou: 0.3,
            max_missed_frames: 10,

            command: ActiveCommand::Passthrough,
            guidance: GuidanceTable::default(),
        }
    }
}

impl GuideConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写入默认配置; 解析失败时使用默认值。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    log::info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    log::error!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        log::info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 检查参数范围
    pub fn validate(&self) -> Result<()> {
        if self.preview_width == 0 || self.preview_height == 0 {
            return Err(GuideError::Config(format!(
                "preview size must be positive, got {}x{}",
                self.preview_width, self.preview_height
            )));
        }
        if self.input_size == 0 {
            return Err(GuideError::Config("input_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(GuideError::Config(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if !(self.association_iou > 0.0 && self.association_iou <= 1.0) {
            return Err(GuideError::Config(format!(
                "association_iou must be within (0, 1], got {}",
                self.association_iou
            )));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        log::info!("🎛️  当前导航配置:");
        log::info!(
            "  预览: {}x{} 旋转 {}°",
            self.preview_width,
            self.preview_height,
            self.sensor_rotation
        );
        log::info!(
            "  检测输入: {}x{} 保持宽高比: {}",
            self.input_size,
            self.input_size,
            self.maintain_aspect
        );
        log::info!(
            "  置信度: {:.2} | 线程: {} | NNAPI: {}",
            self.min_confidence,
            self.num_threads,
            self.use_nnapi
        );
        log::info!(
            "  关联IOU: {:.2} | 最大丢失帧: {}",
            self.association_iou,
            self.max_missed_frames
        );
        log::info!(
            "  指令: {} ({} 条规则)",
            self.command,
            self.guidance.rules_for(self.command).len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GuideConfig::default();
        config.validate().unwrap();
        assert_eq!(config.input_size, 300);
        assert_eq!((config.preview_width, config.preview_height), (640, 480));
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.json");
        let config = GuideConfig::load(&path);
        assert_eq!(config, GuideConfig::default());
        assert!(path.exists());

        // 再次加载读到同样的内容
        assert_eq!(GuideConfig::load(&path), config);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(GuideConfig::load(&path), GuideConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.json");
        fs::write(&path, r#"{"command":"find_door","min_confidence":0.7}"#).unwrap();
        let config = GuideConfig::load(&path);
        assert_eq!(config.command, ActiveCommand::FindDoor);
        assert_eq!(config.min_confidence, 0.7);
        assert_eq!(config.max_missed_frames, 10);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = GuideConfig::default();
        config.min_confidence = 1.5;
        assert!(matches!(config.validate(), Err(GuideError::Config(_))));

        let mut config = GuideConfig::default();
        config.association_iou = 0.0;
        assert!(config.validate().is_err());

        let mut config = GuideConfig::default();
        config.input_size = 0;
        assert!(config.validate().is_err());

        let mut config = GuideConfig::default();
        config.preview_height = 0;
        assert!(config.validate().is_err());
    }
}
