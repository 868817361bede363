//! 检测器边界 (Detector boundary)
//!
//! 神经网络本身不在本crate内; 流水线只通过 `Detector` trait 调用它。
//! `ReplayDetector` 按脚本逐帧回放检测结果, 用于演示与测试。

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::types::Detection;
use crate::error::DetectorConfigError;

/// 目标检测器接口
///
/// 输入是检测器尺寸的裁剪图 (`INF_SIZE` x `INF_SIZE`), 输出坐标也在裁剪图坐标系内。
pub trait Detector: Send {
    /// 后端名称 (日志用)
    fn name(&self) -> &str;

    /// 预热/加载模型, 失败视为致命错误
    fn warm_up(&mut self) -> anyhow::Result<()>;

    /// 对一张裁剪图做检测
    fn recognize_image(&mut self, crop: &RgbaImage) -> anyhow::Result<Vec<Detection>>;

    /// 切换硬件加速 (NNAPI)
    fn set_use_nnapi(&mut self, enabled: bool) -> Result<(), DetectorConfigError>;

    /// 设置推理线程数
    fn set_num_threads(&mut self, num_threads: usize) -> Result<(), DetectorConfigError>;
}

/// 读取标签文件 (每行一个标签)
///
/// 空行和占位标签 `???` 会被跳过; 结果为空视为错误。
pub fn load_labels(path: impl AsRef<Path>) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("无法读取标签文件 {}", path.display()))?;

    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "???")
        .map(String::from)
        .collect();

    if labels.is_empty() {
        bail!("标签文件 {} 中没有标签", path.display());
    }
    Ok(labels)
}

// ========== 回放检测器 ==========

/// 回放脚本: 每个元素是一帧的检测结果
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    pub frames: Vec<Vec<Detection>>,

    /// 播放完毕后是否从头循环
    #[serde(default)]
    pub repeat: bool,
}

impl ReplayScript {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("无法读取回放脚本 {}", path.display()))?;
        let script: ReplayScript = serde_json::from_str(&json)
            .with_context(|| format!("回放脚本格式错误 {}", path.display()))?;
        Ok(script)
    }
}

/// 按脚本回放检测结果的检测器
pub struct ReplayDetector {
    script: ReplayScript,
    labels: Vec<String>,
    cursor: usize,
    num_threads: usize,
    use_nnapi: bool,
    nnapi_available: bool,
    warmed_up: bool,
}

impl ReplayDetector {
    /// 创建回放检测器, 脚本中的每个标签都必须出现在标签表中
    pub fn new(script: ReplayScript, labels: Vec<String>) -> anyhow::Result<Self> {
        let known: HashSet<&str> = labels.iter().map(String::as_str).collect();
        for (index, frame) in script.frames.iter().enumerate() {
            for detection in frame {
                if !known.contains(detection.label.as_str()) {
                    bail!(
                        "回放脚本第 {} 帧包含未知标签 '{}'",
                        index,
                        detection.label
                    );
                }
                if !(0.0..=1.0).contains(&detection.confidence) {
                    bail!(
                        "回放脚本第 {} 帧置信度越界: {}",
                        index,
                        detection.confidence
                    );
                }
            }
        }

        Ok(Self {
            script,
            labels,
            cursor: 0,
            num_threads: 1,
            use_nnapi: false,
            nnapi_available: false,
            warmed_up: false,
        })
    }

    /// 从脚本文件和标签文件创建
    pub fn from_files(
        script_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        let labels = load_labels(labels_path)?;
        let script = ReplayScript::load(script_path)?;
        Self::new(script, labels)
    }

    /// 模拟支持NNAPI的设备
    pub fn with_nnapi_available(mut self, available: bool) -> Self {
        self.nnapi_available = available;
        self
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn use_nnapi(&self) -> bool {
        self.use_nnapi
    }
}

impl Detector for ReplayDetector {
    fn name(&self) -> &str {
        "replay"
    }

    fn warm_up(&mut self) -> anyhow::Result<()> {
        if self.script.frames.is_empty() {
            bail!("回放脚本为空");
        }
        self.warmed_up = true;
        log::info!(
            "✅ 回放检测器就绪: {} 帧, {} 个标签{}",
            self.script.frames.len(),
            self.labels.len(),
            if self.script.repeat { " (循环)" } else { "" }
        );
        Ok(())
    }

    fn recognize_image(&mut self, crop: &RgbaImage) -> anyhow::Result<Vec<Detection>> {
        if !self.warmed_up {
            bail!("检测器尚未预热");
        }

        let frame_count = self.script.frames.len();
        let index = if self.script.repeat {
            self.cursor % frame_count
        } else {
            self.cursor
        };
        self.cursor += 1;

        log::trace!(
            "回放第 {} 帧 (输入 {}x{})",
            index,
            crop.width(),
            crop.height()
        );

        // 脚本播放完毕后返回空结果
        Ok(self.script.frames.get(index).cloned().unwrap_or_default())
    }

    fn set_use_nnapi(&mut self, enabled: bool) -> Result<(), DetectorConfigError> {
        if enabled && !self.nnapi_available {
            return Err(DetectorConfigError::Unsupported(
                "NNAPI is not available on this device".to_string(),
            ));
        }
        self.use_nnapi = enabled;
        Ok(())
    }

    fn set_num_threads(&mut self, num_threads: usize) -> Result<(), DetectorConfigError> {
        if num_threads == 0 {
            return Err(DetectorConfigError::InvalidArgument(
                "thread count must be at least 1".to_string(),
            ));
        }
        self.num_threads = num_threads;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::BBox;
    use std::io::Write;

    fn labels() -> Vec<String> {
        ["stop", "stoppoint", "83bus"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn crop() -> RgbaImage {
        RgbaImage::new(300, 300)
    }

    #[test]
    fn load_labels_skips_blank_and_placeholder_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "???\nstop\n\n  stoppoint  \n83bus").unwrap();
        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["stop", "stoppoint", "83bus"]);
    }

    #[test]
    fn missing_label_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_labels(dir.path().join("labels.txt")).is_err());
    }

    #[test]
    fn empty_label_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_labels(file.path()).is_err());
    }

    #[test]
    fn unknown_label_in_script_is_rejected() {
        let script = ReplayScript {
            frames: vec![vec![Detection::new(
                "frontdoor",
                0.9,
                BBox::new(0.0, 0.0, 1.0, 1.0),
            )]],
            repeat: false,
        };
        assert!(ReplayDetector::new(script, labels()).is_err());
    }

    #[test]
    fn replays_frames_then_runs_dry() {
        let first = vec![Detection::new(
            "stoppoint",
            0.8,
            BBox::new(10.0, 10.0, 40.0, 40.0),
        )];
        let script = ReplayScript {
            frames: vec![first.clone(), Vec::new()],
            repeat: false,
        };
        let mut detector = ReplayDetector::new(script, labels()).unwrap();

        // 预热前调用失败
        assert!(detector.recognize_image(&crop()).is_err());

        detector.warm_up().unwrap();
        assert_eq!(detector.recognize_image(&crop()).unwrap(), first);
        assert!(detector.recognize_image(&crop()).unwrap().is_empty());
        assert!(detector.recognize_image(&crop()).unwrap().is_empty());
    }

    #[test]
    fn repeat_wraps_around() {
        let one = vec![Detection::new("stop", 0.9, BBox::new(0.0, 0.0, 5.0, 5.0))];
        let script = ReplayScript {
            frames: vec![one.clone(), Vec::new()],
            repeat: true,
        };
        let mut detector = ReplayDetector::new(script, labels()).unwrap();
        detector.warm_up().unwrap();
        detector.recognize_image(&crop()).unwrap();
        detector.recognize_image(&crop()).unwrap();
        assert_eq!(detector.recognize_image(&crop()).unwrap(), one);
    }

    #[test]
    fn empty_script_fails_warm_up() {
        let mut detector = ReplayDetector::new(ReplayScript::default(), labels()).unwrap();
        assert!(detector.warm_up().is_err());
    }

    #[test]
    fn runtime_settings_report_failure_classes() {
        let mut detector = ReplayDetector::new(ReplayScript::default(), labels()).unwrap();
        assert!(matches!(
            detector.set_use_nnapi(true),
            Err(DetectorConfigError::Unsupported(_))
        ));
        assert!(!detector.use_nnapi());
        assert!(matches!(
            detector.set_num_threads(0),
            Err(DetectorConfigError::InvalidArgument(_))
        ));
        detector.set_num_threads(4).unwrap();
        assert_eq!(detector.num_threads(), 4);

        let mut capable = detector.with_nnapi_available(true);
        capable.set_use_nnapi(true).unwrap();
        assert!(capable.use_nnapi());
    }

    #[test]
    fn script_file_round_trip_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let labels_path = dir.path().join("labels.txt");
        let script_path = dir.path().join("script.json");
        fs::write(&labels_path, "stop\nstoppoint\n").unwrap();
        fs::write(
            &script_path,
            r#"{"frames":[[{"label":"stop","confidence":0.7,"bbox":{"x1":1,"y1":2,"x2":3,"y2":4}}]]}"#,
        )
        .unwrap();

        let mut detector = ReplayDetector::from_files(&script_path, &labels_path).unwrap();
        detector.warm_up().unwrap();
        let detections = detector.recognize_image(&crop()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "stop");
        assert_eq!(detections[0].bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
