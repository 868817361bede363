//! 语音指令 (会话开始时确定, 会话内不变)

use serde::{Deserialize, Serialize};

/// 当前会话的导航任务
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveCommand {
    /// 寻找候车位置
    FindStop,
    /// 寻找83路公交
    FindBus,
    /// 寻找车门
    FindDoor,
    /// 无特定任务: 直接播报标签
    #[default]
    Passthrough,
}

/// 语音识别文本 → 指令 的别名表 (小写)
const ALIASES: &[(&str, ActiveCommand)] = &[
    ("대기 위치", ActiveCommand::FindStop),
    ("find the stop", ActiveCommand::FindStop),
    ("83번 버스", ActiveCommand::FindBus),
    ("find bus 83", ActiveCommand::FindBus),
    ("출입구", ActiveCommand::FindDoor),
    ("find the door", ActiveCommand::FindDoor),
];

impl ActiveCommand {
    /// 从语音识别结果解析指令, 无法识别时为 `Passthrough`
    pub fn from_speech(text: &str) -> Self {
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, command)| *command)
            .unwrap_or(ActiveCommand::Passthrough)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActiveCommand::FindStop => "find-stop",
            ActiveCommand::FindBus => "find-bus",
            ActiveCommand::FindDoor => "find-door",
            ActiveCommand::Passthrough => "passthrough",
        }
    }
}

impl std::fmt::Display for ActiveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
