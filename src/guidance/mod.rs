/// 导航提示 (Guidance)
///
/// - command: 语音指令解析
/// - policy:  规则表 → 提示
/// - speech:  语音播报去抖
pub mod command;
pub mod policy;
pub mod speech;

pub use command::ActiveCommand;
pub use policy::{
    Direction, GuidanceInstruction, GuidancePolicy, GuidanceRule, GuidanceTable,
    InstructionKind, Phrases, RuleAction,
};
pub use speech::{
    LogSpeechEngine, Notification, SpeechCompletion, SpeechDebouncer, SpeechEngine, SpeechState,
};
