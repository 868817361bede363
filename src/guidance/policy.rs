//! 导航策略: (标签, 位置, 当前指令) → 一条语音提示
//!
//! 规则表按指令分组, 表内顺序即优先级。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::command::ActiveCommand;
use crate::detection::tracker::TrackedObject;

// ========== 数据结构 ==========

/// 水平方位
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Ahead,
    Right,
}

impl Direction {
    /// 按画面三等分判断方位, 恰好落在分界线上的归为正前方
    pub fn classify(mid_x: f32, view_width: f32) -> Self {
        if mid_x < view_width / 3.0 {
            Direction::Left
        } else if mid_x > view_width * 2.0 / 3.0 {
            Direction::Right
        } else {
            Direction::Ahead
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Ahead => "ahead",
            Direction::Right => "right",
        }
    }
}

/// 规则动作
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// 与当前任务无关, 不播报
    Ignore,
    /// 按位置播报左/前/右
    Locate,
    /// 固定方位, 与位置无关
    Point(Direction),
    /// 到达提示
    Arrive,
    /// 确认提示 (播报给定名称)
    Confirm(String),
}

/// 单条规则
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuidanceRule {
    pub label: String,
    pub action: RuleAction,
}

impl GuidanceRule {
    pub fn new(label: impl Into<String>, action: RuleAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// 播报用语
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phrases {
    pub left: String,
    pub ahead: String,
    pub right: String,
    pub arrive: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            left: "왼쪽에 있음".to_string(),
            ahead: "앞에 있음".to_string(),
            right: "오른쪽에 있음".to_string(),
            arrive: "목적지에 도착!".to_string(),
        }
    }
}

impl Phrases {
    pub fn direction(&self, direction: Direction) -> &str {
        match direction {
            Direction::Left => &self.left,
            Direction::Ahead => &self.ahead,
            Direction::Right => &self.right,
        }
    }
}

/// 指令 × 标签 规则表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceTable {
    pub find_stop: Vec<GuidanceRule>,
    pub find_bus: Vec<GuidanceRule>,
    pub find_door: Vec<GuidanceRule>,
    pub phrases: Phrases,
}

impl Default for GuidanceTable {
    fn default() -> Self {
        use RuleAction::*;
        Self {
            find_stop: vec![
                GuidanceRule::new("stoppoint", Locate),
                GuidanceRule::new("stop", Arrive),
                GuidanceRule::new("83bus", Ignore),
                GuidanceRule::new("28bus", Ignore),
            ],
            find_bus: vec![
                GuidanceRule::new("83bus", Confirm("용봉 83번 버스".to_string())),
                GuidanceRule::new("28bus", Ignore),
                GuidanceRule::new("stop", Ignore),
                GuidanceRule::new("stoppoint", Ignore),
                GuidanceRule::new("frontdoor", Ignore),
                GuidanceRule::new("backdoor", Ignore),
            ],
            find_door: vec![
                GuidanceRule::new("frontdoor", Locate),
                GuidanceRule::new("backdoor", Point(Direction::Right)),
                GuidanceRule::new("83bus", Ignore),
            ],
            phrases: Phrases::default(),
        }
    }
}

impl GuidanceTable {
    /// 指令对应的规则 (`Passthrough` 没有规则)
    pub fn rules_for(&self, command: ActiveCommand) -> &[GuidanceRule] {
        match command {
            ActiveCommand::FindStop => &self.find_stop,
            ActiveCommand::FindBus => &self.find_bus,
            ActiveCommand::FindDoor => &self.find_door,
            ActiveCommand::Passthrough => &[],
        }
    }
}

/// 提示类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionKind {
    Direction(Direction),
    Arrived,
    Confirm,
    Announce,
}

/// 一条待播报的提示
#[derive(Clone, Debug, PartialEq)]
pub struct GuidanceInstruction {
    pub text: String,
    pub kind: InstructionKind,
    pub source_label: String,
    pub track_id: u32,
}

// ========== 策略 ==========

pub struct GuidancePolicy {
    command: ActiveCommand,
    table: GuidanceTable,
    min_confidence: f32,
}

impl GuidancePolicy {
    pub fn new(command: ActiveCommand, table: GuidanceTable, min_confidence: f32) -> Self {
        Self {
            command,
            table,
            min_confidence,
        }
    }

    /// 评估当前帧的跟踪结果
    ///
    /// `objects` 的坐标系需与 `view_width` 一致。没有合格目标时返回 `None`。
    pub fn evaluate(
        &self,
        objects: &[TrackedObject],
        view_width: f32,
    ) -> Option<GuidanceInstruction> {
        let mut candidates: Vec<&TrackedObject> = objects
            .iter()
            .filter(|o| o.is_visible() && o.confidence >= self.min_confidence)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by_key(|o| o.id);

        if self.command == ActiveCommand::Passthrough {
            let object = candidates[0];
            return Some(GuidanceInstruction {
                text: object.label.clone(),
                kind: InstructionKind::Announce,
                source_label: object.label.clone(),
                track_id: object.id,
            });
        }

        // 同一标签只认第一条规则
        let mut seen = HashSet::new();
        for rule in self.table.rules_for(self.command) {
            if !seen.insert(rule.label.as_str()) || rule.action == RuleAction::Ignore {
                continue;
            }
            if let Some(object) = candidates.iter().find(|o| o.label == rule.label) {
                return Some(self.instruction(object, &rule.action, view_width));
            }
        }

        None
    }

    fn instruction(
        &self,
        object: &TrackedObject,
        action: &RuleAction,
        view_width: f32,
    ) -> GuidanceInstruction {
        let phrases = &self.table.phrases;
        let (text, kind) = match action {
            RuleAction::Locate => {
                let direction = Direction::classify(object.bbox.mid_x(), view_width);
                (
                    phrases.direction(direction).to_string(),
                    InstructionKind::Direction(direction),
                )
            }
            RuleAction::Point(direction) => (
                phrases.direction(*direction).to_string(),
                InstructionKind::Direction(*direction),
            ),
            RuleAction::Arrive => (phrases.arrive.clone(), InstructionKind::Arrived),
            RuleAction::Confirm(name) => (name.clone(), InstructionKind::Confirm),
            // evaluate 已跳过
            RuleAction::Ignore => (object.label.clone(), InstructionKind::Announce),
        };

        GuidanceInstruction {
            text,
            kind,
            source_label: object.label.clone(),
            track_id: object.id,
        }
    }
}
