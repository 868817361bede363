//! 语音播报去抖: 任意时刻最多一条语音在播放
//!
//! 忙碌时到达的提示直接丢弃, 不排队。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::policy::GuidanceInstruction;
use crate::error::{GuideError, Result};
use crate::pipeline::UiEvent;

// ========== 共享状态 ==========

/// 语音播报状态 (工作线程置忙, 引擎完成回调置闲)
#[derive(Debug, Default)]
pub struct SpeechState {
    busy: AtomicBool,
    last_message: Mutex<Option<String>>,
}

impl SpeechState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 空闲 → 忙碌, 已忙碌时返回 false
    fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// 最近一次被接受的播报内容
    pub fn last_message(&self) -> Option<String> {
        self.last_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_last_message(&self, text: &str) {
        *self.last_message.lock().unwrap_or_else(|e| e.into_inner()) = Some(text.to_string());
    }
}

/// 播报完成句柄, 由语音引擎在播放结束时调用
///
/// 句柄被丢弃时同样视为完成, 避免引擎异常导致永久忙碌。
#[derive(Debug)]
pub struct SpeechCompletion {
    state: Option<Arc<SpeechState>>,
}

impl SpeechCompletion {
    fn new(state: Arc<SpeechState>) -> Self {
        Self { state: Some(state) }
    }

    pub fn complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(state) = self.state.take() {
            state.release();
        }
    }
}

impl Drop for SpeechCompletion {
    fn drop(&mut self) {
        self.finish();
    }
}

// ========== 语音引擎接口 ==========

/// 文本转语音引擎
pub trait SpeechEngine: Send {
    /// 立即播放 (打断当前播放), 结束后调用 `completion.complete()`
    fn speak(&mut self, text: &str, completion: SpeechCompletion) -> Result<()>;

    fn is_speaking(&self) -> bool;

    fn shutdown(&mut self);
}

/// UI 提示消息 (新消息替换旧消息)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub seq: u64,
    /// 被替换的上一条消息
    pub replaces: Option<u64>,
    pub text: String,
}

// ========== 去抖器 ==========

pub struct SpeechDebouncer {
    state: Arc<SpeechState>,
    engine: Box<dyn SpeechEngine>,
    events: Sender<UiEvent>,
    next_seq: u64,
    current_seq: Option<u64>,
}

impl SpeechDebouncer {
    pub fn new(
        state: Arc<SpeechState>,
        engine: Box<dyn SpeechEngine>,
        events: Sender<UiEvent>,
    ) -> Self {
        Self {
            state,
            engine,
            events,
            next_seq: 1,
            current_seq: None,
        }
    }

    pub fn state(&self) -> &Arc<SpeechState> {
        &self.state
    }

    /// 提交一条提示, 被接受并开始播放时返回 true
    pub fn offer(&mut self, instruction: &GuidanceInstruction) -> bool {
        if self.state.is_busy() || self.engine.is_speaking() {
            log::trace!("🔇 播报中, 丢弃: {}", instruction.text);
            return false;
        }
        if !self.state.try_acquire() {
            return false;
        }

        let completion = SpeechCompletion::new(Arc::clone(&self.state));
        if let Err(e) = self.engine.speak(&instruction.text, completion) {
            self.state.release();
            log::warn!("⚠️  语音播放失败: {}", e);
            return false;
        }
        self.state.set_last_message(&instruction.text);

        log::debug!(
            "🔊 播报 #{} ({}): {}",
            instruction.track_id,
            instruction.source_label,
            instruction.text
        );
        self.notify(&instruction.text);
        true
    }

    /// 只显示提示消息, 不播放语音
    pub fn notify(&mut self, text: &str) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let notification = Notification {
            seq,
            replaces: self.current_seq.replace(seq),
            text: text.to_string(),
        };
        // 消费端已退出时忽略
        let _ = self.events.send(UiEvent::Notify(notification));
    }

    pub fn shutdown(&mut self) {
        self.engine.shutdown();
        self.state.release();
    }
}

// ========== 日志语音引擎 ==========

/// 把播报写入日志, 按文本长度模拟播放时长
pub struct LogSpeechEngine {
    per_char: Duration,
    speaking: Arc<AtomicBool>,
    stopped: bool,
}

impl LogSpeechEngine {
    pub fn new(per_char: Duration) -> Self {
        Self {
            per_char,
            speaking: Arc::new(AtomicBool::new(false)),
            stopped: false,
        }
    }
}

impl Default for LogSpeechEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(80))
    }
}

impl SpeechEngine for LogSpeechEngine {
    fn speak(&mut self, text: &str, completion: SpeechCompletion) -> Result<()> {
        if self.stopped {
            return Err(GuideError::Speech("engine has been shut down".to_string()));
        }

        let duration = self.per_char * text.chars().count().max(1) as u32;
        log::info!("🗣️  {} ({} ms)", text, duration.as_millis());

        self.speaking.store(true, Ordering::Release);
        let speaking = Arc::clone(&self.speaking);
        thread::Builder::new()
            .name("speech-timer".to_string())
            .spawn(move || {
                thread::sleep(duration);
                speaking.store(false, Ordering::Release);
                completion.complete();
            })
            .map_err(|e| {
                self.speaking.store(false, Ordering::Release);
                GuideError::Speech(format!("failed to start speech timer: {}", e))
            })?;
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        self.stopped = true;
    }
}
