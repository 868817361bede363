//! 帧流水线控制器
//! 职责: 接收相机帧 → 单飞检测 → 跟踪 → 导航提示 → 发送UiEvent消息
//!
//! 状态只有 空闲/处理中 两种, 由一个原子标志保护;
//! 处理中到达的帧直接丢弃, 检测器同一时刻最多只有一次调用。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use image::RgbaImage;

use super::{CameraFrame, ConfigMessage, FrameDisposition, FrameStats, RenderSnapshot, UiEvent};
use crate::config::GuideConfig;
use crate::detection::detector::Detector;
use crate::detection::object_tracker::ObjectTracker;
use crate::detection::tracker::{TrackedObject, Tracker};
use crate::error::{GuideError, Result};
use crate::guidance::policy::GuidancePolicy;
use crate::guidance::speech::{SpeechDebouncer, SpeechEngine, SpeechState};
use crate::utils::affine_transform::CoordinateMapper;

/// 统计日志间隔 (已处理帧数)
const STATS_INTERVAL: u64 = 60;

/// 交给工作线程的任务
struct Job {
    frame_id: u64,
    frame: CameraFrame,
}

/// 采集端与工作线程共享的计数
#[derive(Debug, Default)]
struct PipelineCounters {
    received: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
}

pub struct FramePipeline {
    processing: Arc<AtomicBool>,
    counters: Arc<PipelineCounters>,
    job_tx: Option<Sender<Job>>,
    control_tx: Option<Sender<ConfigMessage>>,
    events: Sender<UiEvent>,
    latest: Arc<Mutex<Arc<RenderSnapshot>>>,
    speech_state: Arc<SpeechState>,
    worker: Option<JoinHandle<()>>,
}

impl FramePipeline {
    /// 启动流水线
    ///
    /// 检测器预热失败返回 `GuideError::DetectorInit`; 线程数/NNAPI设置失败只记录日志。
    pub fn start(
        config: &GuideConfig,
        mut detector: Box<dyn Detector>,
        speech: Box<dyn SpeechEngine>,
    ) -> Result<(Self, Receiver<UiEvent>)> {
        config.validate()?;

        let mapper = CoordinateMapper::new(
            config.preview_width,
            config.preview_height,
            config.input_size,
            config.input_size,
            config.sensor_rotation,
            config.maintain_aspect,
        )?;
        log::info!(
            "📐 相机 {}x{} → 检测输入 {}x{} (旋转 {}°)",
            config.preview_width,
            config.preview_height,
            config.input_size,
            config.input_size,
            config.sensor_rotation
        );

        detector.warm_up().map_err(|e| {
            log::error!("❌ 检测器 {} 初始化失败: {:#}", detector.name(), e);
            GuideError::DetectorInit(format!("{:#}", e))
        })?;
        log::info!("✅ 检测器 {} 已就绪", detector.name());

        let (event_tx, event_rx) = unbounded();
        let speech_state = SpeechState::new();
        let mut debouncer =
            SpeechDebouncer::new(Arc::clone(&speech_state), speech, event_tx.clone());

        // 初始运行参数
        apply_config(
            detector.as_mut(),
            &mut debouncer,
            ConfigMessage::NumThreads(config.num_threads),
        );
        if config.use_nnapi {
            apply_config(
                detector.as_mut(),
                &mut debouncer,
                ConfigMessage::UseNnapi(true),
            );
        }

        let processing = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(PipelineCounters::default());
        let latest = Arc::new(Mutex::new(Arc::new(RenderSnapshot::default())));

        let (job_tx, job_rx) = bounded::<Job>(1);
        let (control_tx, control_rx) = bounded::<ConfigMessage>(8);

        let worker = Worker {
            detector,
            mapper,
            tracker: ObjectTracker::new(config.association_iou, config.max_missed_frames),
            policy: GuidancePolicy::new(
                config.command,
                config.guidance.clone(),
                config.min_confidence,
            ),
            debouncer,
            events: event_tx.clone(),
            latest: Arc::clone(&latest),
            processing: Arc::clone(&processing),
            counters: Arc::clone(&counters),
            input_size: config.input_size,
            maintain_aspect: config.maintain_aspect,
            min_confidence: config.min_confidence,
            last_stats: Instant::now(),
        };

        let handle = thread::Builder::new()
            .name("guide-worker".to_string())
            .spawn(move || worker.run(job_rx, control_rx))?;

        log::info!("🎯 导航流水线已启动 (指令: {})", config.command);

        Ok((
            Self {
                processing,
                counters,
                job_tx: Some(job_tx),
                control_tx: Some(control_tx),
                events: event_tx,
                latest,
                speech_state,
                worker: Some(handle),
            },
            event_rx,
        ))
    }

    /// 提交一帧 (从不阻塞)
    pub fn submit_frame(&self, frame: CameraFrame) -> FrameDisposition {
        let frame_id = self.counters.received.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = self.events.send(UiEvent::Invalidate);

        let Some(job_tx) = self.job_tx.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return FrameDisposition::Dropped { frame_id };
        };

        // 空闲 → 处理中
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("⏭️  帧 {} 丢弃 (处理中)", frame_id);
            return FrameDisposition::Dropped { frame_id };
        }

        match job_tx.try_send(Job { frame_id, frame }) {
            Ok(()) => FrameDisposition::Dispatched { frame_id },
            Err(e) => {
                self.processing.store(false, Ordering::Release);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                match e {
                    TrySendError::Full(_) => log::warn!("⚠️  任务通道已满, 帧 {} 丢弃", frame_id),
                    TrySendError::Disconnected(_) => {
                        log::warn!("⚠️  工作线程已退出, 帧 {} 丢弃", frame_id)
                    }
                }
                FrameDisposition::Dropped { frame_id }
            }
        }
    }

    /// 最新一次处理结果
    pub fn latest_snapshot(&self) -> Arc<RenderSnapshot> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*latest)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub fn speech_state(&self) -> &Arc<SpeechState> {
        &self.speech_state
    }

    pub fn frames_received(&self) -> u64 {
        self.counters.received.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// 切换硬件加速, 在两次检测之间生效
    pub fn set_use_nnapi(&self, enabled: bool) -> Result<()> {
        self.send_control(ConfigMessage::UseNnapi(enabled))
    }

    /// 设置推理线程数, 在两次检测之间生效
    pub fn set_num_threads(&self, num_threads: usize) -> Result<()> {
        self.send_control(ConfigMessage::NumThreads(num_threads))
    }

    fn send_control(&self, message: ConfigMessage) -> Result<()> {
        let tx = self.control_tx.as_ref().ok_or(GuideError::PipelineStopped)?;
        tx.send(message).map_err(|_| GuideError::PipelineStopped)
    }

    /// 停止工作线程 (可重复调用)
    pub fn stop(&mut self) {
        self.job_tx.take();
        self.control_tx.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("❌ 工作线程异常退出");
            }
            log::info!(
                "🛑 导航流水线已停止: 收到 {} 帧, 处理 {} 帧, 丢弃 {} 帧",
                self.frames_received(),
                self.frames_processed(),
                self.frames_dropped()
            );
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ========== 工作线程 ==========

struct Worker {
    detector: Box<dyn Detector>,
    mapper: CoordinateMapper,
    tracker: ObjectTracker,
    policy: GuidancePolicy,
    debouncer: SpeechDebouncer,
    events: Sender<UiEvent>,
    latest: Arc<Mutex<Arc<RenderSnapshot>>>,
    processing: Arc<AtomicBool>,
    counters: Arc<PipelineCounters>,
    input_size: u32,
    maintain_aspect: bool,
    min_confidence: f32,
    last_stats: Instant,
}

impl Worker {
    fn run(mut self, job_rx: Receiver<Job>, control_rx: Receiver<ConfigMessage>) {
        log::info!("🔍 工作线程等待数据...");
        loop {
            select! {
                recv(job_rx) -> job => match job {
                    Ok(job) => self.process(job),
                    Err(_) => break,
                },
                recv(control_rx) -> message => match message {
                    Ok(message) => {
                        apply_config(self.detector.as_mut(), &mut self.debouncer, message)
                    }
                    Err(_) => break,
                },
            }
        }
        self.debouncer.shutdown();
        log::info!("✅ 工作线程退出");
    }

    fn process(&mut self, job: Job) {
        let Job { frame_id, frame } = job;
        match self.detect_and_guide(frame_id, frame) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&snapshot);
                self.record_processed();
                self.processing.store(false, Ordering::Release);
                let _ = self.events.send(UiEvent::Frame(snapshot));
            }
            Err(e) => {
                log::error!("❌ 帧 {} 处理失败: {}", frame_id, e);
                self.processing.store(false, Ordering::Release);
            }
        }
    }

    fn detect_and_guide(&mut self, frame_id: u64, frame: CameraFrame) -> Result<RenderSnapshot> {
        let (width, height, rotation) = (frame.width, frame.height, frame.rotation);

        // 帧尺寸或旋转变化时重建映射
        if !self.mapper.matches(width, height, rotation) {
            self.mapper = CoordinateMapper::new(
                width,
                height,
                self.input_size,
                self.input_size,
                rotation,
                self.maintain_aspect,
            )?;
            log::info!("🔄 映射已重建: {}x{} 旋转 {}°", width, height, rotation);
        }

        let image = RgbaImage::from_raw(width, height, frame.rgba).ok_or_else(|| {
            GuideError::InvalidFrame(format!("buffer does not match {}x{} RGBA", width, height))
        })?;
        let crop = self.mapper.crop(&image)?;

        // 检测 (运行时错误视为空结果)
        let start = Instant::now();
        let detections = match self.detector.recognize_image(&crop) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("⚠️  检测失败 (帧 {}): {:#}", frame_id, e);
                Vec::new()
            }
        };
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        // 置信度过滤 + 裁剪图 → 相机帧
        let frame_detections: Vec<_> = detections
            .iter()
            .filter(|d| d.confidence >= self.min_confidence)
            .map(|d| d.with_bbox(self.mapper.to_frame(&d.bbox)))
            .collect();

        let objects = self.tracker.update(&frame_detections, frame_id);

        // 方位判断在直立的裁剪图坐标系内进行
        let upright: Vec<TrackedObject> = objects
            .iter()
            .map(|o| {
                let mut o = o.clone();
                o.bbox = self.mapper.to_crop(&o.bbox);
                o
            })
            .collect();
        let (crop_width, crop_height) = self.mapper.crop_size();
        let instruction = self.policy.evaluate(&upright, crop_width as f32);
        let spoken = instruction
            .as_ref()
            .map(|i| self.debouncer.offer(i))
            .unwrap_or(false);

        log::debug!(
            "🎯 帧 {}: {} 检测 / {} 跟踪 / 提示 {:?} ({})",
            frame_id,
            frame_detections.len(),
            objects.len(),
            instruction.as_ref().map(|i| i.text.as_str()),
            if spoken { "播报" } else { "静默" }
        );

        Ok(RenderSnapshot {
            frame_id,
            objects,
            instruction,
            spoken,
            stats: FrameStats {
                frame_width: width,
                frame_height: height,
                crop_width,
                crop_height,
                inference_ms,
            },
        })
    }

    fn record_processed(&mut self) {
        let processed = self.counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % STATS_INTERVAL == 0 {
            let elapsed = self.last_stats.elapsed().as_secs_f64();
            let fps = if elapsed > 0.0 {
                STATS_INTERVAL as f64 / elapsed
            } else {
                0.0
            };
            self.last_stats = Instant::now();
            log::info!(
                "📊 收到 {} | 处理 {} | 丢弃 {} | 处理FPS {:.1} | 跟踪 {}",
                self.counters.received.load(Ordering::Relaxed),
                processed,
                self.counters.dropped.load(Ordering::Relaxed),
                fps,
                self.tracker.get_stats()
            );
        }
    }
}

/// 应用运行时参数, 失败只记录并提示, 保持原设置
fn apply_config(detector: &mut dyn Detector, debouncer: &mut SpeechDebouncer, message: ConfigMessage) {
    let result = match &message {
        ConfigMessage::UseNnapi(enabled) => detector.set_use_nnapi(*enabled),
        ConfigMessage::NumThreads(count) => detector.set_num_threads(*count),
    };
    match result {
        Ok(()) => log::info!("⚙️  检测器参数已更新: {:?}", message),
        Err(e) => {
            log::error!("❌ 检测器参数修改失败 {:?}: {}", message, e);
            debouncer.notify(&format!("설정 실패: {}", e));
        }
    }
}
