/// 语音导航会话 (Voice Guidance Session)
///
/// 线程架构:
/// 1. 采集线程: 按 --fps 生成相机帧并提交 (从不阻塞)
/// 2. 工作线程: 检测 → 跟踪 → 导航策略 → 语音播报 (流水线内部)
/// 3. 主线程:   UI事件消费 (日志输出快照与提示)
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use busguide_rs::guidance::ActiveCommand;
use busguide_rs::{
    CameraFrame, FramePipeline, GuideConfig, LogSpeechEngine, ReplayDetector, UiEvent,
};

/// 导航会话参数
#[derive(Parser, Debug)]
#[command(author, version, about = "公交站语音导航 - 回放会话", long_about = None)]
struct Args {
    /// 语音指令 ("대기 위치" / "83번 버스" / "출입구" 或英文别名), 覆盖配置文件
    #[arg(short, long)]
    command: Option<String>,

    /// 检测回放脚本 (JSON)
    #[arg(short, long, default_value = "assets/find_stop.json")]
    script: PathBuf,

    /// 标签文件
    #[arg(short, long, default_value = "assets/labelmap.txt")]
    labels: PathBuf,

    /// 配置文件 (不存在时自动创建)
    #[arg(long, default_value = "guide_config.json")]
    config: PathBuf,

    /// 相机帧率
    #[arg(long, default_value_t = 15.0)]
    fps: f64,

    /// 总帧数
    #[arg(long, default_value_t = 300)]
    frames: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !(args.fps > 0.0) {
        anyhow::bail!("--fps must be positive, got {}", args.fps);
    }

    let mut config = GuideConfig::load(&args.config);
    if let Some(text) = &args.command {
        config.command = ActiveCommand::from_speech(text);
        log::info!("🎙️  语音指令 \"{}\" → {}", text, config.command);
    }
    config.print_summary();

    log::info!("🚀 导航会话启动");
    log::info!("📦 回放脚本: {}", args.script.display());
    log::info!("🏷️  标签文件: {}", args.labels.display());

    let detector = match ReplayDetector::from_files(&args.script, &args.labels) {
        Ok(detector) => detector,
        Err(e) => {
            log::error!("❌ 检测器加载失败: {:#}", e);
            std::process::exit(1);
        }
    };

    let (mut pipeline, events) = match FramePipeline::start(
        &config,
        Box::new(detector),
        Box::new(LogSpeechEngine::default()),
    ) {
        Ok(started) => started,
        Err(e) => {
            log::error!("❌ 流水线启动失败: {}", e);
            std::process::exit(1);
        }
    };

    let interval = Duration::from_secs_f64(1.0 / args.fps);
    let (width, height, rotation) = (
        config.preview_width,
        config.preview_height,
        config.sensor_rotation,
    );

    thread::scope(|scope| {
        // ========== 采集线程 ==========
        let pipeline_ref = &pipeline;
        let capture = scope.spawn(move || {
            let mut dispatched = 0u64;
            for i in 0..args.frames {
                let shade = (i % 200) as u8 + 30;
                let frame = CameraFrame::solid(width, height, rotation, [shade, shade, shade, 255]);
                if pipeline_ref.submit_frame(frame).is_dispatched() {
                    dispatched += 1;
                }
                thread::sleep(interval);
            }
            log::info!("📹 采集结束: {} 帧, 送检 {} 帧", args.frames, dispatched);
        });

        // ========== UI 事件消费 ==========
        loop {
            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(UiEvent::Invalidate) => {}
                Ok(UiEvent::Frame(snapshot)) => {
                    log::debug!(
                        "🖼️  帧 {} | {} 个目标 | 推理 {:.1} ms | {}x{} → {}x{}",
                        snapshot.frame_id,
                        snapshot.objects.len(),
                        snapshot.stats.inference_ms,
                        snapshot.stats.frame_width,
                        snapshot.stats.frame_height,
                        snapshot.stats.crop_width,
                        snapshot.stats.crop_height
                    );
                    if let Some(instruction) = &snapshot.instruction {
                        if snapshot.spoken {
                            log::info!(
                                "🎯 帧 {}: {} (#{} {})",
                                snapshot.frame_id,
                                instruction.text,
                                instruction.track_id,
                                instruction.source_label
                            );
                        }
                    }
                }
                Ok(UiEvent::Notify(notification)) => match notification.replaces {
                    Some(previous) => log::info!(
                        "💬 [{}] {} (替换 #{})",
                        notification.seq,
                        notification.text,
                        previous
                    ),
                    None => log::info!("💬 [{}] {}", notification.seq, notification.text),
                },
                Err(RecvTimeoutError::Timeout) => {
                    if capture.is_finished() && !pipeline_ref.is_processing() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    let last = pipeline.latest_snapshot();
    log::info!(
        "🏁 最后处理帧 {}: {} 个跟踪目标",
        last.frame_id,
        last.objects.len()
    );
    pipeline.stop();
    Ok(())
}
