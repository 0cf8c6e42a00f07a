//! Streamer Application
//!
//! Captures system audio and streams it to a connected controller.
//!
//! Usage: `streamer [HID_PATH]`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ds4_audio_streamer::{
    audio::{
        capture::{CaptureSource, LoopbackCapture},
        device::list_loopback_devices,
    },
    codec::SbcEncoder,
    config::AppConfig,
    constants::*,
    stream::{AudioPipeline, FrameEmitter, PipelineConfig, StreamSession},
    transport::{find_controllers, HidTransport},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DS4 audio streamer");

    let config = AppConfig::load(None).context("failed to load config")?;

    raise_priority();

    // Device path: argument, then config, then discovery
    let hid_path = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => path,
        None => match config.device.hid_path.clone() {
            Some(path) => path,
            None => discover_controller()?,
        },
    };
    let transport = HidTransport::open(&hid_path)?;

    tracing::debug!("Loopback endpoints: {:?}", list_loopback_devices());
    let capture = LoopbackCapture::new(config.stream.capture_device.as_deref())?;
    let format = capture.format();

    let encoder = SbcEncoder::new(&config.codec)?;
    tracing::info!(
        "SBC encoder: {}Hz, {} subbands, {} blocks, bitpool {} ({} -> {} bytes)",
        config.codec.sample_rate,
        config.codec.subbands,
        config.codec.blocks,
        config.codec.bitpool,
        config.codec.code_size(),
        config.codec.frame_length()
    );

    let pipeline_config = PipelineConfig {
        capture: format,
        target_sample_rate: config.stream.target_sample_rate,
        target_channels: config.stream.channels,
        buffer_latency_ms: config.stream.buffer_latency_ms,
    };
    let emitter = FrameEmitter::new(transport, config.device.mode, config.device.device_id);
    let pipeline = AudioPipeline::new(pipeline_config, Box::new(encoder), emitter)?;

    let mut session = StreamSession::new(capture, pipeline)?;
    session.set_warmup_frames(config.stream.warmup_frames);
    session.start()?;

    if config.stream.warmup_frames > 0
        && !session.wait_for_warmup(Duration::from_millis(WARMUP_TIMEOUT_MS))
    {
        tracing::warn!(
            "Warm-up did not reach {} frames, streaming anyway",
            config.stream.warmup_frames
        );
        session.open_gate();
    }

    tracing::info!("Streaming to {} - press Ctrl+C to stop", hid_path.display());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stats_interval = tokio::time::interval(Duration::from_secs(10));
    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, shutting down");
                break Ok(());
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if let Some(e) = session.check_error() {
                    break Err(e);
                }
            }
            _ = stats_interval.tick() => {
                let stats = session.stats();
                tracing::info!(
                    "Stats: {} reports ({} x2, {} x4), {} frames encoded, {} underflows, {} glitches",
                    stats.reports_sent(),
                    stats.two_frame_batches,
                    stats.four_frame_batches,
                    stats.frames_encoded,
                    stats.underflow_cycles,
                    stats.raw_glitches + stats.encoded_glitches
                );
            }
        }
    };

    session.stop();
    outcome.context("stream failed")?;
    Ok(())
}

fn discover_controller() -> Result<PathBuf> {
    let controllers = find_controllers();
    for controller in &controllers {
        tracing::info!(
            "Found controller {} ({:04x}:{:04x}, {})",
            controller.path.display(),
            controller.id.vendor,
            controller.id.product,
            if controller.id.is_bluetooth() { "bluetooth" } else { "usb" }
        );
    }

    match controllers.into_iter().next() {
        Some(controller) => {
            if !controller.id.is_bluetooth() {
                tracing::warn!("Controller is not connected over Bluetooth; audio may be ignored");
            }
            Ok(controller.path)
        }
        None => bail!("no controller found; pass the HID device path as the first argument"),
    }
}

#[cfg(windows)]
fn raise_priority() {
    use windows::Win32::System::Threading::{GetCurrentProcess, SetPriorityClass, HIGH_PRIORITY_CLASS};

    // SAFETY: the pseudo-handle from GetCurrentProcess is always valid
    match unsafe { SetPriorityClass(GetCurrentProcess(), HIGH_PRIORITY_CLASS) } {
        Ok(()) => tracing::info!("Process priority raised"),
        Err(e) => tracing::warn!("Failed to raise process priority: {}", e),
    }
}

#[cfg(not(windows))]
fn raise_priority() {
    tracing::debug!("Process priority elevation not supported on this platform");
}
