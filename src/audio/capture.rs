//! System audio capture
//!
//! A capture source pushes interleaved f32 blocks at its native rate into a
//! callback. The callback runs on the audio thread and drives the whole
//! encode-and-send chain inline, so it must never block for long.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::convert::{i16_to_f32, F32_SAMPLE_BYTES};
use crate::audio::device::LoopbackDevice;
use crate::error::AudioError;

/// Native format of the captured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureFormat {
    /// Bytes of f32 capture data covering `latency_ms`, rounded up to whole frames
    pub fn bytes_for_latency(&self, latency_ms: u32) -> usize {
        let frame_bytes = F32_SAMPLE_BYTES * self.channels as usize;
        let frames = (self.sample_rate as usize * latency_ms as usize).div_ceil(1000);
        frames * frame_bytes
    }
}

/// Receives each captured block of interleaved samples
pub type CaptureCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Something that delivers captured audio blocks to a callback
pub trait CaptureSource: Send {
    /// Native format of the delivered blocks
    fn format(&self) -> CaptureFormat;

    /// Begin delivering blocks to `callback`
    fn start(&mut self, callback: CaptureCallback) -> Result<(), AudioError>;

    /// Stop delivering blocks. No callback runs after this returns.
    fn stop(&mut self);

    /// Check if capture is running
    fn is_running(&self) -> bool;

    /// Pop an asynchronous stream error, if one was reported
    fn check_errors(&self) -> Option<AudioError> {
        None
    }
}

/// Loopback capture of a render endpoint via cpal.
///
/// The default output is only captured on Windows. Other platforms need a
/// named monitor or loopback source; see [`LoopbackDevice`].
///
/// The cpal stream lives on its own thread for the duration of the capture;
/// dropping it on that thread stops the callbacks.
pub struct LoopbackCapture {
    /// Endpoint name, `None` for the default device
    device_name: Option<String>,

    format: CaptureFormat,

    sample_format: SampleFormat,

    running: Arc<AtomicBool>,

    thread_handle: Option<JoinHandle<()>>,

    error_rx: Option<Receiver<AudioError>>,

    /// Blocks delivered since start
    blocks_captured: Arc<AtomicU64>,
}

impl LoopbackCapture {
    /// Prepare capture of the named endpoint, or the default one
    pub fn new(device_name: Option<&str>) -> Result<Self, AudioError> {
        let device = LoopbackDevice::open(device_name)?;
        let native = device.native_config()?;

        let sample_format = native.sample_format();
        if !matches!(sample_format, SampleFormat::F32 | SampleFormat::I16) {
            return Err(AudioError::UnsupportedFormat(format!("{:?}", sample_format)));
        }

        tracing::info!(
            "Loopback endpoint '{}': {}Hz, {} channels, {:?}",
            device.name,
            native.sample_rate().0,
            native.channels(),
            sample_format
        );

        Ok(Self {
            device_name: device_name.map(str::to_string),
            format: CaptureFormat {
                sample_rate: native.sample_rate().0,
                channels: native.channels(),
            },
            sample_format,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
            blocks_captured: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Blocks delivered since the last start
    pub fn blocks_captured(&self) -> u64 {
        self.blocks_captured.load(Ordering::Relaxed)
    }
}

impl CaptureSource for LoopbackCapture {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn start(&mut self, mut callback: CaptureCallback) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = LoopbackDevice::open(self.device_name.as_deref())?;
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let blocks_captured = self.blocks_captured.clone();
        let sample_format = self.sample_format;
        let config = StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        self.blocks_captured.store(0, Ordering::SeqCst);
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("loopback-capture".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let on_error = move |err: cpal::StreamError| {
                    let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                };

                let stream = match sample_format {
                    SampleFormat::I16 => {
                        let mut scratch: Vec<f32> = Vec::new();
                        cpal_device.build_input_stream(
                            &config,
                            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                                if !running.load(Ordering::Relaxed) {
                                    return;
                                }
                                blocks_captured.fetch_add(1, Ordering::Relaxed);
                                scratch.clear();
                                scratch.extend(data.iter().map(|&s| i16_to_f32(s)));
                                callback(&scratch);
                            },
                            on_error,
                            None,
                        )
                    }
                    _ => cpal_device.build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            if !running.load(Ordering::Relaxed) {
                                return;
                            }
                            blocks_captured.fetch_add(1, Ordering::Relaxed);
                            callback(data);
                        },
                        on_error,
                        None,
                    ),
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::error!("Failed to build loopback stream: {}", e);
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    tracing::error!("Failed to start loopback stream: {}", e);
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, stopping capture
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("capture thread exited".into())));
        if ready.is_err() {
            self.stop();
        }
        ready
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for LoopbackCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture source fed by hand through a [`ManualFeeder`].
///
/// Blocks are delivered synchronously on the feeding thread, which makes it
/// suitable for replaying recorded audio and for exercising the pipeline
/// without audio hardware.
pub struct ManualCapture {
    format: CaptureFormat,
    slot: Arc<Mutex<Option<CaptureCallback>>>,
}

/// Feeding half of a [`ManualCapture`]
#[derive(Clone)]
pub struct ManualFeeder {
    slot: Arc<Mutex<Option<CaptureCallback>>>,
}

impl ManualCapture {
    pub fn new(format: CaptureFormat) -> (Self, ManualFeeder) {
        let slot = Arc::new(Mutex::new(None));
        (
            Self {
                format,
                slot: slot.clone(),
            },
            ManualFeeder { slot },
        )
    }
}

impl CaptureSource for ManualCapture {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn start(&mut self, callback: CaptureCallback) -> Result<(), AudioError> {
        *self.slot.lock() = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        // Waits for an in-flight push to finish
        self.slot.lock().take();
    }

    fn is_running(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl ManualFeeder {
    /// Deliver one block. Returns false if the capture is not running.
    pub fn push(&self, samples: &[f32]) -> bool {
        match self.slot.lock().as_mut() {
            Some(callback) => {
                callback(samples);
                true
            }
            None => false,
        }
    }
}
