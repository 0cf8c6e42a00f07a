//! Stream session lifecycle
//!
//! Owns the capture source and shares the pipeline with the capture
//! callback. A sink error marks the session failed, silences further
//! callbacks and is handed to the owner through [`StreamSession::check_error`].

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::capture::CaptureSource;
use crate::error::{AudioError, Error, Result};
use crate::stream::pipeline::{AudioPipeline, BatchSink, PipelineStats};

/// One live capture-to-device stream
pub struct StreamSession<C: CaptureSource, S: BatchSink + 'static> {
    capture: C,
    pipeline: Arc<Mutex<AudioPipeline<S>>>,
    gate: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    error_tx: Sender<Error>,
    error_rx: Receiver<Error>,
}

impl<C: CaptureSource, S: BatchSink + 'static> StreamSession<C, S> {
    /// Pair a capture source with a pipeline built for its format
    pub fn new(capture: C, pipeline: AudioPipeline<S>) -> Result<Self> {
        let expected = pipeline.config().capture;
        if capture.format() != expected {
            return Err(AudioError::UnsupportedFormat(format!(
                "capture delivers {:?}, pipeline expects {:?}",
                capture.format(),
                expected
            ))
            .into());
        }

        let (error_tx, error_rx) = bounded(1);

        Ok(Self {
            capture,
            gate: pipeline.gate_flag(),
            pipeline: Arc::new(Mutex::new(pipeline)),
            failed: Arc::new(AtomicBool::new(false)),
            error_tx,
            error_rx,
        })
    }

    /// Reset the pipeline, counter and warm-up gate, then start capturing
    pub fn start(&mut self) -> Result<()> {
        if self.capture.is_running() {
            return Ok(());
        }

        self.pipeline.lock().reset();
        self.failed.store(false, Ordering::SeqCst);
        while self.error_rx.try_recv().is_ok() {}

        let pipeline = self.pipeline.clone();
        let failed = self.failed.clone();
        let error_tx = self.error_tx.clone();

        self.capture.start(Box::new(move |samples: &[f32]| {
            if failed.load(Ordering::Relaxed) {
                return;
            }

            let result = pipeline.lock().process(samples);
            if let Err(e) = result {
                if !failed.swap(true, Ordering::SeqCst) {
                    tracing::error!("Stream failed: {}", e);
                    let _ = error_tx.try_send(e);
                }
            }
        }))?;

        let format = self.capture.format();
        tracing::info!(
            "Stream session started ({}Hz, {} channels)",
            format.sample_rate,
            format.channels
        );
        Ok(())
    }

    /// Stop capture. Returns once no callback is running.
    pub fn stop(&mut self) {
        if !self.capture.is_running() {
            return;
        }

        self.capture.stop();

        let stats = self.stats();
        tracing::info!(
            "Stream session stopped: {} reports, {} frames encoded, {} encode failures, {} glitches",
            stats.reports_sent(),
            stats.frames_encoded,
            stats.encode_failures,
            stats.raw_glitches + stats.encoded_glitches
        );
    }

    /// Capturing and not failed
    pub fn is_running(&self) -> bool {
        self.capture.is_running() && !self.is_failed()
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Take the fatal error, if the stream has failed.
    ///
    /// Capture stream errors reported by the source are returned as well.
    pub fn check_error(&self) -> Option<Error> {
        if let Ok(e) = self.error_rx.try_recv() {
            return Some(e);
        }
        self.capture.check_errors().map(Error::Audio)
    }

    /// Hold back reports after each start until `frames` encoded frames
    /// are buffered. Set before [`start`](Self::start); 0 disables.
    pub fn set_warmup_frames(&self, frames: usize) {
        self.pipeline.lock().set_warmup_frames(frames);
    }

    /// Spin with `yield_now` until the warm-up gate opens.
    ///
    /// Returns false on timeout or if the stream fails first. The gate stays
    /// closed on timeout; see [`open_gate`](Self::open_gate).
    pub fn wait_for_warmup(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while !self.gate.load(Ordering::Acquire) {
            if self.is_failed() || Instant::now() >= deadline {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    /// Start sending without waiting for the warm-up threshold
    pub fn open_gate(&self) {
        self.gate.store(true, Ordering::Release);
    }

    /// Snapshot of the pipeline counters
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.lock().stats()
    }

    /// Run `f` with the pipeline locked
    pub fn with_pipeline<R>(&self, f: impl FnOnce(&mut AudioPipeline<S>) -> R) -> R {
        f(&mut self.pipeline.lock())
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }
}

impl<C: CaptureSource, S: BatchSink + 'static> Drop for StreamSession<C, S> {
    fn drop(&mut self) {
        self.stop();
    }
}
