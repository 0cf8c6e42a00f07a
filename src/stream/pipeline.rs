//! Capture-to-batch pipeline
//!
//! Each captured block runs through the whole chain inline:
//!
//! ```text
//! f32 block -> channel remap -> resample -> i16 LE -> raw ring
//!   raw ring --(code_size blocks)--> encoder -> encoded ring
//!   encoded ring --(2 or 4 frames)--> BatchSink
//! ```
//!
//! All scratch buffers are sized at construction, so steady-state processing
//! does not allocate.
//!
//! An optional warm-up gate holds back the first report of a session until
//! enough encoded frames have built up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::audio::buffer::{create_shared_buffer, SharedRingBuffer};
use crate::audio::capture::CaptureFormat;
use crate::audio::convert::{f32_from_le_bytes, f32_to_pcm16_le, remap_channels, PCM16_SAMPLE_BYTES};
use crate::audio::resample::{Resampler, RubatoResampler};
use crate::codec::encoder::FrameEncoder;
use crate::error::{AudioError, CodecError, Result};
use crate::protocol::{check_frame_fits, BatchSize};

/// Encoded frames the encoded ring can hold at minimum
const MIN_ENCODED_FRAMES: usize = 8;

/// Codec input blocks the raw ring can hold at minimum
const MIN_RAW_BLOCKS: usize = 4;

/// One batch of encoded frames handed to the sink
#[derive(Debug, Clone, Copy)]
pub struct EncodedBatch<'a> {
    /// `size.frames()` frames back to back
    pub payload: &'a [u8],
    pub size: BatchSize,
}

impl EncodedBatch<'_> {
    pub fn frames(&self) -> usize {
        self.size.frames()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Receives ready batches synchronously from the pipeline
pub trait BatchSink: Send {
    /// Deliver one batch. An error stops the stream.
    fn emit(&mut self, batch: EncodedBatch<'_>) -> Result<()>;

    /// Called when a new session starts
    fn reset(&mut self) {}
}

/// Pipeline parameters fixed for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Format the capture source delivers
    pub capture: CaptureFormat,
    /// Sample rate the encoder expects
    pub target_sample_rate: u32,
    /// Channel count the encoder expects
    pub target_channels: u16,
    /// Capture latency the ring buffers are sized for
    pub buffer_latency_ms: u32,
}

impl PipelineConfig {
    pub fn needs_resampling(&self) -> bool {
        self.capture.sample_rate != self.target_sample_rate
    }

    pub fn needs_remap(&self) -> bool {
        self.capture.channels != self.target_channels
    }

    /// Resampling ratio, target over native
    pub fn ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.capture.sample_rate as f64
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Capture blocks handed to `process`
    pub blocks_processed: u64,
    pub frames_encoded: u64,
    /// Encoder calls that produced nothing usable
    pub encode_failures: u64,
    pub resample_failures: u64,
    /// Calls where the resampler used fewer frames than offered
    pub resampler_shortfalls: u64,
    pub two_frame_batches: u64,
    pub four_frame_batches: u64,
    /// Calls that ended without a batch to send
    pub underflow_cycles: u64,
    /// Calls held back by the warm-up gate
    pub warmup_cycles: u64,
    pub raw_glitches: u64,
    pub encoded_glitches: u64,
}

impl PipelineStats {
    /// Reports handed to the sink successfully
    pub fn reports_sent(&self) -> u64 {
        self.two_frame_batches + self.four_frame_batches
    }

    pub fn frames_sent(&self) -> u64 {
        self.two_frame_batches * 2 + self.four_frame_batches * 4
    }
}

/// Resample, encode and batch captured audio for a [`BatchSink`]
pub struct AudioPipeline<S> {
    config: PipelineConfig,
    resampler: Option<Box<dyn Resampler>>,
    encoder: Box<dyn FrameEncoder>,
    sink: S,

    raw: SharedRingBuffer,
    encoded: SharedRingBuffer,

    frame_size: usize,

    /// Encoded frames to buffer before the first report, 0 for none
    warmup_frames: usize,
    gate_open: Arc<AtomicBool>,

    remapped: Vec<f32>,
    resampled: Vec<f32>,
    decoded: Vec<f32>,
    pcm: Vec<u8>,
    code_block: Vec<u8>,
    frame_block: Vec<u8>,
    batch: Vec<u8>,

    stats: PipelineStats,
}

impl<S: BatchSink> AudioPipeline<S> {
    /// Build a pipeline, creating a rubato resampler if the rates differ
    pub fn new(config: PipelineConfig, encoder: Box<dyn FrameEncoder>, sink: S) -> Result<Self> {
        let resampler: Option<Box<dyn Resampler>> = if config.needs_resampling() {
            Some(Box::new(RubatoResampler::new(
                config.capture.sample_rate,
                config.target_sample_rate,
                config.target_channels,
            )?))
        } else {
            None
        };

        Self::with_resampler(config, encoder, resampler, sink)
    }

    /// Build a pipeline around a caller-provided resampler.
    ///
    /// The resampler is only used when the capture and target rates differ.
    pub fn with_resampler(
        config: PipelineConfig,
        encoder: Box<dyn FrameEncoder>,
        resampler: Option<Box<dyn Resampler>>,
        sink: S,
    ) -> Result<Self> {
        let code_size = encoder.code_size();
        let frame_size = encoder.frame_size();

        if code_size == 0 || frame_size == 0 {
            return Err(CodecError::InvalidConfig(format!(
                "encoder reports code size {} and frame size {}",
                code_size, frame_size
            ))
            .into());
        }
        if code_size % (PCM16_SAMPLE_BYTES * config.target_channels.max(1) as usize) != 0 {
            return Err(CodecError::InvalidConfig(format!(
                "code size {} is not a whole number of {}-channel PCM frames",
                code_size, config.target_channels
            ))
            .into());
        }
        check_frame_fits(frame_size, BatchSize::Two)?;
        check_frame_fits(frame_size, BatchSize::Four)?;

        let resampler = match (config.needs_resampling(), resampler) {
            (true, Some(resampler)) => Some(resampler),
            (true, None) => {
                return Err(AudioError::ResamplerInit(format!(
                    "no resampler for {}Hz -> {}Hz",
                    config.capture.sample_rate, config.target_sample_rate
                ))
                .into())
            }
            (false, _) => None,
        };

        let latency_bytes = config.capture.bytes_for_latency(config.buffer_latency_ms);
        let raw_capacity = latency_bytes.max(MIN_RAW_BLOCKS * code_size);
        let encoded_capacity = latency_bytes.max(MIN_ENCODED_FRAMES * frame_size);

        debug!(
            "Pipeline: {}Hz/{}ch -> {}Hz/{}ch, code size {}, frame size {}, rings {}/{} bytes",
            config.capture.sample_rate,
            config.capture.channels,
            config.target_sample_rate,
            config.target_channels,
            code_size,
            frame_size,
            raw_capacity,
            encoded_capacity
        );

        Ok(Self {
            config,
            resampler,
            encoder,
            sink,
            raw: create_shared_buffer(raw_capacity),
            encoded: create_shared_buffer(encoded_capacity),
            frame_size,
            warmup_frames: 0,
            gate_open: Arc::new(AtomicBool::new(true)),
            remapped: Vec::with_capacity(raw_capacity),
            resampled: Vec::with_capacity(raw_capacity),
            decoded: Vec::with_capacity(raw_capacity),
            pcm: Vec::with_capacity(raw_capacity),
            code_block: vec![0u8; code_size],
            frame_block: vec![0u8; frame_size],
            batch: vec![0u8; BatchSize::Four.frames() * frame_size],
            stats: PipelineStats::default(),
        })
    }

    /// Run one captured block of interleaved f32 samples through the chain.
    ///
    /// Returns the number of batches emitted. A sink error is returned as-is
    /// and nothing further is emitted for this block.
    pub fn process(&mut self, samples: &[f32]) -> Result<usize> {
        self.stats.blocks_processed += 1;

        let mut current: &[f32] = samples;

        if self.config.needs_remap() {
            remap_channels(
                current,
                self.config.capture.channels,
                self.config.target_channels,
                &mut self.remapped,
            );
            current = &self.remapped;
        }

        if let Some(resampler) = self.resampler.as_mut() {
            match resampler.process(current, &mut self.resampled) {
                Ok(outcome) => {
                    if outcome.input_frames_used < outcome.input_frames {
                        self.stats.resampler_shortfalls += 1;
                        warn!(
                            "Resampler used {} of {} frames",
                            outcome.input_frames_used, outcome.input_frames
                        );
                    }
                    current = &self.resampled;
                }
                Err(e) => {
                    self.stats.resample_failures += 1;
                    warn!("Dropping capture block: {}", e);
                    current = &[];
                }
            }
        }

        f32_to_pcm16_le(current, &mut self.pcm);
        self.raw.copy_from(&self.pcm);

        self.encode_available();

        let mut emitted = 0;
        while self.emit_ready_batch()?.is_some() {
            emitted += 1;
        }

        if !self.is_gate_open() {
            self.stats.warmup_cycles += 1;
            trace!(
                buffered = self.encoded.current_length() / self.frame_size,
                target = self.warmup_frames,
                "Warming up"
            );
        } else if emitted == 0 {
            self.stats.underflow_cycles += 1;
            trace!(
                buffered = self.encoded.current_length() / self.frame_size,
                "Not enough encoded frames for a batch"
            );
        }

        Ok(emitted)
    }

    /// Like [`process`](Self::process) for raw little-endian f32 capture bytes
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut decoded = std::mem::take(&mut self.decoded);
        let result = f32_from_le_bytes(bytes, self.config.capture.channels, &mut decoded)
            .map_err(Into::into)
            .and_then(|_| self.process(&decoded));
        self.decoded = decoded;
        result
    }

    /// Encode every whole code block sitting in the raw ring
    fn encode_available(&mut self) {
        let code_size = self.code_block.len();

        while self.raw.current_length() >= code_size {
            self.raw.copy_to(&mut self.code_block);

            match self.encoder.encode(&self.code_block, &mut self.frame_block) {
                Ok(written) if written == self.frame_size => {
                    self.encoded.copy_from(&self.frame_block);
                    self.stats.frames_encoded += 1;
                }
                Ok(0) => {
                    self.stats.encode_failures += 1;
                    warn!("Encoder produced no output, block dropped");
                }
                Ok(written) => {
                    self.stats.encode_failures += 1;
                    warn!(
                        "Encoder produced {} bytes, expected {}, block dropped",
                        written, self.frame_size
                    );
                }
                Err(e) => {
                    self.stats.encode_failures += 1;
                    warn!("Encoding failed, block dropped: {}", e);
                }
            }
        }
    }

    /// Send one batch if at least two frames are buffered.
    ///
    /// Four frames are taken when available, otherwise two. Returns the size
    /// sent, or `None` when fewer than two frames are buffered or the
    /// warm-up gate is still closed.
    pub fn emit_ready_batch(&mut self) -> Result<Option<BatchSize>> {
        let available = self.encoded.current_length() / self.frame_size;

        if !self.is_gate_open() {
            if available < self.warmup_frames {
                return Ok(None);
            }
            debug!("Warm-up reached {} frames, transmitting", available);
            self.open_gate();
        }

        let Some(size) = BatchSize::select(available) else {
            return Ok(None);
        };

        let len = size.frames() * self.frame_size;
        self.encoded.copy_to(&mut self.batch[..len]);
        self.sink.emit(EncodedBatch {
            payload: &self.batch[..len],
            size,
        })?;

        match size {
            BatchSize::Two => self.stats.two_frame_batches += 1,
            BatchSize::Four => self.stats.four_frame_batches += 1,
        }
        Ok(Some(size))
    }

    /// Hold back reports after each reset until `frames` encoded frames are
    /// buffered. Clamped to what the encoded ring can hold; 0 disables.
    ///
    /// Closes the gate immediately, so call it before the session starts.
    pub fn set_warmup_frames(&mut self, frames: usize) {
        let capacity = self.encoded.capacity() / self.frame_size;
        if frames > capacity {
            warn!(
                "Warm-up of {} frames exceeds the encoded buffer, using {}",
                frames, capacity
            );
        }
        self.warmup_frames = frames.min(capacity);
        self.gate_open.store(self.warmup_frames == 0, Ordering::SeqCst);
    }

    pub fn warmup_frames(&self) -> usize {
        self.warmup_frames
    }

    /// Whether reports may be sent
    pub fn is_gate_open(&self) -> bool {
        self.gate_open.load(Ordering::Acquire)
    }

    /// Release the warm-up gate without waiting for the threshold
    pub fn open_gate(&self) {
        self.gate_open.store(true, Ordering::Release);
    }

    /// Shared gate flag, readable without locking the pipeline
    pub fn gate_flag(&self) -> Arc<AtomicBool> {
        self.gate_open.clone()
    }

    /// Clear buffers, resampler state and counters for a fresh session.
    ///
    /// Re-arms the warm-up gate.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.encoded.clear();
        self.gate_open.store(self.warmup_frames == 0, Ordering::SeqCst);
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.sink.reset();
        self.stats = PipelineStats::default();
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            raw_glitches: self.raw.glitches(),
            encoded_glitches: self.encoded.glitches(),
            ..self.stats.clone()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn code_size(&self) -> usize {
        self.code_block.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Post-resample PCM ring
    pub fn raw_buffer(&self) -> &SharedRingBuffer {
        &self.raw
    }

    /// Encoded frame ring
    pub fn encoded_buffer(&self) -> &SharedRingBuffer {
        &self.encoded
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
