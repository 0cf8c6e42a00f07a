//! Sample rate conversion
//!
//! The codec runs at a fixed rate while the loopback endpoint runs at
//! whatever the mixer is set to, so capture blocks are converted before they
//! reach the PCM ring buffer.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResamplerTrait};
use tracing::debug;

use crate::error::AudioError;

/// Input frames handed to rubato per processing step
const RESAMPLER_CHUNK_FRAMES: usize = 256;

/// Frame accounting for one resampler call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleOutcome {
    /// Frames offered by the caller
    pub input_frames: usize,
    /// Frames the resampler accepted (buffered or converted)
    pub input_frames_used: usize,
    /// Frames written to the output buffer
    pub output_frames: usize,
}

/// Converts interleaved f32 audio by a fixed ratio (target / native).
pub trait Resampler: Send {
    /// Convert `input` and replace the contents of `output` with the result.
    fn process(&mut self, input: &[f32], output: &mut Vec<f32>)
        -> Result<ResampleOutcome, AudioError>;

    /// Conversion ratio, output rate over input rate
    fn ratio(&self) -> f64;

    /// Forget any buffered input and filter state
    fn reset(&mut self);
}

/// Rubato-backed resampler for interleaved capture blocks.
///
/// rubato works on fixed-size planar chunks; capture blocks vary in size, so
/// leftover input is kept per channel until the next call tops it up.
pub struct RubatoResampler {
    inner: FastFixedIn<f32>,
    channels: usize,
    ratio: f64,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
    /// Planar output scratch, sized once
    planar_out: Vec<Vec<f32>>,
}

impl RubatoResampler {
    /// Create a resampler converting `input_rate` to `output_rate`
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self, AudioError> {
        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(AudioError::ResamplerInit(format!(
                "invalid conversion {}Hz -> {}Hz with {} channels",
                input_rate, output_rate, channels
            )));
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let channels = channels as usize;

        let inner = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            RESAMPLER_CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| AudioError::ResamplerInit(e.to_string()))?;

        let max_out = inner.output_frames_max();

        debug!(
            "Resampler {}Hz -> {}Hz ({} channels, ratio {:.4})",
            input_rate, output_rate, channels, ratio
        );

        Ok(Self {
            inner,
            channels,
            ratio,
            pending: vec![Vec::with_capacity(RESAMPLER_CHUNK_FRAMES * 4); channels],
            planar_out: vec![vec![0.0; max_out]; channels],
        })
    }
}

impl Resampler for RubatoResampler {
    fn process(
        &mut self,
        input: &[f32],
        output: &mut Vec<f32>,
    ) -> Result<ResampleOutcome, AudioError> {
        output.clear();

        let input_frames = input.len() / self.channels;
        for frame in input.chunks_exact(self.channels) {
            for (channel, &sample) in self.pending.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        let mut output_frames = 0;
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let (used, produced) = self
                .inner
                .process_into_buffer(&self.pending[..], &mut self.planar_out[..], None)
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;

            for i in 0..produced {
                for channel in &self.planar_out {
                    output.push(channel[i]);
                }
            }
            for channel in &mut self.pending {
                channel.drain(..used);
            }
            output_frames += produced;
        }

        Ok(ResampleOutcome {
            input_frames,
            input_frames_used: input_frames,
            output_frames,
        })
    }

    fn ratio(&self) -> f64 {
        self.ratio
    }

    fn reset(&mut self) {
        self.inner.reset();
        for channel in &mut self.pending {
            channel.clear();
        }
    }
}
