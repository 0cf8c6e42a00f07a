//! Block encoder interface and SBC parameters
//!
//! The encoder turns exactly one block of 16-bit PCM (`code_size` bytes)
//! into one encoded frame (`frame_size` bytes). Both sizes are fixed by the
//! configuration for the whole session.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Fixed-block audio encoder
pub trait FrameEncoder: Send {
    /// PCM bytes consumed per call
    fn code_size(&self) -> usize;

    /// Encoded bytes produced per call
    fn frame_size(&self) -> usize;

    /// Encode one `code_size` block into `output`.
    ///
    /// Returns the number of bytes written. `Ok(0)` and `Err` both mean this
    /// block produced nothing usable; callers treat either as non-fatal.
    fn encode(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CodecError>;
}

/// SBC channel mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    Mono,
    DualChannel,
    Stereo,
    JointStereo,
}

/// SBC bit allocation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    Loudness,
    Snr,
}

/// SBC encoder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SbcConfig {
    /// Sample rate in Hz (16000, 32000, 44100 or 48000)
    pub sample_rate: u32,
    /// Subbands (4 or 8)
    pub subbands: u8,
    /// Blocks per frame (4, 8, 12 or 16)
    pub blocks: u8,
    pub channel_mode: ChannelMode,
    pub allocation: Allocation,
    pub bitpool: u8,
}

impl Default for SbcConfig {
    /// Parameters the controller's headset jack accepts
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            subbands: 8,
            blocks: 16,
            channel_mode: ChannelMode::JointStereo,
            allocation: Allocation::Snr,
            bitpool: 48,
        }
    }
}

impl SbcConfig {
    /// Number of audio channels implied by the channel mode
    pub fn channels(&self) -> u16 {
        match self.channel_mode {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    /// PCM bytes per encoder call (16-bit samples)
    pub fn code_size(&self) -> usize {
        self.subbands as usize * self.blocks as usize * self.channels() as usize * 2
    }

    /// Encoded frame length in bytes
    pub fn frame_length(&self) -> usize {
        let subbands = self.subbands as usize;
        let blocks = self.blocks as usize;
        let channels = self.channels() as usize;
        let bitpool = self.bitpool as usize;

        let header = 4 + (4 * subbands * channels) / 8;
        let audio_bits = match self.channel_mode {
            ChannelMode::Mono | ChannelMode::DualChannel => blocks * channels * bitpool,
            ChannelMode::Stereo => blocks * bitpool,
            ChannelMode::JointStereo => subbands + blocks * bitpool,
        };

        header + audio_bits.div_ceil(8)
    }

    /// Playback time of one frame in microseconds
    pub fn frame_duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.blocks as u64 * self.subbands as u64 * 1_000_000 / self.sample_rate as u64
    }

    /// Reject parameter combinations the codec cannot represent
    pub fn validate(&self) -> Result<(), CodecError> {
        if !matches!(self.sample_rate, 16000 | 32000 | 44100 | 48000) {
            return Err(CodecError::InvalidConfig(format!(
                "unsupported sample rate {}Hz",
                self.sample_rate
            )));
        }
        if !matches!(self.subbands, 4 | 8) {
            return Err(CodecError::InvalidConfig(format!(
                "subbands must be 4 or 8, got {}",
                self.subbands
            )));
        }
        if !matches!(self.blocks, 4 | 8 | 12 | 16) {
            return Err(CodecError::InvalidConfig(format!(
                "blocks must be 4, 8, 12 or 16, got {}",
                self.blocks
            )));
        }

        let max_bitpool = match self.channel_mode {
            ChannelMode::Mono | ChannelMode::DualChannel => 16 * self.subbands as u32,
            ChannelMode::Stereo | ChannelMode::JointStereo => 32 * self.subbands as u32,
        };
        if self.bitpool < 2 || self.bitpool as u32 > max_bitpool {
            return Err(CodecError::InvalidConfig(format!(
                "bitpool {} outside 2..={} for {:?}",
                self.bitpool, max_bitpool, self.channel_mode
            )));
        }

        Ok(())
    }
}
