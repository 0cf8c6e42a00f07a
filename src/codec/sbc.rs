//! SBC encoder backed by the system libsbc
//!
//! Only built with the `libsbc` feature, which links against `libsbc`.

#![allow(unsafe_code)] // FFI requires unsafe

use std::ffi::{c_int, c_ulong, c_void};

use crate::codec::encoder::{Allocation, ChannelMode, FrameEncoder, SbcConfig};
use crate::error::CodecError;

const SBC_FREQ_16000: u8 = 0x00;
const SBC_FREQ_32000: u8 = 0x01;
const SBC_FREQ_44100: u8 = 0x02;
const SBC_FREQ_48000: u8 = 0x03;

const SBC_BLK_4: u8 = 0x00;
const SBC_BLK_8: u8 = 0x01;
const SBC_BLK_12: u8 = 0x02;
const SBC_BLK_16: u8 = 0x03;

const SBC_MODE_MONO: u8 = 0x00;
const SBC_MODE_DUAL_CHANNEL: u8 = 0x01;
const SBC_MODE_STEREO: u8 = 0x02;
const SBC_MODE_JOINT_STEREO: u8 = 0x03;

const SBC_AM_LOUDNESS: u8 = 0x00;
const SBC_AM_SNR: u8 = 0x01;

const SBC_SB_4: u8 = 0x00;
const SBC_SB_8: u8 = 0x01;

const SBC_LE: u8 = 0x00;

/// Mirror of `sbc_t` from `<sbc/sbc.h>`
#[repr(C)]
struct SbcState {
    flags: c_ulong,
    frequency: u8,
    blocks: u8,
    subbands: u8,
    mode: u8,
    allocation: u8,
    bitpool: u8,
    endian: u8,
    priv_: *mut c_void,
    priv_alloc_base: *mut c_void,
}

#[link(name = "sbc")]
extern "C" {
    fn sbc_init(sbc: *mut SbcState, flags: c_ulong) -> c_int;
    fn sbc_encode(
        sbc: *mut SbcState,
        input: *const c_void,
        input_len: usize,
        output: *mut c_void,
        output_len: usize,
        written: *mut isize,
    ) -> isize;
    fn sbc_get_frame_length(sbc: *mut SbcState) -> usize;
    fn sbc_get_codesize(sbc: *mut SbcState) -> usize;
    fn sbc_finish(sbc: *mut SbcState);
}

/// libsbc encoder instance
pub struct SbcEncoder {
    /// Boxed so the address handed to libsbc never moves
    state: Box<SbcState>,
    code_size: usize,
    frame_size: usize,
}

// Safety: the libsbc state is owned exclusively by this struct and only
// touched through `&mut self`.
unsafe impl Send for SbcEncoder {}

impl SbcEncoder {
    /// Create an encoder for `config`
    pub fn new(config: &SbcConfig) -> Result<Self, CodecError> {
        config.validate()?;

        let mut state = Box::new(SbcState {
            flags: 0,
            frequency: 0,
            blocks: 0,
            subbands: 0,
            mode: 0,
            allocation: 0,
            bitpool: 0,
            endian: 0,
            priv_: std::ptr::null_mut(),
            priv_alloc_base: std::ptr::null_mut(),
        });

        // SAFETY: `state` is a valid, exclusively owned sbc_t
        let rc = unsafe { sbc_init(&mut *state, 0) };
        if rc < 0 {
            return Err(CodecError::EncoderInit(format!("sbc_init returned {}", rc)));
        }

        state.frequency = match config.sample_rate {
            16000 => SBC_FREQ_16000,
            32000 => SBC_FREQ_32000,
            44100 => SBC_FREQ_44100,
            _ => SBC_FREQ_48000,
        };
        state.subbands = if config.subbands == 4 { SBC_SB_4 } else { SBC_SB_8 };
        state.blocks = match config.blocks {
            4 => SBC_BLK_4,
            8 => SBC_BLK_8,
            12 => SBC_BLK_12,
            _ => SBC_BLK_16,
        };
        state.mode = match config.channel_mode {
            ChannelMode::Mono => SBC_MODE_MONO,
            ChannelMode::DualChannel => SBC_MODE_DUAL_CHANNEL,
            ChannelMode::Stereo => SBC_MODE_STEREO,
            ChannelMode::JointStereo => SBC_MODE_JOINT_STEREO,
        };
        state.allocation = match config.allocation {
            Allocation::Loudness => SBC_AM_LOUDNESS,
            Allocation::Snr => SBC_AM_SNR,
        };
        state.bitpool = config.bitpool;
        state.endian = SBC_LE;

        // SAFETY: state was initialised by sbc_init above
        let (code_size, frame_size) =
            unsafe { (sbc_get_codesize(&mut *state), sbc_get_frame_length(&mut *state)) };

        if code_size != config.code_size() || frame_size != config.frame_length() {
            tracing::warn!(
                "libsbc sizes differ from computed ones: code {} vs {}, frame {} vs {}",
                code_size,
                config.code_size(),
                frame_size,
                config.frame_length()
            );
        }

        Ok(Self {
            state,
            code_size,
            frame_size,
        })
    }
}

impl FrameEncoder for SbcEncoder {
    fn code_size(&self) -> usize {
        self.code_size
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn encode(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CodecError> {
        if input.len() != self.code_size {
            return Err(CodecError::EncodingFailed(format!(
                "expected {} PCM bytes, got {}",
                self.code_size,
                input.len()
            )));
        }

        let mut written: isize = 0;
        // SAFETY: pointers and lengths come from live slices; libsbc reads at
        // most `input.len()` and writes at most `output.len()` bytes.
        let consumed = unsafe {
            sbc_encode(
                &mut *self.state,
                input.as_ptr().cast(),
                input.len(),
                output.as_mut_ptr().cast(),
                output.len(),
                &mut written,
            )
        };

        if consumed < 0 {
            return Err(CodecError::EncodingFailed(format!(
                "sbc_encode returned {}",
                consumed
            )));
        }

        Ok(written.max(0) as usize)
    }
}

impl Drop for SbcEncoder {
    fn drop(&mut self) {
        // SAFETY: state was initialised in `new` and is finished exactly once
        unsafe { sbc_finish(&mut *self.state) };
    }
}
