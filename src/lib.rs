//! # DS4 Audio Streamer
//!
//! Streams whatever the PC is playing to a DualShock 4 controller's headset
//! jack or speaker, as SBC frames packed into HID output reports.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        capture callback thread                        │
//! │                                                                       │
//! │  ┌────────────────┐   f32 blocks   ┌──────────────────────────────┐  │
//! │  │LoopbackCapture │ ─────────────▶ │  AudioPipeline (stream)       │  │
//! │  │(audio::capture)│                │                               │  │
//! │  └────────────────┘                │  remap ─▶ resample ─▶ i16 LE  │  │
//! │                                    │            │                  │  │
//! │                                    │            ▼                  │  │
//! │                                    │     ┌─────────────┐           │  │
//! │                                    │     │  raw ring   │           │  │
//! │                                    │     └──────┬──────┘           │  │
//! │                                    │            ▼ code_size blocks │  │
//! │                                    │     ┌─────────────┐           │  │
//! │                                    │     │ SBC encoder │           │  │
//! │                                    │     └──────┬──────┘           │  │
//! │                                    │            ▼                  │  │
//! │                                    │     ┌─────────────┐           │  │
//! │                                    │     │encoded ring │           │  │
//! │                                    │     └──────┬──────┘           │  │
//! │                                    └────────────┼──────────────────┘  │
//! │                                                 ▼ 2 or 4 frames       │
//! │                                    ┌──────────────────────────────┐  │
//! │                                    │ FrameEmitter                  │  │
//! │                                    │ code|40|A2|ctr|mode|SBC|CRC   │  │
//! │                                    └────────────┬─────────────────┘  │
//! └─────────────────────────────────────────────────┼─────────────────────┘
//!                                                   ▼ write + flush
//!                                         HID device (transport)
//! ```
//!
//! Everything from capture to the device write runs inline on the capture
//! callback. [`stream::StreamSession`] owns the capture source and reports
//! fatal errors back to its owner.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod stream;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Encoder sample rate the controller expects
    pub const DEFAULT_SAMPLE_RATE: u32 = 32000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Capture latency the ring buffers are sized for
    pub const DEFAULT_BUFFER_LATENCY_MS: u32 = 32;

    /// Trailing id byte on four-frame reports
    pub const DEFAULT_DEVICE_ID: u8 = 1;

    /// How long to wait for warm-up frames before streaming anyway
    pub const WARMUP_TIMEOUT_MS: u64 = 2000;
}
