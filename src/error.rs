//! Error types for the audio streamer

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture and sample-processing errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Resampler initialization failed: {0}")]
    ResamplerInit(String),

    #[error("Resampling failed: {0}")]
    ResampleFailed(String),

    #[error("Invalid PCM layout: {len} bytes is not a whole number of {channels}-channel f32 frames")]
    InvalidPcmLayout { len: usize, channels: u16 },

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid codec configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoded frame of {frame_size} bytes does not fit a {frames}-frame report ({capacity} bytes)")]
    FrameTooLarge {
        frame_size: usize,
        frames: usize,
        capacity: usize,
    },
}

/// Device transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open device {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Report write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Report flush failed: {0}")]
    FlushFailed(#[source] std::io::Error),

    #[error("Report of {len} bytes exceeds the {max}-byte maximum")]
    ReportTooLarge { len: usize, max: usize },

    #[error("Device disconnected")]
    Disconnected,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
