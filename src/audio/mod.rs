//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod convert;
pub mod device;
pub mod resample;

pub use buffer::{create_shared_buffer, RingBuffer, SharedRingBuffer};
pub use capture::{
    CaptureCallback, CaptureFormat, CaptureSource, LoopbackCapture, ManualCapture, ManualFeeder,
};
pub use device::{list_loopback_devices, LoopbackDevice};
pub use resample::{ResampleOutcome, Resampler, RubatoResampler};
