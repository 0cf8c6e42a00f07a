//! Loopback endpoint lookup
//!
//! On Windows, system audio is captured from a render (output) endpoint:
//! cpal's WASAPI host runs loopback when an input stream is built on one.
//!
//! Other hosts have no such loopback. Building an input stream on the ALSA
//! "default" output opens the default *capture* source, which is usually a
//! microphone. There the endpoint must be named explicitly and is opened as
//! an input device, e.g. a PulseAudio/PipeWire monitor source or an
//! `snd-aloop` loopback PCM.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::audio::capture::CaptureFormat;
use crate::error::AudioError;

/// Wrapper around the cpal output device being captured
pub struct LoopbackDevice {
    inner: cpal::Device,
    pub name: String,
}

impl LoopbackDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { inner: device, name }
    }

    /// Open the default render endpoint
    #[cfg(windows)]
    pub fn open_default() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        host.default_output_device()
            .map(Self::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
    }

    /// No loopback of the default output exists off Windows
    #[cfg(not(windows))]
    pub fn open_default() -> Result<Self, AudioError> {
        Err(AudioError::DeviceNotFound(
            "default output loopback is only available on Windows; \
             set stream.capture_device to a monitor or loopback source"
                .to_string(),
        ))
    }

    /// Open a loopback endpoint by its exact name
    pub fn open_by_name(name: &str) -> Result<Self, AudioError> {
        for device in loopback_candidates()? {
            if let Ok(device_name) = device.name() {
                if device_name == name {
                    return Ok(Self::from_cpal(device));
                }
            }
        }

        Err(AudioError::DeviceNotFound(name.to_string()))
    }

    /// Open `name` if given, otherwise the default endpoint
    pub fn open(name: Option<&str>) -> Result<Self, AudioError> {
        match name {
            Some(name) => Self::open_by_name(name),
            None => Self::open_default(),
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// The mixer format the endpoint renders at, which is what loopback delivers
    #[cfg(windows)]
    pub fn native_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_output_config()
            .map_err(|e| AudioError::CpalError(e.to_string()))
    }

    /// Format of the monitor or loopback source
    #[cfg(not(windows))]
    pub fn native_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_input_config()
            .map_err(|e| AudioError::CpalError(e.to_string()))
    }

    /// Native format as seen by the pipeline
    pub fn capture_format(&self) -> Result<CaptureFormat, AudioError> {
        let config = self.native_config()?;
        Ok(CaptureFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        })
    }
}

/// Render endpoints on Windows, input devices elsewhere
fn loopback_candidates() -> Result<Vec<cpal::Device>, AudioError> {
    let host = cpal::default_host();

    #[cfg(windows)]
    let devices = host.output_devices();
    #[cfg(not(windows))]
    let devices = host.input_devices();

    devices
        .map(|devices| devices.collect())
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
}

/// Names of all endpoints that can be opened for loopback capture
pub fn list_loopback_devices() -> Vec<String> {
    match loopback_candidates() {
        Ok(devices) => devices.iter().filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate loopback devices: {}", e);
            Vec::new()
        }
    }
}
