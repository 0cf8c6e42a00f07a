//! Application configuration
//!
//! Stored as TOML in the platform config directory, e.g.
//! `~/.config/ds4-audio-streamer/config.toml` on Linux. Every field has a
//! default, so a partial (or missing) file is fine.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::SbcConfig;
use crate::constants;
use crate::error::{Error, Result};
use crate::protocol::AudioMode;

const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamSettings,
    pub codec: SbcConfig,
    pub device: DeviceSettings,
}

/// Capture and buffering settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Rate the encoder runs at; capture is resampled to it
    pub target_sample_rate: u32,
    pub channels: u16,
    /// Capture latency the ring buffers are sized for
    pub buffer_latency_ms: u32,
    /// Encoded frames to wait for after start, 0 to skip
    pub warmup_frames: usize,
    /// Endpoint to capture. Windows falls back to the default output when
    /// unset; elsewhere this must name a monitor or loopback input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_device: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: constants::DEFAULT_SAMPLE_RATE,
            channels: constants::DEFAULT_CHANNELS,
            buffer_latency_ms: constants::DEFAULT_BUFFER_LATENCY_MS,
            warmup_frames: 0,
            capture_device: None,
        }
    }
}

/// Controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// HID device node; discovered automatically if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hid_path: Option<PathBuf>,
    /// Trailing id byte on four-frame reports
    pub device_id: u8,
    pub mode: AudioMode,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            hid_path: None,
            device_id: constants::DEFAULT_DEVICE_ID,
            mode: AudioMode::Headset,
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ds4-audio-streamer")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => {
                tracing::debug!("No config directory available, using defaults");
                return Ok(Self::default());
            }
        };

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write to `path`, or the default location when `None`
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .ok_or_else(|| Error::Config("no config directory available".into()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Check settings that would otherwise fail later at session start
    pub fn validate(&self) -> Result<()> {
        self.codec.validate()?;

        if self.stream.target_sample_rate != self.codec.sample_rate {
            return Err(Error::Config(format!(
                "stream rate {}Hz does not match codec rate {}Hz",
                self.stream.target_sample_rate, self.codec.sample_rate
            )));
        }
        if self.stream.channels != self.codec.channels() {
            return Err(Error::Config(format!(
                "stream has {} channels but codec mode {:?} needs {}",
                self.stream.channels,
                self.codec.channel_mode,
                self.codec.channels()
            )));
        }
        if self.stream.buffer_latency_ms == 0 {
            return Err(Error::Config("buffer_latency_ms must be non-zero".into()));
        }

        Ok(())
    }
}
