//! Device output transport
//!
//! One call writes one complete report and flushes it; nothing is buffered
//! beyond the report in hand.

pub mod hidraw;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::TransportError;
use crate::protocol::MAX_REPORT_LEN;

pub use hidraw::{find_controllers, ControllerInfo, HidId};

/// Sink for finished output reports
pub trait Transport: Send {
    /// Write one report and flush it to the device
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        (**self).write_report(report)
    }
}

/// Writes reports to a HID device node (or any `Write`)
pub struct HidTransport<W: Write + Send = File> {
    writer: W,
    reports_written: u64,
    bytes_written: u64,
}

impl HidTransport<File> {
    /// Open a hidraw / HID device path for writing
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| TransportError::OpenFailed {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!("Opened controller at {}", path.display());
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> HidTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            reports_written: 0,
            bytes_written: 0,
        }
    }

    /// Reports successfully written and flushed
    pub fn reports_written(&self) -> u64 {
        self.reports_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Transport for HidTransport<W> {
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        if report.len() > MAX_REPORT_LEN {
            return Err(TransportError::ReportTooLarge {
                len: report.len(),
                max: MAX_REPORT_LEN,
            });
        }

        self.writer.write_all(report).map_err(|e| match e.kind() {
            std::io::ErrorKind::WriteZero => TransportError::Disconnected,
            _ => TransportError::WriteFailed(e),
        })?;
        self.writer.flush().map_err(TransportError::FlushFailed)?;

        self.reports_written += 1;
        self.bytes_written += report.len() as u64;
        Ok(())
    }
}
