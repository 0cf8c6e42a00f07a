//! Report emitter
//!
//! Turns each batch into one output report and writes it straight to the
//! transport. The rolling counter embedded in a report is the value before
//! that report's frames are added.

use crate::error::Result;
use crate::protocol::{build_report, AudioMode, BatchSize, ReportBuffer, MAX_REPORT_LEN};
use crate::stream::pipeline::{BatchSink, EncodedBatch};
use crate::transport::Transport;

/// Builds and sends reports for one controller
pub struct FrameEmitter<T> {
    transport: T,
    counter: u16,
    mode: AudioMode,
    device_id: u8,
    /// Reused for every report
    report: ReportBuffer,
    reports_sent: u64,
}

impl<T: Transport> FrameEmitter<T> {
    pub fn new(transport: T, mode: AudioMode, device_id: u8) -> Self {
        Self {
            transport,
            counter: 0,
            mode,
            device_id,
            report: [0u8; MAX_REPORT_LEN],
            reports_sent: 0,
        }
    }

    /// Build a report around `payload` and write it.
    ///
    /// The counter only advances once the write succeeded.
    pub fn send(&mut self, size: BatchSize, payload: &[u8]) -> Result<()> {
        let len = build_report(
            &mut self.report,
            size,
            self.counter,
            self.mode,
            self.device_id,
            payload,
        )?;

        self.transport.write_report(&self.report[..len])?;

        self.counter = self.counter.wrapping_add(size.frames() as u16);
        self.reports_sent += 1;
        Ok(())
    }

    /// Counter value the next report will carry
    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn reset_counter(&mut self) {
        self.counter = 0;
    }

    pub fn reports_sent(&self) -> u64 {
        self.reports_sent
    }

    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: Transport> BatchSink for FrameEmitter<T> {
    fn emit(&mut self, batch: EncodedBatch<'_>) -> Result<()> {
        self.send(batch.size, batch.payload)
    }

    fn reset(&mut self) {
        self.reset_counter();
        self.reports_sent = 0;
    }
}
