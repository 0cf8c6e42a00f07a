//! Controller audio output reports
//!
//! Each report carries two or four SBC frames:
//!
//! ```text
//! offset  field
//! 0       report code (0x14 two frames, 0x17 four frames)
//! 1       0x40
//! 2       0xA2
//! 3..5    rolling frame counter, little-endian
//! 5       audio routing mode (0x24 headset, 0x02 speaker)
//! 6..     SBC frames, zero padded
//! size-4  CRC-32, little-endian
//! size    device id (four-frame reports only)
//! ```
//!
//! The CRC covers a leading 0xA2 transport byte that is not part of the
//! report itself, followed by bytes `0..size-4`.

pub mod crc;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Transport header byte prepended to the checksum input but never written
pub const CRC_HEADER: u8 = 0xA2;

/// Fixed byte at offset 1
pub const MARKER: u8 = 0x40;

/// Fixed byte at offset 2, echoing the transport header
pub const MARKER_ECHO: u8 = 0xA2;

/// Bytes before the payload
pub const HEADER_LEN: usize = 6;

/// Checksum trailer length
pub const CRC_LEN: usize = 4;

/// Largest report written to the device, in bytes
pub const MAX_REPORT_LEN: usize = 463;

/// Scratch space large enough for any report
pub type ReportBuffer = [u8; MAX_REPORT_LEN];

/// Number of encoded frames bundled into one report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchSize {
    Two,
    Four,
}

impl BatchSize {
    /// Pick the largest batch `available_frames` can fill, if any
    pub fn select(available_frames: usize) -> Option<Self> {
        if available_frames >= 4 {
            Some(Self::Four)
        } else if available_frames >= 2 {
            Some(Self::Two)
        } else {
            None
        }
    }

    pub fn frames(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Four => 4,
        }
    }

    /// Report code at offset 0
    pub fn report_code(self) -> u8 {
        match self {
            Self::Two => 0x14,
            Self::Four => 0x17,
        }
    }

    /// Report length up to and including the checksum
    pub fn report_size(self) -> usize {
        match self {
            Self::Two => 270,
            Self::Four => 462,
        }
    }

    /// Bytes actually written to the device
    pub fn wire_len(self) -> usize {
        match self {
            Self::Two => self.report_size(),
            Self::Four => self.report_size() + 1,
        }
    }

    /// Room for encoded frames between header and checksum
    pub fn payload_capacity(self) -> usize {
        self.report_size() - HEADER_LEN - CRC_LEN
    }
}

/// Where the controller routes the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// 3.5mm headset jack
    #[default]
    Headset,
    /// Built-in speaker
    Speaker,
}

impl AudioMode {
    /// Mode flag at offset 5
    pub fn flag(self) -> u8 {
        match self {
            Self::Headset => 0x24,
            Self::Speaker => 0x02,
        }
    }
}

/// Check that a batch of `frame_size` frames fits its report
pub fn check_frame_fits(frame_size: usize, batch: BatchSize) -> Result<(), CodecError> {
    let capacity = batch.payload_capacity();
    if frame_size * batch.frames() > capacity {
        return Err(CodecError::FrameTooLarge {
            frame_size,
            frames: batch.frames(),
            capacity,
        });
    }
    Ok(())
}

/// CRC-32 of a report body including the virtual transport header
pub fn report_checksum(body: &[u8]) -> u32 {
    crc::finalize(crc::update(crc::update(crc::SEED, &[CRC_HEADER]), body))
}

/// Build one report into `buf` and return its wire length.
///
/// `buf[..wire_len]` is fully overwritten, so the same scratch buffer can be
/// reused for every report.
pub fn build_report(
    buf: &mut ReportBuffer,
    batch: BatchSize,
    counter: u16,
    mode: AudioMode,
    device_id: u8,
    payload: &[u8],
) -> Result<usize, CodecError> {
    let capacity = batch.payload_capacity();
    if payload.len() > capacity {
        return Err(CodecError::FrameTooLarge {
            frame_size: payload.len() / batch.frames(),
            frames: batch.frames(),
            capacity,
        });
    }

    let size = batch.report_size();
    let wire_len = batch.wire_len();
    let report = &mut buf[..wire_len];
    report.fill(0);

    report[0] = batch.report_code();
    report[1] = MARKER;
    report[2] = MARKER_ECHO;
    report[3..5].copy_from_slice(&counter.to_le_bytes());
    report[5] = mode.flag();
    report[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);

    let crc = report_checksum(&report[..size - CRC_LEN]);
    report[size - CRC_LEN..size].copy_from_slice(&crc.to_le_bytes());

    if batch == BatchSize::Four {
        report[size] = device_id;
    }

    Ok(wire_len)
}

/// Decoded view of a report, as checked by [`parse_report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport<'a> {
    pub batch: BatchSize,
    pub counter: u16,
    pub mode_flag: u8,
    /// Everything between header and checksum, padding included
    pub payload: &'a [u8],
    pub device_id: Option<u8>,
}

/// Parse a report written by [`build_report`], verifying length and checksum
pub fn parse_report(bytes: &[u8]) -> Option<ParsedReport<'_>> {
    let batch = match bytes.first()? {
        0x14 => BatchSize::Two,
        0x17 => BatchSize::Four,
        _ => return None,
    };
    if bytes.len() != batch.wire_len() || bytes[1] != MARKER || bytes[2] != MARKER_ECHO {
        return None;
    }

    let size = batch.report_size();
    let stored = u32::from_le_bytes([
        bytes[size - 4],
        bytes[size - 3],
        bytes[size - 2],
        bytes[size - 1],
    ]);
    if stored != report_checksum(&bytes[..size - CRC_LEN]) {
        return None;
    }

    Some(ParsedReport {
        batch,
        counter: u16::from_le_bytes([bytes[3], bytes[4]]),
        mode_flag: bytes[5],
        payload: &bytes[HEADER_LEN..size - CRC_LEN],
        device_id: (batch == BatchSize::Four).then(|| bytes[size]),
    })
}
