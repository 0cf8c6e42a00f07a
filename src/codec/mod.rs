//! SBC codec wrapper
//!
//! The controller only understands SBC, so this is the one codec the
//! pipeline drives. The encoder itself is the system libsbc.

pub mod encoder;
#[cfg(feature = "libsbc")]
pub mod sbc;

pub use encoder::{Allocation, ChannelMode, FrameEncoder, SbcConfig};
#[cfg(feature = "libsbc")]
pub use sbc::SbcEncoder;
