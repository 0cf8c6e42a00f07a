//! CRC-32 for output report trailers
//!
//! Reflected polynomial 0xEDB88320, seed 0xFFFFFFFF, final XOR 0xFFFFFFFF
//! (the zlib / IEEE 802.3 CRC-32). Stateless and table driven.

/// Reflected CRC-32 polynomial
pub const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Initial register value
pub const SEED: u32 = 0xFFFF_FFFF;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Feed `bytes` into a running (non-finalized) CRC register
#[inline]
pub fn update(crc: u32, bytes: &[u8]) -> u32 {
    bytes.iter().fold(crc, |crc, &byte| {
        TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
    })
}

/// Apply the final XOR
#[inline]
pub fn finalize(crc: u32) -> u32 {
    !crc
}

/// CRC-32 of a complete byte sequence
pub fn checksum(bytes: &[u8]) -> u32 {
    finalize(update(SEED, bytes))
}
