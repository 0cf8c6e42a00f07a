//! Sample format conversion
//!
//! Byte-layout contract for everything that crosses a buffer boundary:
//! capture samples are interleaved `f32`, little-endian, 4 bytes each;
//! encoder input is interleaved signed 16-bit PCM, little-endian, 2 bytes
//! per sample. Nothing is reinterpreted in place; bytes are decoded and
//! encoded explicitly after a length check.

use crate::error::AudioError;

/// Bytes per signed 16-bit PCM sample
pub const PCM16_SAMPLE_BYTES: usize = 2;

/// Bytes per f32 capture sample
pub const F32_SAMPLE_BYTES: usize = 4;

/// Convert one float sample to i16, clamping out-of-range input.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Convert one i16 sample to float in `[-1.0, 1.0)`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Write `samples` into `out` as little-endian 16-bit PCM.
///
/// `out` is cleared first; its allocation is reused across calls.
pub fn f32_to_pcm16_le(samples: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * PCM16_SAMPLE_BYTES);
    for &sample in samples {
        out.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
}

/// Decode raw little-endian f32 capture bytes into `out`.
///
/// The byte count must cover a whole number of `channels`-wide frames.
/// Returns the number of samples decoded.
pub fn f32_from_le_bytes(
    bytes: &[u8],
    channels: u16,
    out: &mut Vec<f32>,
) -> Result<usize, AudioError> {
    let frame_bytes = F32_SAMPLE_BYTES * channels.max(1) as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(AudioError::InvalidPcmLayout {
            len: bytes.len(),
            channels,
        });
    }

    out.clear();
    out.extend(
        bytes
            .chunks_exact(F32_SAMPLE_BYTES)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    );
    Ok(out.len())
}

/// Convert interleaved audio from `from` to `to` channels.
///
/// Mono output averages every input channel, mono input is duplicated, and
/// otherwise the first `to` channels are kept (extra ones are silent).
pub fn remap_channels(input: &[f32], from: u16, to: u16, out: &mut Vec<f32>) {
    out.clear();
    let (from, to) = (from.max(1) as usize, to.max(1) as usize);

    for frame in input.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            for channel in 0..to {
                out.push(frame.get(channel).copied().unwrap_or(0.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_range() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(0.5), 16384);
        assert_eq!(f32_to_i16(-1.0), -32768);
        assert_eq!(f32_to_i16(1.0), 32767);
    }

    #[test]
    fn test_f32_to_i16_clamping() {
        assert_eq!(f32_to_i16(3.0), 32767);
        assert_eq!(f32_to_i16(-3.0), -32768);
    }

    #[test]
    fn test_i16_round_trip_is_exact() {
        for &original in &[0i16, 1, -1, 1000, -1000, 32767, -32768] {
            assert_eq!(f32_to_i16(i16_to_f32(original)), original);
        }
    }

    #[test]
    fn test_pcm16_le_layout() {
        let mut out = vec![0xEE; 3];
        f32_to_pcm16_le(&[0.5, -0.5], &mut out);
        assert_eq!(out, vec![0x00, 0x40, 0x00, 0xC0]);
    }

    #[test]
    fn test_f32_from_le_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());

        let mut out = Vec::new();
        assert_eq!(f32_from_le_bytes(&bytes, 2, &mut out).unwrap(), 2);
        assert_eq!(out, vec![0.25, -1.0]);
    }

    #[test]
    fn test_f32_from_le_bytes_rejects_partial_frames() {
        let mut out = Vec::new();
        let err = f32_from_le_bytes(&[0u8; 6], 1, &mut out).unwrap_err();
        assert!(matches!(err, AudioError::InvalidPcmLayout { len: 6, .. }));

        // Whole samples but half a stereo frame
        assert!(f32_from_le_bytes(&[0u8; 4], 2, &mut out).is_err());
    }

    #[test]
    fn test_remap_channels() {
        let mut out = Vec::new();

        remap_channels(&[0.5, -0.5, 1.0, 0.0], 2, 1, &mut out);
        assert_eq!(out, vec![0.0, 0.5]);

        remap_channels(&[0.25, -0.25], 1, 2, &mut out);
        assert_eq!(out, vec![0.25, 0.25, -0.25, -0.25]);

        // 5.1 down to stereo keeps front left/right
        remap_channels(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 6, 2, &mut out);
        assert_eq!(out, vec![0.1, 0.2]);
    }
}
