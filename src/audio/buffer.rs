//! Lock-guarded sliding-window ring buffer
//!
//! Sits between the capture callback and the encoder, and again between the
//! encoder and the report builder. Writes never block: when a write would
//! exceed capacity the oldest bytes are discarded. Reads never block either:
//! a short read is padded with zeroes and counted as a glitch.
//!
//! Cursor movement and the `has_data` flag are only ever touched under the
//! buffer's own lock, so `current_length` can never observe a torn state.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cursor state guarded by the buffer lock.
///
/// `start == end` is ambiguous on its own; `has_data` tells "full" from "empty".
struct RingState<T> {
    data: Box<[T]>,
    start: usize,
    end: usize,
    has_data: bool,
}

impl<T: Copy + Default> RingState<T> {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn len(&self) -> usize {
        let capacity = self.capacity();
        if self.end > self.start {
            self.end - self.start
        } else if self.end < self.start {
            self.end + capacity - self.start
        } else if self.has_data {
            capacity
        } else {
            0
        }
    }

    fn write(&mut self, src: &[T]) {
        if src.is_empty() {
            return;
        }

        let capacity = self.capacity();
        // Only the newest `capacity` items can survive the write anyway
        let src = if src.len() > capacity {
            &src[src.len() - capacity..]
        } else {
            src
        };

        let overflow = (self.len() + src.len()).saturating_sub(capacity);

        let first = (capacity - self.end).min(src.len());
        self.data[self.end..self.end + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        self.data[..rest].copy_from_slice(&src[first..]);

        self.end = (self.end + src.len()) % capacity;
        if overflow > 0 {
            // Full after an overwrite: the oldest surviving item sits at `end`
            self.start = self.end;
        }
        self.has_data = true;
    }

    /// Returns the number of items taken from the buffer.
    fn read(&mut self, dst: &mut [T]) -> usize {
        if dst.is_empty() {
            return 0;
        }

        let capacity = self.capacity();
        let taken = dst.len().min(self.len());

        let first = (capacity - self.start).min(taken);
        dst[..first].copy_from_slice(&self.data[self.start..self.start + first]);
        let rest = taken - first;
        dst[first..taken].copy_from_slice(&self.data[..rest]);

        self.start = (self.start + taken) % capacity;

        if taken < dst.len() {
            dst[taken..].fill(T::default());
            self.has_data = false;
        } else if self.start == self.end {
            self.has_data = false;
        }

        taken
    }
}

/// Fixed-capacity ring of `T` (bytes by default) with overwrite-oldest writes
/// and zero-filling reads.
pub struct RingBuffer<T = u8> {
    state: Mutex<RingState<T>>,
    glitches: AtomicU64,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer holding at most `capacity` items
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");

        Self {
            state: Mutex::new(RingState {
                data: vec![T::default(); capacity].into_boxed_slice(),
                start: 0,
                end: 0,
                has_data: false,
            }),
            glitches: AtomicU64::new(0),
        }
    }

    /// Append `src`, discarding the oldest items if it does not fit
    pub fn copy_from(&self, src: &[T]) {
        self.state.lock().write(src);
    }

    /// Fill `dst` in logical order.
    ///
    /// If fewer than `dst.len()` items are buffered the tail of `dst` is
    /// zero-filled and the glitch counter is bumped once. Returns the number
    /// of real items copied.
    pub fn copy_to(&self, dst: &mut [T]) -> usize {
        let taken = self.state.lock().read(dst);

        if taken < dst.len() {
            let count = self.glitches.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                requested = dst.len(),
                available = taken,
                glitches = count,
                "Ring buffer underrun, zero-filled"
            );
        }

        taken
    }

    /// Number of items currently buffered
    pub fn current_length(&self) -> usize {
        self.state.lock().len()
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.current_length() == 0
    }

    /// Number of underruns since creation or the last `clear`
    pub fn glitches(&self) -> u64 {
        self.glitches.load(Ordering::Relaxed)
    }

    /// Drop all buffered data and reset the glitch counter
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.start = 0;
        state.end = 0;
        state.has_data = false;
        self.glitches.store(0, Ordering::Relaxed);
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared byte ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ring_buffer_basic() {
        let buffer = RingBuffer::<u8>::new(8);
        buffer.copy_from(&[1, 2, 3]);
        assert_eq!(buffer.current_length(), 3);

        let mut out = [0u8; 3];
        assert_eq!(buffer.copy_to(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.glitches(), 0);
    }

    #[test]
    fn test_zero_length_calls_are_noops() {
        let buffer = RingBuffer::<u8>::new(4);
        buffer.copy_from(&[]);
        assert!(buffer.is_empty());

        let mut out: [u8; 0] = [];
        assert_eq!(buffer.copy_to(&mut out), 0);
        assert_eq!(buffer.glitches(), 0);
    }

    #[test]
    fn test_exact_fill_reports_full() {
        let buffer = RingBuffer::<u8>::new(4);
        buffer.copy_from(&[1, 2]);
        buffer.copy_from(&[3, 4]);
        assert_eq!(buffer.current_length(), 4);

        let mut out = [0u8; 4];
        buffer.copy_to(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(buffer.current_length(), 0);
    }

    #[test]
    fn test_wrap_around_read_and_write() {
        let buffer = RingBuffer::<u8>::new(5);
        buffer.copy_from(&[1, 2, 3, 4]);
        let mut out = [0u8; 3];
        buffer.copy_to(&mut out);
        assert_eq!(out, [1, 2, 3]);

        // end wraps past the backing array
        buffer.copy_from(&[5, 6, 7]);
        assert_eq!(buffer.current_length(), 4);

        let mut out = [0u8; 4];
        buffer.copy_to(&mut out);
        assert_eq!(out, [4, 5, 6, 7]);
        assert_eq!(buffer.glitches(), 0);
    }

    #[test]
    fn test_overwrite_discards_oldest() {
        let buffer = RingBuffer::<u8>::new(4);
        buffer.copy_from(&[1, 2, 3]);
        buffer.copy_from(&[4, 5, 6]);
        assert_eq!(buffer.current_length(), 4);

        let mut out = [0u8; 4];
        buffer.copy_to(&mut out);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn test_write_larger_than_capacity() {
        let buffer = RingBuffer::<u8>::new(3);
        buffer.copy_from(&[9]);
        buffer.copy_from(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(buffer.current_length(), 3);

        let mut out = [0u8; 3];
        buffer.copy_to(&mut out);
        assert_eq!(out, [5, 6, 7]);
    }

    #[test]
    fn test_underrun_zero_fills_and_counts() {
        let buffer = RingBuffer::<u8>::new(8);
        buffer.copy_from(&[7, 8]);

        let mut out = [0xAAu8; 5];
        assert_eq!(buffer.copy_to(&mut out), 2);
        assert_eq!(out, [7, 8, 0, 0, 0]);
        assert_eq!(buffer.glitches(), 1);
        assert!(buffer.is_empty());

        // Empty buffer afterwards is still usable
        buffer.copy_from(&[1]);
        assert_eq!(buffer.current_length(), 1);
    }

    #[test]
    fn test_clear_resets_state() {
        let buffer = RingBuffer::<u8>::new(4);
        buffer.copy_from(&[1, 2, 3]);
        let mut out = [0u8; 4];
        buffer.copy_to(&mut out);
        assert_eq!(buffer.glitches(), 1);

        buffer.copy_from(&[1]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.glitches(), 0);
    }

    #[test]
    fn test_generic_samples() {
        let buffer = RingBuffer::<i16>::new(4);
        buffer.copy_from(&[-1, 2, -3]);
        let mut out = [0i16; 3];
        buffer.copy_to(&mut out);
        assert_eq!(out, [-1, 2, -3]);
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_capacity(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..8)
        ) {
            let buffer = RingBuffer::<u8>::new(256);
            // Offset the cursors so writes straddle the wrap point
            buffer.copy_from(&[0u8; 200]);
            let mut skip = [0u8; 200];
            buffer.copy_to(&mut skip);

            let expected: Vec<u8> = chunks.iter().flatten().copied().collect();
            for chunk in &chunks {
                buffer.copy_from(chunk);
            }

            let mut out = vec![0u8; expected.len()];
            prop_assert_eq!(buffer.copy_to(&mut out), expected.len());
            prop_assert_eq!(out, expected);
            prop_assert_eq!(buffer.glitches(), 0);
        }

        #[test]
        fn prop_overwrite_keeps_most_recent(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..40), 1..10),
            capacity in 1usize..64
        ) {
            let buffer = RingBuffer::<u8>::new(capacity);
            for chunk in &chunks {
                buffer.copy_from(chunk);
                prop_assert!(buffer.current_length() <= capacity);
            }

            let all: Vec<u8> = chunks.iter().flatten().copied().collect();
            let kept = all.len().min(capacity);
            prop_assert_eq!(buffer.current_length(), kept);

            let mut out = vec![0u8; kept];
            buffer.copy_to(&mut out);
            prop_assert_eq!(&out[..], &all[all.len() - kept..]);
        }

        #[test]
        fn prop_underrun_pads_with_zeroes(
            data in proptest::collection::vec(any::<u8>(), 0..32),
            extra in 1usize..32
        ) {
            let buffer = RingBuffer::<u8>::new(64);
            buffer.copy_from(&data);

            let mut out = vec![0xFFu8; data.len() + extra];
            prop_assert_eq!(buffer.copy_to(&mut out), data.len());
            prop_assert_eq!(&out[..data.len()], &data[..]);
            prop_assert!(out[data.len()..].iter().all(|&b| b == 0));
            prop_assert_eq!(buffer.glitches(), 1);
        }
    }
}
