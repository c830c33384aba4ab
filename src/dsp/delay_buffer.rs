//! # Delay Buffer (Byte-Arena Ring Buffer)
//!
//! The delay buffer is the pedal's "tape": a fixed block of bytes that the
//! write head records into, wrapping back to the start when it reaches the
//! end. It is allocated once and never resized.
//!
//! ## Slots, Not Samples
//!
//! Samples are stored through the [codec](super::codec), so a slot is one
//! or two bytes depending on the active [`BitDepth`]. The number of slots is
//!
//! ```text
//! N = capacity_bytes / bytes_per_sample(bit_depth)
//! ```
//!
//! and every index handed to the buffer is reduced modulo `N` before it
//! touches memory. Negative indices are fine: `read(-1)` is the slot just
//! before slot 0, i.e. slot `N - 1`. Changing the bit depth changes `N`,
//! which is why it is only ever done between callbacks.
//!
//! ## Fade-In Write
//!
//! When the write head jumps ([`DelayBuffer::set_write_head`]) the slot it
//! lands on still holds old audio, and butting new audio up against it
//! would click. For the next [`FADE_WINDOW`] writes the incoming sample is
//! blended with the sample it replaces:
//!
//! ```text
//! t       = remaining / FADE_WINDOW       (1.0 just after the jump)
//! written = lerp(incoming, previous, t)
//! ```

use std::num::NonZeroUsize;

use nih_plug::nih_debug_assert;

use super::codec::{self, BitDepth};

/// Length in samples of every crossfade the engine performs: fade-in
/// writes, play head retargeting and loop boundaries.
pub const FADE_WINDOW: usize = 64;

/// Read-only view of a ring of samples.
///
/// The play head reads through this trait and never gets mutable access to
/// the storage it is playing back.
pub trait SampleSource {
    /// Decode the sample at `index`, wrapped into the ring.
    fn read(&self, index: i64) -> i16;

    /// Slot the next incoming sample will be written to.
    fn write_head(&self) -> usize;

    /// Number of slots in the ring. Always at least one.
    fn len(&self) -> usize;

    /// Reduce any integer index into `0..len()`.
    fn wrap(&self, index: i64) -> usize {
        index.rem_euclid(self.len() as i64) as usize
    }
}

/// Linear interpolation between two samples, rounded to the nearest value.
#[inline]
pub fn lerp_sample(from: i16, to: i16, t: f32) -> i16 {
    let from = f32::from(from);
    let to = f32::from(to);
    (from + (to - from) * t).round() as i16
}

/// A ring of encoded samples with a single write head.
pub struct DelayBuffer {
    /// Backing storage. Its length never changes after construction; only
    /// its interpretation (slot size) does.
    bytes: Box<[u8]>,

    bit_depth: BitDepth,

    /// Slot count under the current bit depth.
    num_samples: usize,

    /// Always in `0..num_samples`.
    write_head: usize,

    /// Writes left in the current fade-in. Zero when no fade is running.
    fade_samples_remaining: usize,
}

impl DelayBuffer {
    /// Allocate a silent buffer of `capacity_bytes` at full resolution.
    ///
    /// The capacity must hold at least one slot at every bit depth, which
    /// [`crate::config::EngineConfig::validate`] guarantees for the engine.
    pub fn new(capacity_bytes: NonZeroUsize) -> Self {
        let bit_depth = BitDepth::default();
        let capacity = capacity_bytes.get().max(bit_depth.bytes_per_sample());
        Self {
            bytes: vec![0; capacity].into_boxed_slice(),
            bit_depth,
            num_samples: capacity / bit_depth.bytes_per_sample(),
            write_head: 0,
            fade_samples_remaining: 0,
        }
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// `true` while writes are still being blended after a head jump.
    pub fn is_fading(&self) -> bool {
        self.fade_samples_remaining > 0
    }

    fn slot(&self, index: usize) -> &[u8] {
        let width = self.bit_depth.bytes_per_sample();
        let start = index * width;
        &self.bytes[start..start + width]
    }

    fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let width = self.bit_depth.bytes_per_sample();
        let start = index * width;
        &mut self.bytes[start..start + width]
    }

    /// Encode `samples` into consecutive slots starting at the write head,
    /// then advance the head past them.
    pub fn write_block(&mut self, samples: &[i16]) {
        for &sample in samples {
            let index = self.write_head;
            let value = if self.fade_samples_remaining > 0 {
                let previous = codec::decode(self.slot(index), self.bit_depth);
                let t = self.fade_samples_remaining as f32 / FADE_WINDOW as f32;
                self.fade_samples_remaining -= 1;
                lerp_sample(sample, previous, t)
            } else {
                sample
            };

            let depth = self.bit_depth;
            codec::encode(value, depth, self.slot_mut(index));
            self.write_head = (index + 1) % self.num_samples;
        }
    }

    /// Jump the write head to `new_head` (any integer, wrapped) and blend
    /// the next [`FADE_WINDOW`] writes into the existing content.
    pub fn set_write_head(&mut self, new_head: i64) {
        self.write_head = self.wrap(new_head);
        self.fade_samples_remaining = FADE_WINDOW;
    }

    /// Reinterpret the arena at a new bit depth.
    ///
    /// Setting the depth that is already active changes nothing. A real
    /// change resizes the slot count, silences the arena (old bytes would
    /// decode as noise under the new layout) and re-wraps the write head.
    /// Returns whether the layout changed, so callers know to re-anchor any
    /// positions they computed under the old slot count.
    pub fn set_bit_depth(&mut self, depth: BitDepth) -> bool {
        if depth == self.bit_depth {
            return false;
        }

        let old_width = self.bit_depth.bytes_per_sample();
        let byte_position = self.write_head * old_width;

        self.bit_depth = depth;
        self.num_samples = self.bytes.len() / depth.bytes_per_sample();
        self.bytes.fill(0);
        self.write_head = (byte_position / depth.bytes_per_sample()) % self.num_samples;
        self.fade_samples_remaining = 0;

        nih_debug_assert!(self.num_samples > 0);
        true
    }

    /// Convert a `0..=1` fraction of the buffer into a delay in samples.
    ///
    /// Non-finite ratios count as zero.
    pub fn delay_offset_from_ratio(&self, ratio: f32) -> usize {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let max_offset = self.num_samples - 1;
        ((ratio * max_offset as f32).round() as usize).min(max_offset)
    }

    /// Convert a delay in milliseconds into samples at `sample_rate`,
    /// clamped to what the buffer can hold at the current bit depth.
    ///
    /// Infinity saturates to the longest delay; NaN counts as zero.
    pub fn delay_offset_from_time_ms(&self, ms: f32, sample_rate: f32) -> usize {
        let samples = ms * sample_rate / 1000.0;
        let max_offset = self.num_samples - 1;
        if samples.is_nan() || samples <= 0.0 {
            return 0;
        }
        (samples.round() as usize).min(max_offset)
    }

    /// Silence everything and return to slot zero at the current depth.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
        self.write_head = 0;
        self.fade_samples_remaining = 0;
    }
}

impl SampleSource for DelayBuffer {
    #[inline]
    fn read(&self, index: i64) -> i16 {
        codec::decode(self.slot(self.wrap(index)), self.bit_depth)
    }

    fn write_head(&self) -> usize {
        self.write_head
    }

    fn len(&self) -> usize {
        self.num_samples
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(capacity_bytes: usize) -> DelayBuffer {
        DelayBuffer::new(NonZeroUsize::new(capacity_bytes).unwrap())
    }

    fn ramp(len: usize, scale: i16) -> Vec<i16> {
        (0..len).map(|i| i as i16 * scale).collect()
    }

    /// 50 000 bytes at 16-bit is 25 000 slots.
    #[test]
    fn test_slot_count_follows_bit_depth() {
        let mut db = buffer(50_000);
        assert_eq!(db.len(), 25_000);

        db.set_bit_depth(BitDepth::Eight);
        assert_eq!(db.len(), 50_000, "8-bit doubles the slot count");

        db.set_bit_depth(BitDepth::Twelve);
        assert_eq!(db.len(), 25_000);
    }

    /// Reading any index and the same index shifted by whole laps of the
    /// ring must return the same sample.
    #[test]
    fn test_wrap_invariant() {
        let mut db = buffer(64);
        db.write_block(&ramp(32, 100));
        let n = db.len() as i64;

        for i in -40..40_i64 {
            for k in [-3_i64, -1, 1, 2, 7] {
                assert_eq!(db.read(i), db.read(i + k * n), "index {i}, lap {k}");
            }
        }
    }

    /// Negative indices count back from the write head.
    #[test]
    fn test_negative_index_reads_most_recent() {
        let mut db = buffer(20);
        db.write_block(&[1, 2, 3]);
        let head = db.write_head() as i64;
        assert_eq!(db.read(head - 1), 3);
        assert_eq!(db.read(-7), db.read(3));
    }

    /// A written block reads back within one quantization step at every
    /// depth, and the write head advances by the block length.
    #[test]
    fn test_write_read_round_trip() {
        for depth in BitDepth::ALL {
            let mut db = buffer(1_000);
            db.set_bit_depth(depth);
            let block: Vec<i16> = (0..128).map(|i| (i * 211 - 13_000) as i16).collect();
            db.write_block(&block);

            assert_eq!(db.write_head(), 128);
            let step = codec::quantization_step(depth);
            for (i, &sample) in block.iter().enumerate() {
                let error = i32::from(sample) - i32::from(db.read(i as i64));
                assert!((0..step).contains(&error), "{depth:?} slot {i}: error {error}");
            }
        }
    }

    /// Writes past the end continue at slot zero.
    #[test]
    fn test_write_block_wraps() {
        let mut db = buffer(20); // 10 slots
        db.write_block(&ramp(8, 1));
        db.write_block(&[100, 101, 102, 103]);

        assert_eq!(db.write_head(), 2);
        assert_eq!(db.read(8), 100);
        assert_eq!(db.read(9), 101);
        assert_eq!(db.read(0), 102);
        assert_eq!(db.read(1), 103);
        assert_eq!(db.read(2), 2, "untouched slot keeps its old value");
    }

    /// After a head jump the first write is all old content and the blend
    /// moves monotonically towards the incoming signal.
    #[test]
    fn test_set_write_head_fades_in() {
        let mut db = buffer(1_000);
        db.write_block(&vec![10_000; 400]);

        db.set_write_head(100);
        assert!(db.is_fading());
        db.write_block(&vec![0; FADE_WINDOW + 10]);
        assert!(!db.is_fading());

        assert_eq!(db.read(100), 10_000, "first faded write is the old sample");
        let mut previous = i16::MAX;
        for i in 0..FADE_WINDOW {
            let value = db.read(100 + i as i64);
            assert!(value <= previous, "fade must be monotonic at {i}");
            previous = value;
        }
        assert_eq!(db.read((100 + FADE_WINDOW) as i64), 0, "fade has finished");
    }

    /// Setting the same depth twice is a no-op that keeps the content.
    #[test]
    fn test_set_same_bit_depth_is_idempotent() {
        let mut db = buffer(200);
        db.write_block(&[5, -6, 7]);

        assert!(!db.set_bit_depth(BitDepth::Sixteen));
        assert!(!db.set_bit_depth(BitDepth::Sixteen));
        assert_eq!(db.len(), 100);
        assert_eq!([db.read(0), db.read(1), db.read(2)], [5, -6, 7]);

        assert!(db.set_bit_depth(BitDepth::Eight));
        let len = db.len();
        db.write_block(&[0x1234]);
        assert!(!db.set_bit_depth(BitDepth::Eight));
        assert_eq!(db.len(), len);
        assert_eq!(db.read(db.write_head() as i64 - 1), 0x1200);
    }

    /// Switching to 8-bit after writing at 16-bit keeps the write head in
    /// the new range and decodes with the 8-bit layout.
    #[test]
    fn test_bit_depth_change_rewraps_write_head() {
        let mut db = buffer(50_000);
        db.write_block(&ramp(300, 3));
        db.set_bit_depth(BitDepth::Eight);

        assert_eq!(db.len(), 50_000);
        assert!(db.write_head() < db.len());
        assert_eq!(db.write_head(), 600, "same byte position, narrower slots");
        assert_eq!(db.read(0), 0, "content is silenced on a layout change");

        db.write_block(&[0x7F00, i16::MIN]);
        assert_eq!(db.read(600), 0x7F00);
        assert_eq!(db.read(601), i16::MIN);
        assert_eq!(db.read(601 + db.len() as i64), i16::MIN);
    }

    #[test]
    fn test_delay_offset_from_ratio() {
        let db = buffer(50_000);
        assert_eq!(db.delay_offset_from_ratio(0.0), 0);
        assert_eq!(db.delay_offset_from_ratio(1.0), 24_999);
        assert_eq!(db.delay_offset_from_ratio(0.5), 12_500);
        assert_eq!(db.delay_offset_from_ratio(-2.0), 0);
        assert_eq!(db.delay_offset_from_ratio(7.0), 24_999);
        assert_eq!(db.delay_offset_from_ratio(f32::NAN), 0);
    }

    #[test]
    fn test_delay_offset_from_time_ms() {
        let db = buffer(50_000);
        assert_eq!(db.delay_offset_from_time_ms(100.0, 48_000.0), 4_800);
        assert_eq!(db.delay_offset_from_time_ms(-5.0, 48_000.0), 0);
        assert_eq!(db.delay_offset_from_time_ms(10_000.0, 48_000.0), 24_999);
        assert_eq!(db.delay_offset_from_time_ms(f32::INFINITY, 48_000.0), 24_999);
        assert_eq!(db.delay_offset_from_time_ms(f32::MAX, 48_000.0), 24_999);
        assert_eq!(db.delay_offset_from_time_ms(f32::NEG_INFINITY, 48_000.0), 0);
        assert_eq!(db.delay_offset_from_time_ms(f32::NAN, 48_000.0), 0);
    }

    #[test]
    fn test_clear() {
        let mut db = buffer(100);
        db.write_block(&[9, 9, 9]);
        db.set_write_head(20);
        db.clear();

        assert_eq!(db.write_head(), 0);
        assert!(!db.is_fading());
        assert!((0..db.len() as i64).all(|i| db.read(i) == 0));
    }
}
