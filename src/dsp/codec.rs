//! # Sample Codec (Bit-Depth Reduction)
//!
//! The pedal stores audio as raw bytes, not as `i16` values. Every sample
//! that enters the delay buffer goes through [`encode`] and every sample
//! that comes out goes through [`decode`]. Between the two, the low bits of
//! the sample are thrown away, which is what gives the reduced bit depths
//! their grainy, early-sampler sound.
//!
//! ## Quantization by Shifting
//!
//! A 16-bit sample reduced to `B` bits keeps only its top `B` bits:
//!
//! ```text
//! stored  = sample >> (16 - B)        (arithmetic shift keeps the sign)
//! decoded = stored << (16 - B)        (low bits come back as zero)
//! ```
//!
//! For `B = 8` and `sample = 0x1234`, the stored value is `0x12` and the
//! decoded value is `0x1200`. Each stored value needs `ceil(B / 8)` bytes,
//! so dropping to 8 or 4 bits halves the bytes per sample and doubles the
//! number of samples the same byte arena can hold: a longer maximum delay
//! in exchange for a dirtier sound.

/// The set of supported storage resolutions.
///
/// Anything that wants a different depth goes through
/// [`BitDepth::from_bits`], which snaps to the nearest member of this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitDepth {
    #[default]
    Sixteen,
    Twelve,
    Eight,
    Four,
}

impl BitDepth {
    pub const ALL: [BitDepth; 4] = [
        BitDepth::Sixteen,
        BitDepth::Twelve,
        BitDepth::Eight,
        BitDepth::Four,
    ];

    /// Number of significant bits kept per sample.
    pub const fn bits(self) -> u32 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::Twelve => 12,
            BitDepth::Eight => 8,
            BitDepth::Four => 4,
        }
    }

    /// Bytes one encoded sample occupies in the delay buffer.
    pub const fn bytes_per_sample(self) -> usize {
        (self.bits() as usize + 7) / 8
    }

    /// Snap an arbitrary bit count to the nearest supported depth.
    ///
    /// Ties resolve towards the higher resolution, so `14` becomes
    /// [`BitDepth::Sixteen`] and `6` becomes [`BitDepth::Eight`]. Zero and
    /// anything above 16 clamp to the ends of the range.
    pub fn from_bits(bits: u32) -> Self {
        let mut best = BitDepth::Sixteen;
        let mut best_distance = u32::MAX;
        for depth in Self::ALL {
            let distance = depth.bits().abs_diff(bits);
            if distance < best_distance {
                best = depth;
                best_distance = distance;
            }
        }
        best
    }

    const fn shift(self) -> u32 {
        16 - self.bits()
    }
}

/// Quantize `sample` to `depth` and store it little-endian into `out`.
///
/// `out` must be at least `depth.bytes_per_sample()` bytes long; only that
/// many bytes are written.
#[inline]
pub fn encode(sample: i16, depth: BitDepth, out: &mut [u8]) {
    let stored = sample >> depth.shift();
    let bytes = stored.to_le_bytes();
    let len = depth.bytes_per_sample();
    out[..len].copy_from_slice(&bytes[..len]);
}

/// Rebuild a sample from its stored bytes. The discarded low bits are zero.
#[inline]
pub fn decode(bytes: &[u8], depth: BitDepth) -> i16 {
    let stored = match depth.bytes_per_sample() {
        1 => i16::from(bytes[0] as i8),
        _ => i16::from_le_bytes([bytes[0], bytes[1]]),
    };
    stored << depth.shift()
}

/// Size of one quantization step at `depth`; decoding never loses more.
pub const fn quantization_step(depth: BitDepth) -> i32 {
    1 << depth.shift()
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
