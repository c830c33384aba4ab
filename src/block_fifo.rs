//! # Fixed-Block Transport
//!
//! The engine counts time in callbacks of exactly [`BLOCK_SIZE`] samples,
//! but a host hands the plugin whatever buffer length it likes (and may
//! change it from one call to the next). This FIFO sits in between:
//!
//! ```text
//! host sample ──► input[pos]                     output[pos] ──► host sample
//!                    │                                ▲
//!                    └── full? ──► engine callback ───┘
//! ```
//!
//! Every host sample goes into `input` and the sample produced one full
//! block earlier comes out of `output`. The plugin therefore always
//! reports exactly one block of latency, regardless of the host's buffer
//! size.

use crate::config::BLOCK_SIZE;
use crate::engine::GlitchDelayEngine;

/// Host float (`-1.0..=1.0`) to the engine's 16-bit integer range.
pub fn f32_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

pub struct BlockFifo {
    input: [i16; BLOCK_SIZE],
    output: [i16; BLOCK_SIZE],
    position: usize,
}

impl Default for BlockFifo {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockFifo {
    pub fn new() -> Self {
        Self {
            input: [0; BLOCK_SIZE],
            output: [0; BLOCK_SIZE],
            position: 0,
        }
    }

    /// Queue one host sample and return the one that is due now.
    pub fn push(&mut self, sample: f32) -> f32 {
        let out = i16_to_f32(self.output[self.position]);
        self.input[self.position] = f32_to_i16(sample);
        self.position += 1;
        out
    }

    /// A whole block has been queued and the engine must run before the
    /// next [`push`](Self::push).
    pub fn is_full(&self) -> bool {
        self.position == BLOCK_SIZE
    }

    /// Hand the queued block to the engine and start collecting the next.
    pub fn run(&mut self, engine: &mut GlitchDelayEngine) {
        engine.process_block(&self.input, &mut self.output);
        self.position = 0;
    }

    pub fn clear(&mut self) {
        self.input.fill(0);
        self.output.fill(0);
        self.position = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
