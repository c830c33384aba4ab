//! # Glitch Delay Engine
//!
//! One object owns all of the pedal's audio state and is advanced by a
//! single entry point, [`GlitchDelayEngine::process_block`], once per
//! fixed-size block. Each callback runs the same steps in the same order:
//!
//! ```text
//! 1. take staged parameters     bit depth → delay → loop / glitch / freeze
//! 2. advance the controller     take, shift, count down or release a loop
//! 3. read the play head         wet = buffer[play position ..]
//! 4. record                     buffer[write head ..] = input + wet * feedback
//! 5. mix                        output = lerp(input, wet, mix)
//! ```
//!
//! Bit depth goes first because it changes the buffer's slot count, and
//! every other position is computed against that count.
//!
//! Nothing in here allocates, locks or logs; the control side only ever
//! talks to the engine through the shared [`ParameterStaging`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use nih_plug::nih_debug_assert_eq;

use crate::config::{ConfigError, EngineConfig, BLOCK_SIZE};
use crate::dsp::delay_buffer::{lerp_sample, DelayBuffer, SampleSource};
use crate::dsp::glitch::GlitchController;
use crate::dsp::play_head::PlayHead;
use crate::staging::{DelayTarget, FreezeRequest, GlitchRequest, ParameterStaging};

pub struct GlitchDelayEngine {
    buffer: DelayBuffer,
    play_head: PlayHead,
    glitch: GlitchController,
    staging: Arc<ParameterStaging>,
    config: EngineConfig,

    feedback: f32,
    mix: f32,

    /// Scratch for the play head's output and the signal being recorded.
    wet: [i16; BLOCK_SIZE],
    record: [i16; BLOCK_SIZE],
}

impl GlitchDelayEngine {
    /// Allocate the delay buffer and start in the power-on state.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let capacity = NonZeroUsize::new(config.buffer_size_bytes).ok_or(
            ConfigError::BufferTooSmall {
                bytes: 0,
                required: config.min_buffer_size_bytes(),
            },
        )?;

        let mut engine = Self {
            buffer: DelayBuffer::new(capacity),
            play_head: PlayHead::new(),
            glitch: GlitchController::new(config.glitch, config.sample_rate),
            staging: Arc::new(ParameterStaging::new()),
            config,
            feedback: 0.0,
            mix: 0.5,
            wet: [0; BLOCK_SIZE],
            record: [0; BLOCK_SIZE],
        };
        engine.anchor_play_head();
        Ok(engine)
    }

    fn anchor_play_head(&mut self) {
        self.play_head.set_play_head(BLOCK_SIZE, &self.buffer);
        self.play_head.reanchor(&self.buffer);
    }

    /// Handle for the control side. Setters on it take effect at the start
    /// of the next callback.
    pub fn staging(&self) -> &Arc<ParameterStaging> {
        &self.staging
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn buffer(&self) -> &DelayBuffer {
        &self.buffer
    }

    pub fn play_head(&self) -> &PlayHead {
        &self.play_head
    }

    pub fn glitch(&self) -> &GlitchController {
        &self.glitch
    }

    /// Drives the freeze indicator.
    pub fn freeze_active(&self) -> bool {
        self.glitch.freeze_active()
    }

    /// Drives the glitch indicator.
    pub fn glitch_active(&self) -> bool {
        self.glitch.glitch_active()
    }

    /// Back to silence, no loop and the play head one block behind slot
    /// zero. Staged control values are kept and re-applied next callback.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.glitch.reset();
        self.play_head = PlayHead::new();
        self.anchor_play_head();
    }

    /// Run one callback per `BLOCK_SIZE` samples of `input`, writing the
    /// same number of samples to `output`.
    pub fn process_block(&mut self, input: &[i16], output: &mut [i16]) {
        nih_debug_assert_eq!(input.len(), output.len());
        for (input, output) in input.chunks(BLOCK_SIZE).zip(output.chunks_mut(BLOCK_SIZE)) {
            self.apply_staged();
            self.glitch.update(&mut self.play_head, &self.buffer);
            self.run(input, output);
        }
    }

    fn apply_staged(&mut self) {
        let params = self.staging.take();

        if self.buffer.set_bit_depth(params.bit_depth) {
            self.play_head.reanchor(&self.buffer);
            self.glitch.rearm();
        }

        let offset = match params.delay {
            DelayTarget::Ratio(ratio) => self.buffer.delay_offset_from_ratio(ratio),
            DelayTarget::Millis(ms) => self
                .buffer
                .delay_offset_from_time_ms(ms, self.config.sample_rate),
        };
        // The play head reads before the block is recorded, so anything
        // shorter than a block would read audio from a lap ago.
        let offset = offset.clamp(BLOCK_SIZE, self.buffer.len() - 1);
        if offset != self.play_head.delay_offset() {
            self.play_head.set_play_head(offset, &self.buffer);
        }

        self.glitch.set_loop_size(params.loop_size);
        self.glitch.set_loop_position(params.loop_position);
        self.play_head.set_speed(params.speed);

        match params.freeze {
            Some(FreezeRequest::On) => self.glitch.set_freeze(true),
            Some(FreezeRequest::Off) => self.glitch.set_freeze(false),
            Some(FreezeRequest::Toggle) => {
                let frozen = self.glitch.freeze_active();
                self.glitch.set_freeze(!frozen);
            }
            None => {}
        }

        match params.glitch {
            Some(GlitchRequest::Activate(activation)) => self.glitch.activate(activation),
            Some(GlitchRequest::Release) if self.glitch.glitch_active() => {
                self.glitch.deactivate()
            }
            _ => {}
        }

        self.feedback = params.feedback;
        self.mix = params.mix;
    }

    fn run(&mut self, input: &[i16], output: &mut [i16]) {
        let len = input.len().min(output.len());

        // ═══════════════════════════════════════════════════════
        // ONE CALLBACK: 4 steps per block
        // ═══════════════════════════════════════════════════════

        // Step 1: READ the whole block from the play head.
        //
        // The play head already knows whether it is trailing the write
        // head by the delay time or circling inside a loop, and it
        // crossfades any jump on its own. Reading happens before this
        // block is recorded, which is why the delay is never shorter than
        // one block.
        let wet = &mut self.wet[..len];
        self.play_head.read_block(wet, &self.buffer);

        // Step 2: FEED BACK part of the echo into what gets recorded.
        //
        //   record = input + wet * feedback
        //
        // Summing two loud samples can leave the i16 range, so the sum is
        // saturated rather than wrapped.
        for ((record, &dry), &wet) in self.record[..len].iter_mut().zip(input).zip(wet.iter()) {
            let fed_back = f32::from(dry) + f32::from(wet) * self.feedback;
            *record = fed_back.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        }

        // Step 3: WRITE the block, jumping over the protected region.
        //
        // While a loop is held, the stretch of the ring it plays from
        // (plus everywhere a glitch may slide it) must not be recorded
        // over. If this block would land in it, the write head skips to
        // the first slot past its end.
        if let Some(region) = self.glitch.protected_region() {
            let ring_len = self.buffer.len();
            if region.overlaps(self.buffer.write_head(), len, ring_len) {
                self.buffer.set_write_head(region.end(ring_len) as i64);
            }
        }
        self.buffer.write_block(&self.record[..len]);

        // Step 4: MIX dry (input) and wet (play head) signals.
        //
        //   mix = 0.0 → output = input
        //   mix = 1.0 → output = play head only
        for ((out, &dry), &wet) in output[..len].iter_mut().zip(input).zip(self.wet[..len].iter()) {
            *out = lerp_sample(dry, wet, self.mix);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
