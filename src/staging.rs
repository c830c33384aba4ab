//! # Parameter Staging
//!
//! The control side of the pedal (knobs, buttons, the host's automation
//! thread) runs at a lower priority than the audio callback and can be
//! interrupted by it at any moment. If it wrote straight into the delay
//! buffer or play head, the callback could see half of an update: a new
//! delay time measured against an old slot count, say.
//!
//! Instead every setter writes a "next" value into its own atomic, and the
//! callback picks all of them up in one go at the start of its next run
//! with [`ParameterStaging::take`]. Each field has exactly one writer (the
//! control side) and one reader (the callback), so plain atomic loads and
//! stores are enough; nothing ever waits on a lock.
//!
//! Two kinds of fields exist:
//!
//! - **Tracked** values (delay, bit depth, loop size and position, speed,
//!   feedback, mix) describe where a control currently sits. They are read, and left in
//!   place, on every callback.
//! - **One-shot** requests (glitch, freeze) describe a button press. The
//!   callback swaps them back to "nothing pending" as it reads them, so each
//!   press is acted on exactly once.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use atomic_float::AtomicF32;

use crate::dsp::codec::BitDepth;
use crate::dsp::glitch::Activation;

/// Highest feedback the pedal allows. At 1.0 the repeats would never decay.
pub const MAX_FEEDBACK: f32 = 0.95;

/// Longest timed glitch, in milliseconds.
pub const MAX_GLITCH_MS: u32 = 10_000;

const DELAY_KIND_RATIO: u64 = 0;
const DELAY_KIND_MS: u64 = 1;

const GLITCH_NONE: u32 = 0;
const GLITCH_TOGGLE: u32 = u32::MAX;
const GLITCH_RELEASE: u32 = u32::MAX - 1;

const FREEZE_NONE: u8 = 0;
const FREEZE_ON: u8 = 1;
const FREEZE_OFF: u8 = 2;
const FREEZE_TOGGLE: u8 = 3;

/// How the delay time was last expressed by the control side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayTarget {
    /// Fraction `0..=1` of the longest delay the buffer can hold.
    Ratio(f32),
    Millis(f32),
}

impl DelayTarget {
    fn pack(self) -> u64 {
        let (kind, value) = match self {
            DelayTarget::Ratio(ratio) => (DELAY_KIND_RATIO, ratio),
            DelayTarget::Millis(ms) => (DELAY_KIND_MS, ms),
        };
        (kind << 32) | u64::from(value.to_bits())
    }

    fn unpack(packed: u64) -> Self {
        let value = f32::from_bits(packed as u32);
        match packed >> 32 {
            DELAY_KIND_MS => DelayTarget::Millis(value),
            _ => DelayTarget::Ratio(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlitchRequest {
    Activate(Activation),
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeRequest {
    On,
    Off,
    Toggle,
}

/// Everything the callback needs from the control side, copied out in one
/// place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagedParams {
    pub bit_depth: BitDepth,
    pub delay: DelayTarget,
    pub loop_size: f32,
    pub loop_position: f32,
    pub speed: f32,
    pub feedback: f32,
    pub mix: f32,
    pub glitch: Option<GlitchRequest>,
    pub freeze: Option<FreezeRequest>,
}

/// Single-writer, single-reader "next value" slots, shared between the
/// control side and the audio callback as `Arc<ParameterStaging>`.
#[derive(Debug)]
pub struct ParameterStaging {
    next_bit_depth: AtomicU8,
    next_delay: AtomicU64,
    next_loop_size: AtomicF32,
    next_loop_position: AtomicF32,
    next_speed: AtomicF32,
    next_feedback: AtomicF32,
    next_mix: AtomicF32,
    pending_glitch: AtomicU32,
    pending_freeze: AtomicU8,
}

impl Default for ParameterStaging {
    /// Power-on state: no delay, full resolution, no loop.
    fn default() -> Self {
        Self {
            next_bit_depth: AtomicU8::new(BitDepth::Sixteen.bits() as u8),
            next_delay: AtomicU64::new(DelayTarget::Ratio(0.0).pack()),
            next_loop_size: AtomicF32::new(0.5),
            next_loop_position: AtomicF32::new(0.0),
            next_speed: AtomicF32::new(1.0),
            next_feedback: AtomicF32::new(0.0),
            next_mix: AtomicF32::new(0.5),
            pending_glitch: AtomicU32::new(GLITCH_NONE),
            pending_freeze: AtomicU8::new(FREEZE_NONE),
        }
    }
}

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl ParameterStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay as a fraction of the longest delay the buffer can hold.
    pub fn set_delay_time_ratio(&self, ratio: f32) {
        self.next_delay.store(DelayTarget::Ratio(unit(ratio)).pack(), Ordering::Release);
    }

    /// Delay in milliseconds. Anything longer than the buffer holds is
    /// clamped by the callback, so infinity means "as long as possible".
    pub fn set_delay_time_ms(&self, ms: f32) {
        let ms = if ms.is_nan() { 0.0 } else { ms.max(0.0) };
        self.next_delay.store(DelayTarget::Millis(ms).pack(), Ordering::Release);
    }

    pub fn set_bit_depth(&self, depth: BitDepth) {
        self.next_bit_depth.store(depth.bits() as u8, Ordering::Release);
    }

    /// Request an arbitrary bit count; it is snapped to a supported depth
    /// here, before the callback ever sees it.
    pub fn set_bit_depth_bits(&self, bits: u32) {
        self.set_bit_depth(BitDepth::from_bits(bits));
    }

    pub fn set_loop_size(&self, ratio: f32) {
        self.next_loop_size.store(unit(ratio), Ordering::Release);
    }

    /// How far back from the live input a loop is taken: 0 is right
    /// behind the write head, 1 is as far back as the buffer allows.
    pub fn set_loop_position(&self, ratio: f32) {
        self.next_loop_position.store(unit(ratio), Ordering::Release);
    }

    pub fn set_speed(&self, speed: f32) {
        let speed = if speed.is_finite() { speed } else { 1.0 };
        self.next_speed.store(speed, Ordering::Release);
    }

    pub fn set_feedback(&self, feedback: f32) {
        self.next_feedback.store(unit(feedback).min(MAX_FEEDBACK), Ordering::Release);
    }

    pub fn set_mix(&self, mix: f32) {
        self.next_mix.store(unit(mix), Ordering::Release);
    }

    /// Start a glitch that releases itself after `ms` milliseconds.
    pub fn activate_glitch(&self, ms: u32) {
        let ms = ms.clamp(1, MAX_GLITCH_MS);
        self.pending_glitch.store(ms, Ordering::Release);
    }

    pub fn toggle_glitch(&self) {
        self.pending_glitch.store(GLITCH_TOGGLE, Ordering::Release);
    }

    pub fn release_glitch(&self) {
        self.pending_glitch.store(GLITCH_RELEASE, Ordering::Release);
    }

    pub fn set_freeze(&self, on: bool) {
        let request = if on { FREEZE_ON } else { FREEZE_OFF };
        self.pending_freeze.store(request, Ordering::Release);
    }

    pub fn toggle_freeze(&self) {
        self.pending_freeze.store(FREEZE_TOGGLE, Ordering::Release);
    }

    /// Copy out every staged value, clearing the one-shot requests.
    ///
    /// Called once per callback, before any buffer or play head work.
    pub fn take(&self) -> StagedParams {
        let bits = u32::from(self.next_bit_depth.load(Ordering::Acquire));

        let glitch = match self.pending_glitch.swap(GLITCH_NONE, Ordering::AcqRel) {
            GLITCH_NONE => None,
            GLITCH_TOGGLE => Some(GlitchRequest::Activate(Activation::Toggle)),
            GLITCH_RELEASE => Some(GlitchRequest::Release),
            ms => Some(GlitchRequest::Activate(Activation::Timed(ms as f32))),
        };

        let freeze = match self.pending_freeze.swap(FREEZE_NONE, Ordering::AcqRel) {
            FREEZE_ON => Some(FreezeRequest::On),
            FREEZE_OFF => Some(FreezeRequest::Off),
            FREEZE_TOGGLE => Some(FreezeRequest::Toggle),
            _ => None,
        };

        StagedParams {
            bit_depth: BitDepth::from_bits(bits),
            delay: DelayTarget::unpack(self.next_delay.load(Ordering::Acquire)),
            loop_size: self.next_loop_size.load(Ordering::Acquire),
            loop_position: self.next_loop_position.load(Ordering::Acquire),
            speed: self.next_speed.load(Ordering::Acquire),
            feedback: self.next_feedback.load(Ordering::Acquire),
            mix: self.next_mix.load(Ordering::Acquire),
            glitch,
            freeze,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_power_on_defaults() {
        let staging = ParameterStaging::new();
        let params = staging.take();
        assert_eq!(params.bit_depth, BitDepth::Sixteen);
        assert_eq!(params.delay, DelayTarget::Ratio(0.0));
        assert_eq!(params.loop_position, 0.0);
        assert_eq!(params.speed, 1.0);
        assert_eq!(params.glitch, None);
        assert_eq!(params.freeze, None);
    }

    /// Tracked values stay put across callbacks.
    #[test]
    fn test_tracked_values_are_retained() {
        let staging = ParameterStaging::new();
        staging.set_delay_time_ms(250.0);
        staging.set_mix(0.75);

        for _ in 0..3 {
            let params = staging.take();
            assert_eq!(params.delay, DelayTarget::Millis(250.0));
            assert_eq!(params.mix, 0.75);
        }
    }

    /// Button presses are delivered exactly once.
    #[test]
    fn test_one_shot_requests_are_consumed() {
        let staging = ParameterStaging::new();
        staging.activate_glitch(500);
        staging.set_freeze(true);

        let first = staging.take();
        assert_eq!(
            first.glitch,
            Some(GlitchRequest::Activate(Activation::Timed(500.0)))
        );
        assert_eq!(first.freeze, Some(FreezeRequest::On));

        let second = staging.take();
        assert_eq!(second.glitch, None);
        assert_eq!(second.freeze, None);
    }

    /// The last request before a callback wins.
    #[test]
    fn test_latest_request_wins() {
        let staging = ParameterStaging::new();
        staging.toggle_glitch();
        staging.release_glitch();
        staging.set_freeze(true);
        staging.toggle_freeze();

        let params = staging.take();
        assert_eq!(params.glitch, Some(GlitchRequest::Release));
        assert_eq!(params.freeze, Some(FreezeRequest::Toggle));
    }

    /// Out-of-range input is clamped at the staging boundary.
    #[test]
    fn test_values_are_clamped() {
        let staging = ParameterStaging::new();
        staging.set_bit_depth_bits(7);
        staging.set_delay_time_ratio(3.0);
        staging.set_feedback(2.0);
        staging.set_mix(f32::NAN);
        staging.set_loop_size(-1.0);
        staging.set_loop_position(1.5);
        staging.set_speed(f32::INFINITY);
        staging.activate_glitch(0);

        let params = staging.take();
        assert_eq!(params.bit_depth, BitDepth::Eight);
        assert_eq!(params.delay, DelayTarget::Ratio(1.0));
        assert_eq!(params.feedback, MAX_FEEDBACK);
        assert_eq!(params.mix, 0.0);
        assert_eq!(params.loop_size, 0.0);
        assert_eq!(params.loop_position, 1.0);
        assert_eq!(params.speed, 1.0);
        assert_eq!(
            params.glitch,
            Some(GlitchRequest::Activate(Activation::Timed(1.0)))
        );

        staging.set_delay_time_ms(-20.0);
        assert_eq!(staging.take().delay, DelayTarget::Millis(0.0));
        staging.set_delay_time_ms(f32::NAN);
        assert_eq!(staging.take().delay, DelayTarget::Millis(0.0));
        staging.set_loop_position(f32::NAN);
        assert_eq!(staging.take().loop_position, 0.0);
    }

    /// An endless delay time is passed on as is and clamped to the longest
    /// delay by the callback.
    #[test]
    fn test_infinite_delay_time_is_kept() {
        let staging = ParameterStaging::new();
        staging.set_delay_time_ms(f32::INFINITY);
        assert_eq!(staging.take().delay, DelayTarget::Millis(f32::INFINITY));
    }

    /// Kind and value of the delay target travel in one word, so a reader
    /// can never pair a ratio with a millisecond value.
    #[test]
    fn test_delay_target_packing() {
        for target in [
            DelayTarget::Ratio(0.0),
            DelayTarget::Ratio(0.123),
            DelayTarget::Millis(1_999.5),
        ] {
            assert_eq!(DelayTarget::unpack(target.pack()), target);
        }
    }

    /// A control thread hammering the setters never produces a value the
    /// callback could not have been sent.
    #[test]
    fn test_concurrent_writer() {
        let staging = Arc::new(ParameterStaging::new());
        let writer = {
            let staging = Arc::clone(&staging);
            thread::spawn(move || {
                for i in 0..10_000 {
                    if i % 2 == 0 {
                        staging.set_delay_time_ratio(0.25);
                    } else {
                        staging.set_delay_time_ms(750.0);
                    }
                    staging.set_bit_depth(BitDepth::ALL[i % 4]);
                }
            })
        };

        for _ in 0..10_000 {
            let params = staging.take();
            assert!(matches!(
                params.delay,
                DelayTarget::Ratio(r) if r == 0.0 || r == 0.25
            ) || params.delay == DelayTarget::Millis(750.0));
        }
        writer.join().unwrap();
    }
}
