//! # Play Head
//!
//! The play head is the "read head" on the pedal's tape loop. Normally it
//! trails the write head by the delay time and moves forward one slot per
//! output sample, so the distance between the two heads never changes.
//! When a freeze or glitch is active it is instead confined to a *loop
//! region* and keeps circling that window while the write head carries on
//! recording.
//!
//! ## Crossfades
//!
//! Any time the read position jumps (the delay time changes, a loop starts,
//! stops, wraps or moves) the sample on either side of the jump is usually
//! very different, and playing them back to back clicks. Instead the head
//! keeps reading from the old position for [`FADE_WINDOW`] more samples and
//! blends the two streams:
//!
//! ```text
//! t      = i / (window - 1)              i = 0 .. window
//! output = lerp(old[i], new[i], t)       t = 0 → old only, t = 1 → new only
//! ```
//!
//! ## Loop Wrap
//!
//! ```text
//!            loop_start                loop_end
//!  ... ───────────┬─────────────────────────┬─────── ... ──► write head
//!                 │◄──── current ──────────►│
//!                 ▲                         │
//!                 └──────── wrap ───────────┘
//! ```
//!
//! The first time the head wraps it crossfades from the audio that follows
//! `loop_end` into the audio at `loop_start`. The fade itself is then part
//! of what you hear every lap, so later wraps jump straight back without
//! stacking another fade on top.
//!
//! ## Jumps During a Fade
//!
//! A second jump can land while a fade is still running (a glitch shift
//! right after a loop wrap, say). By then the listener is hearing a blend
//! of two streams, neither of which is the right place to fade out of.
//! The new fade starts from the last sample actually played and holds it:
//!
//! ```text
//! output = lerp(held, new[i], t)         held = last blended output
//! ```

use nih_plug::{nih_debug_assert, nih_debug_assert_eq};

use super::delay_buffer::{lerp_sample, SampleSource, FADE_WINDOW};

/// Slowest loop playback rate.
pub const MIN_SPEED: f32 = 0.25;

/// Fastest loop playback rate.
pub const MAX_SPEED: f32 = 2.0;

/// A `[start, start + len)` window of the ring, stored wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    start: usize,
    len: usize,
}

impl LoopRegion {
    /// First slot of the loop, in `0..ring_len`.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Loop length in slots. Never zero.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Slot just past the end of the loop, wrapped into `0..ring_len`.
    pub fn end(&self, ring_len: usize) -> usize {
        (self.start + self.len) % ring_len
    }

    /// How far `position` sits past `start`, measured forwards round the
    /// ring.
    fn offset_of(&self, position: usize, ring_len: usize) -> usize {
        (position + ring_len - self.start) % ring_len
    }

    pub fn contains(&self, position: usize, ring_len: usize) -> bool {
        self.offset_of(position, ring_len) < self.len
    }
}

/// A read position into a [`SampleSource`] with crossfading and looping.
///
/// The head does not own or borrow the storage it reads. Every operation
/// that needs it takes the source by shared reference.
pub struct PlayHead {
    /// Slot the next output sample is read from. Inside the loop region
    /// whenever one is active.
    current_position: usize,

    /// Where linear delayed playback would be reading right now: always
    /// `delay_offset` slots behind the write head.
    destination_position: usize,

    /// Live delay in slots.
    delay_offset: usize,

    /// Old read position that is being faded out.
    fade_source: usize,
    /// Fading out of a held value instead of `fade_source`.
    fade_hold: Option<i16>,
    /// Last sample handed out by `read_block`.
    last_output: i16,
    fade_samples_remaining: usize,
    fade_window_size: usize,

    loop_region: Option<LoopRegion>,

    /// Set after the first loop wrap has been crossfaded.
    initial_loop_crossfade_complete: bool,

    /// Loop playback rate and the fractional position it has built up.
    speed: f32,
    speed_accumulator: f32,
}

impl Default for PlayHead {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayHead {
    /// A head at slot zero with no delay, no loop and no fade.
    pub fn new() -> Self {
        Self {
            current_position: 0,
            destination_position: 0,
            delay_offset: 0,
            fade_source: 0,
            fade_hold: None,
            last_output: 0,
            fade_samples_remaining: 0,
            fade_window_size: FADE_WINDOW,
            loop_region: None,
            initial_loop_crossfade_complete: false,
            speed: 1.0,
            speed_accumulator: 0.0,
        }
    }

    pub fn current_position(&self) -> usize {
        self.current_position
    }

    pub fn destination_position(&self) -> usize {
        self.destination_position
    }

    pub fn delay_offset(&self) -> usize {
        self.delay_offset
    }

    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    pub fn is_looping(&self) -> bool {
        self.loop_region.is_some()
    }

    pub fn is_crossfading(&self) -> bool {
        self.fade_samples_remaining > 0
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Set the loop playback rate. Out-of-range and non-finite values snap
    /// into `[MIN_SPEED, MAX_SPEED]`; NaN means normal speed.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_nan() {
            1.0
        } else {
            speed.clamp(MIN_SPEED, MAX_SPEED)
        };
    }

    /// Arm a fade out of `from`, or out of what is audible right now if a
    /// fade is already running.
    fn arm_fade(&mut self, from: usize) {
        if self.fade_samples_remaining == 0 {
            self.fade_source = from;
            self.fade_hold = None;
        } else if self.fade_samples_remaining < self.fade_window_size {
            self.fade_hold = Some(self.last_output);
        }
        // A fade that has not played a sample yet still starts on its old
        // stream, so it is kept as is.
        self.fade_samples_remaining = FADE_WINDOW;
        self.fade_window_size = FADE_WINDOW;
    }

    /// Start reading from `to`, fading out of whatever is playing now.
    fn retarget(&mut self, to: usize, ring_len: usize) {
        let distance = to.abs_diff(self.current_position);
        let distance = distance.min(ring_len - distance);
        if distance > 1 {
            self.arm_fade(self.current_position);
        }
        self.current_position = to;
    }

    /// Trail the write head by `offset` slots.
    ///
    /// Outside a loop the head moves there immediately with a crossfade.
    /// Inside a loop only the target is recorded; the head goes there when
    /// the loop is released.
    pub fn set_play_head(&mut self, offset: usize, source: &impl SampleSource) {
        let ring_len = source.len();
        self.delay_offset = offset.min(ring_len - 1);
        self.destination_position =
            source.wrap(source.write_head() as i64 - self.delay_offset as i64);

        if self.loop_region.is_none() {
            self.retarget(self.destination_position, ring_len);
        }
    }

    /// Confine playback to `[start, end)` (absolute positions, wrapped).
    ///
    /// A window with `end <= start`, or one as long as the whole ring, is
    /// treated as the whole ring minus one slot. If the head is outside the
    /// new window it fades across to `start`. The next wrap is always
    /// crossfaded.
    pub fn enable_loop(&mut self, start: i64, end: i64, source: &impl SampleSource) {
        let ring_len = source.len();
        let max_len = (ring_len - 1).max(1);
        let requested = end - start;
        let len = if requested <= 0 || requested as usize > max_len {
            max_len
        } else {
            requested as usize
        };

        let region = LoopRegion {
            start: source.wrap(start),
            len,
        };
        self.loop_region = Some(region);
        self.initial_loop_crossfade_complete = false;
        self.speed_accumulator = 0.0;

        if !region.contains(self.current_position, ring_len) {
            self.retarget(region.start, ring_len);
        }
    }

    /// Release the loop and fade back to delayed playback.
    pub fn disable_loop(&mut self, source: &impl SampleSource) {
        if self.loop_region.take().is_none() {
            return;
        }
        let ring_len = source.len();
        self.destination_position =
            source.wrap(source.write_head() as i64 - self.delay_offset as i64);
        self.speed_accumulator = 0.0;
        self.retarget(self.destination_position, ring_len);
    }

    /// Slide the loop window by `offset` slots, carrying the head with it.
    ///
    /// The loop content is unchanged, so the first-wrap flag is left alone;
    /// the jump itself is crossfaded like any other.
    pub fn shift_loop(&mut self, offset: i64, source: &impl SampleSource) {
        let Some(region) = self.loop_region.as_mut() else {
            return;
        };
        let ring_len = source.len();
        region.start = source.wrap(region.start as i64 + offset);
        let shifted = source.wrap(self.current_position as i64 + offset);
        self.retarget(shifted, ring_len);
    }

    /// Re-derive every position after the source changed its slot count.
    ///
    /// Loops are dropped and the head lands `delay_offset` behind the write
    /// head. Old positions mean nothing under the new layout, so the only
    /// thing faded out of is the last sample played.
    pub fn reanchor(&mut self, source: &impl SampleSource) {
        let ring_len = source.len();
        self.delay_offset = self.delay_offset.min(ring_len - 1);
        self.destination_position =
            source.wrap(source.write_head() as i64 - self.delay_offset as i64);
        self.current_position = self.destination_position;
        self.loop_region = None;
        self.speed_accumulator = 0.0;

        if self.last_output == 0 {
            self.fade_samples_remaining = 0;
            self.fade_hold = None;
        } else {
            self.fade_hold = Some(self.last_output);
            self.fade_samples_remaining = FADE_WINDOW;
            self.fade_window_size = FADE_WINDOW;
        }
    }

    /// Fill `dest` with the next output samples.
    pub fn read_block(&mut self, dest: &mut [i16], source: &impl SampleSource) {
        let ring_len = source.len();
        nih_debug_assert!(self.current_position < ring_len);

        for out in dest.iter_mut() {
            let sample = source.read(self.current_position as i64);
            *out = if self.fade_samples_remaining > 0 {
                let old = match self.fade_hold {
                    Some(held) => held,
                    None => source.read(self.fade_source as i64),
                };
                let done = self.fade_window_size - self.fade_samples_remaining;
                let t = done as f32 / (self.fade_window_size - 1).max(1) as f32;
                self.fade_samples_remaining -= 1;
                lerp_sample(old, sample, t)
            } else {
                sample
            };
            self.last_output = *out;

            let step = if self.loop_region.is_some() {
                self.speed_accumulator += self.speed;
                let whole = self.speed_accumulator.floor();
                self.speed_accumulator -= whole;
                whole as usize
            } else {
                1
            };

            self.destination_position = (self.destination_position + 1) % ring_len;
            self.fade_source = (self.fade_source + step) % ring_len;
            let unwrapped = (self.current_position + step) % ring_len;
            self.current_position = unwrapped;

            if let Some(region) = self.loop_region {
                let offset = region.offset_of(unwrapped, ring_len);
                if offset >= region.len {
                    let overflow = (offset - region.len) % region.len;
                    self.current_position = (region.start + overflow) % ring_len;

                    if !self.initial_loop_crossfade_complete {
                        self.arm_fade(unwrapped);
                        self.initial_loop_crossfade_complete = true;
                    }
                }
                nih_debug_assert!(region.contains(self.current_position, ring_len));
            } else {
                nih_debug_assert_eq!(self.current_position, self.destination_position);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
