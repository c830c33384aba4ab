//! # Glitch / Freeze Controller
//!
//! This is the pedal's top-level effect state machine. It decides when the
//! play head should stop following the write head and start looping, where
//! that loop sits, and when it ends.
//!
//! ## Two Effects, One Loop
//!
//! - **Freeze** holds the most recent loop of audio indefinitely, until it
//!   is switched off.
//! - **Glitch** does the same for a fixed time, and every few callbacks
//!   slides the loop window one loop length backwards or forwards to give a
//!   rhythmic stutter.
//!
//! ```text
//!          Idle ──activate──► Armed ──next callback──► Active
//!           ▲                                            │
//!           └──────── Releasing ◄── countdown / off ─────┘
//! ```
//!
//! The loop is taken behind the live write head. Loop position moves it
//! further back, up to the oldest audio that still leaves the glitch room
//! to wander:
//!
//! ```text
//! loop_end   = write_head - LOOP_MARGIN - loop_position * max_back
//! loop_start = loop_end - loop_size
//! ```
//!
//! The write head is never stopped. Only the play head loops, so the pedal
//! keeps recording the live input and the delay carries on seamlessly when
//! the loop is released.

use super::delay_buffer::SampleSource;
use super::play_head::PlayHead;
use crate::config::{GlitchSettings, BLOCK_SIZE, LOOP_MARGIN, MIN_LOOP_SAMPLES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlitchState {
    Idle,
    /// A loop has been requested and will be taken on the next update.
    Armed,
    Active,
    /// The loop is being handed back to the play head's normal delay.
    Releasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Freeze,
    Glitch,
}

/// How to start a glitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    /// Run for this many milliseconds, then release on its own.
    Timed(f32),
    /// Latch on if off, release if on.
    Toggle,
}

/// A stretch of the ring the write head must jump over so it does not
/// record on top of the audio being looped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedRegion {
    start: usize,
    len: usize,
}

impl ProtectedRegion {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// First slot after the region, wrapped.
    pub fn end(&self, ring_len: usize) -> usize {
        (self.start + self.len) % ring_len
    }

    /// Whether writing `count` slots from `from` would touch the region.
    pub fn overlaps(&self, from: usize, count: usize, ring_len: usize) -> bool {
        let region_ahead = (self.start + ring_len - from) % ring_len;
        let write_inside = (from + ring_len - self.start) % ring_len;
        region_ahead < count || write_inside < self.len
    }
}

/// Number of callbacks that make up `ms` milliseconds. At least one.
pub fn updates_for_duration(ms: f32, sample_rate: f32) -> usize {
    let updates = ms * sample_rate / BLOCK_SIZE as f32 / 1000.0;
    if updates.is_finite() && updates >= 1.0 {
        updates as usize
    } else {
        1
    }
}

pub struct GlitchController {
    state: GlitchState,
    mode: LoopMode,

    /// `None` while latched (freeze, toggled glitch).
    updates_remaining: Option<usize>,

    /// Next window slide goes towards the write head.
    shift_forwards: bool,
    shifts_in_direction: usize,
    updates_until_shift: usize,

    /// Requested loop length as a `0..=1` fraction of the usable range.
    loop_size_ratio: f32,
    /// Loop length last taken, in slots.
    loop_size_in_samples: usize,
    /// Requested distance back from the write head as a `0..=1` fraction.
    loop_position_ratio: f32,

    protected: Option<ProtectedRegion>,

    settings: GlitchSettings,
    sample_rate: f32,
}

impl GlitchController {
    pub fn new(settings: GlitchSettings, sample_rate: f32) -> Self {
        Self {
            state: GlitchState::Idle,
            mode: LoopMode::Glitch,
            updates_remaining: None,
            shift_forwards: false,
            shifts_in_direction: 0,
            updates_until_shift: settings.shift_period_updates,
            loop_size_ratio: 0.5,
            loop_size_in_samples: MIN_LOOP_SAMPLES,
            loop_position_ratio: 0.0,
            protected: None,
            settings,
            sample_rate,
        }
    }

    pub fn state(&self) -> GlitchState {
        self.state
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn updates_remaining(&self) -> Option<usize> {
        self.updates_remaining
    }

    pub fn loop_size_in_samples(&self) -> usize {
        self.loop_size_in_samples
    }

    pub fn protected_region(&self) -> Option<ProtectedRegion> {
        self.protected
    }

    fn is_engaged(&self) -> bool {
        matches!(self.state, GlitchState::Armed | GlitchState::Active)
    }

    pub fn freeze_active(&self) -> bool {
        self.is_engaged() && self.mode == LoopMode::Freeze
    }

    pub fn glitch_active(&self) -> bool {
        self.is_engaged() && self.mode == LoopMode::Glitch
    }

    /// Largest loop that still leaves room for the glitch to wander, the
    /// margin and the write head's next blocks.
    pub fn max_loop_samples(&self, ring_len: usize) -> usize {
        let available = ring_len.saturating_sub(LOOP_MARGIN + 2 * BLOCK_SIZE);
        (available / self.settings.span_in_loops()).max(MIN_LOOP_SAMPLES)
    }

    /// Map a `0..=1` length control onto the usable loop range. Takes
    /// effect the next time a loop is taken.
    pub fn set_loop_size(&mut self, ratio: f32) {
        self.loop_size_ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    fn loop_size_for(&self, ring_len: usize) -> usize {
        let max = self.max_loop_samples(ring_len);
        let span = (max - MIN_LOOP_SAMPLES) as f32;
        MIN_LOOP_SAMPLES + (self.loop_size_ratio * span).round() as usize
    }

    /// Place the next loop `0..=1` of the way from just behind the write
    /// head to the oldest usable audio. Takes effect the next time a loop
    /// is taken.
    pub fn set_loop_position(&mut self, ratio: f32) {
        self.loop_position_ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Extra distance between the margin and `loop_end` for a loop whose
    /// protected span is `span` slots. The region plus the write head's
    /// next blocks must still fit in the ring.
    fn loop_back_for(&self, ring_len: usize, span: usize) -> usize {
        let max_back = ring_len.saturating_sub(2 * BLOCK_SIZE + LOOP_MARGIN + span);
        (self.loop_position_ratio * max_back as f32).round() as usize
    }

    /// Start (or restart) a glitch. Ignored while frozen.
    pub fn activate(&mut self, activation: Activation) {
        if self.freeze_active() {
            return;
        }
        match activation {
            Activation::Timed(ms) => {
                self.updates_remaining = Some(updates_for_duration(ms, self.sample_rate));
                self.engage(LoopMode::Glitch);
            }
            Activation::Toggle if self.glitch_active() => self.deactivate(),
            Activation::Toggle => {
                self.updates_remaining = None;
                self.engage(LoopMode::Glitch);
            }
        }
    }

    /// Latch a freeze on, or release it. Turning freeze on during a glitch
    /// keeps the current loop and stops it from moving or expiring.
    pub fn set_freeze(&mut self, on: bool) {
        if on {
            self.updates_remaining = None;
            self.engage(LoopMode::Freeze);
        } else if self.freeze_active() {
            self.deactivate();
        }
    }

    /// Release whatever loop is running.
    pub fn deactivate(&mut self) {
        self.state = match self.state {
            GlitchState::Armed => GlitchState::Idle,
            GlitchState::Active => GlitchState::Releasing,
            other => other,
        };
    }

    fn engage(&mut self, mode: LoopMode) {
        self.mode = mode;
        if !self.is_engaged() {
            self.state = GlitchState::Armed;
        }
    }

    /// Take the loop again on the next update, e.g. after the ring was
    /// re-laid out and every stored position became meaningless.
    pub fn rearm(&mut self) {
        self.protected = None;
        self.state = match self.state {
            GlitchState::Active => GlitchState::Armed,
            GlitchState::Releasing => GlitchState::Idle,
            other => other,
        };
    }

    /// Return to idle without touching the play head.
    pub fn reset(&mut self) {
        self.state = GlitchState::Idle;
        self.updates_remaining = None;
        self.protected = None;
    }

    /// Advance one callback: take, move, count down or release the loop.
    pub fn update(&mut self, play_head: &mut PlayHead, source: &impl SampleSource) {
        loop {
            match self.state {
                GlitchState::Idle => return,
                GlitchState::Armed => {
                    self.take_loop(play_head, source);
                    self.state = GlitchState::Active;
                }
                GlitchState::Active => {
                    if self.mode == LoopMode::Glitch {
                        self.advance_shift(play_head, source);
                    }
                    if let Some(remaining) = self.updates_remaining.as_mut() {
                        *remaining = remaining.saturating_sub(1);
                        if *remaining == 0 {
                            self.updates_remaining = None;
                            self.state = GlitchState::Releasing;
                            continue;
                        }
                    }
                    return;
                }
                GlitchState::Releasing => {
                    play_head.disable_loop(source);
                    self.protected = None;
                    self.state = GlitchState::Idle;
                    return;
                }
            }
        }
    }

    fn take_loop(&mut self, play_head: &mut PlayHead, source: &impl SampleSource) {
        let ring_len = source.len();
        let size = self.loop_size_for(ring_len);
        let span = size * self.settings.span_in_loops();
        let back = self.loop_back_for(ring_len, span);
        let loop_end = source.write_head() as i64 - (LOOP_MARGIN + back) as i64;
        let loop_start = loop_end - size as i64;

        play_head.enable_loop(loop_start, loop_end, source);

        self.loop_size_in_samples = size;
        self.shift_forwards = false;
        self.shifts_in_direction = 0;
        self.updates_until_shift = self.settings.shift_period_updates;

        self.protected = Some(ProtectedRegion {
            start: source.wrap(loop_end - span as i64),
            len: span + LOOP_MARGIN,
        });
    }

    fn advance_shift(&mut self, play_head: &mut PlayHead, source: &impl SampleSource) {
        self.updates_until_shift = self.updates_until_shift.saturating_sub(1);
        if self.updates_until_shift > 0 {
            return;
        }
        self.updates_until_shift = self.settings.shift_period_updates;

        let size = self.loop_size_in_samples as i64;
        let offset = if self.shift_forwards { size } else { -size };
        play_head.shift_loop(offset, source);

        self.shifts_in_direction += 1;
        if self.shifts_in_direction >= self.settings.shifts_per_direction {
            self.shifts_in_direction = 0;
            self.shift_forwards = !self.shift_forwards;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
