//! # Plugin Parameters
//!
//! Parameters are the knobs, switches and buttons the user sees in the
//! DAW. Each parameter has:
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to
//!   save and recall presets. Once published, never change these IDs
//!   or existing presets will break.
//! - A **human-readable name** shown in the DAW's UI.
//! - A **range** and a **default value**.
//!
//! ## No Smoothing
//!
//! None of these parameters are smoothed. The engine picks up control
//! values once per block, and every audible jump they can cause (a new
//! delay time, a loop starting or ending) is already crossfaded inside the
//! play head.
//!
//! ## Buttons
//!
//! The pedal's two footswitches become `BoolParam`s. **Freeze** is a
//! latch: its value is the freeze state. **Glitch** is a momentary
//! trigger: only the moment it turns on matters, and the glitch then runs
//! for **Glitch Time** on its own. [`ControlEdges`] turns the raw values
//! into those events.

use nih_plug::prelude::*;

use crate::dsp::codec::BitDepth;
use crate::staging::{ParameterStaging, MAX_FEEDBACK, MAX_GLITCH_MS};

/// Storage resolution as shown in the host.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepthParam {
    #[id = "16"]
    #[name = "16-bit"]
    Sixteen,
    #[id = "12"]
    #[name = "12-bit"]
    Twelve,
    #[id = "8"]
    #[name = "8-bit"]
    Eight,
    #[id = "4"]
    #[name = "4-bit"]
    Four,
}

impl From<BitDepthParam> for BitDepth {
    fn from(param: BitDepthParam) -> Self {
        match param {
            BitDepthParam::Sixteen => BitDepth::Sixteen,
            BitDepthParam::Twelve => BitDepth::Twelve,
            BitDepthParam::Eight => BitDepth::Eight,
            BitDepthParam::Four => BitDepth::Four,
        }
    }
}

/// All user-facing parameters for the Glitch Delay plugin.
#[derive(Params)]
pub struct GlitchDelayParams {
    /// **Delay Time**: distance between the input and its echo.
    ///
    /// The buffer is a fixed number of bytes, so the longest delay it can
    /// actually hold depends on the sample rate and the bit depth (about
    /// half a second at 16-bit and 48 kHz, four times that at 4-bit).
    /// Longer settings are clamped to what fits.
    #[id = "delay"]
    pub delay_time: FloatParam,

    /// **Feedback**: how much of the echo is recorded again.
    ///
    /// Capped at 95% so the repeats always die away.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    /// **Mix**: dry/wet balance. At 100% only the delay is heard.
    #[id = "mix"]
    pub mix: FloatParam,

    /// **Loop Size**: length of a frozen or glitched loop, from the
    /// shortest crossfadeable loop (0%) to the longest the buffer allows
    /// (100%). Applies the next time a loop is taken.
    #[id = "loop"]
    pub loop_size: FloatParam,

    /// **Loop Position**: where the loop is taken from. At 0% it holds the
    /// most recent audio; turning it up reaches further into the past.
    #[id = "lpos"]
    pub loop_position: FloatParam,

    /// **Speed**: playback rate inside a loop. Below 1x the loop plays
    /// slower and stretches; above 1x it races through.
    #[id = "speed"]
    pub speed: FloatParam,

    /// **Bit Depth**: resolution of the recorded audio. Switching clears
    /// the buffer.
    #[id = "bits"]
    pub bit_depth: EnumParam<BitDepthParam>,

    #[id = "frz"]
    pub freeze: BoolParam,

    /// **Glitch**: fires a glitch when switched on.
    #[id = "glitch"]
    pub glitch_trigger: BoolParam,

    /// **Glitch Time**: how long a triggered glitch runs.
    #[id = "gtime"]
    pub glitch_time: IntParam,
}

impl Default for GlitchDelayParams {
    fn default() -> Self {
        Self {
            delay_time: FloatParam::new(
                "Delay Time",
                250.0,
                FloatRange::Skewed {
                    min: 3.0,
                    max: 2000.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            .with_step_size(0.1),

            feedback: FloatParam::new(
                "Feedback",
                0.40,
                FloatRange::Linear {
                    min: 0.0,
                    max: MAX_FEEDBACK,
                },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            mix: FloatParam::new("Mix", 0.50, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            loop_size: FloatParam::new("Loop Size", 0.50, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            loop_position: FloatParam::new(
                "Loop Position",
                0.0,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            speed: FloatParam::new(
                "Speed",
                1.0,
                FloatRange::Skewed {
                    min: crate::dsp::play_head::MIN_SPEED,
                    max: crate::dsp::play_head::MAX_SPEED,
                    // Puts 1x in the middle of the knob.
                    factor: FloatRange::skew_factor(-0.5),
                },
            )
            .with_unit("x")
            .with_step_size(0.01),

            bit_depth: EnumParam::new("Bit Depth", BitDepthParam::Sixteen),

            freeze: BoolParam::new("Freeze", false),

            glitch_trigger: BoolParam::new("Glitch", false),

            glitch_time: IntParam::new(
                "Glitch Time",
                500,
                IntRange::Linear {
                    min: 10,
                    max: MAX_GLITCH_MS as i32,
                },
            )
            .with_unit(" ms"),
        }
    }
}

impl GlitchDelayParams {
    /// Send the current parameter values to the engine. Called once per
    /// engine block, from the audio thread.
    pub fn forward_to(&self, staging: &ParameterStaging, edges: &mut ControlEdges) {
        staging.set_bit_depth(self.bit_depth.value().into());
        staging.set_delay_time_ms(self.delay_time.value());
        staging.set_loop_size(self.loop_size.value());
        staging.set_loop_position(self.loop_position.value());
        staging.set_speed(self.speed.value());
        staging.set_feedback(self.feedback.value());
        staging.set_mix(self.mix.value());

        if let Some(on) = edges.freeze_changed(self.freeze.value()) {
            staging.set_freeze(on);
        }
        if edges.glitch_pressed(self.glitch_trigger.value()) {
            staging.activate_glitch(self.glitch_time.value().max(1) as u32);
        }
    }
}

/// Last seen state of the two switches.
#[derive(Debug, Default)]
pub struct ControlEdges {
    /// `None` until the first block, so the initial freeze state is
    /// always sent.
    freeze: Option<bool>,
    glitch_held: bool,
}

impl ControlEdges {
    /// The new freeze state, if it differs from the last one seen.
    pub fn freeze_changed(&mut self, on: bool) -> Option<bool> {
        if self.freeze == Some(on) {
            return None;
        }
        self.freeze = Some(on);
        Some(on)
    }

    /// True only on the block where the trigger goes from off to on.
    pub fn glitch_pressed(&mut self, held: bool) -> bool {
        let pressed = held && !self.glitch_held;
        self.glitch_held = held;
        pressed
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Freeze is forwarded once per change, starting with the first block.
    #[test]
    fn test_freeze_edges() {
        let mut edges = ControlEdges::default();
        assert_eq!(edges.freeze_changed(false), Some(false));
        assert_eq!(edges.freeze_changed(false), None);
        assert_eq!(edges.freeze_changed(true), Some(true));
        assert_eq!(edges.freeze_changed(true), None);
        assert_eq!(edges.freeze_changed(false), Some(false));
    }

    /// Holding the glitch button fires once; it must be released to fire
    /// again.
    #[test]
    fn test_glitch_rising_edge() {
        let mut edges = ControlEdges::default();
        assert!(!edges.glitch_pressed(false));
        assert!(edges.glitch_pressed(true));
        assert!(!edges.glitch_pressed(true));
        assert!(!edges.glitch_pressed(false));
        assert!(edges.glitch_pressed(true));
    }

    #[test]
    fn test_bit_depth_mapping() {
        assert_eq!(BitDepth::from(BitDepthParam::Sixteen).bits(), 16);
        assert_eq!(BitDepth::from(BitDepthParam::Twelve).bits(), 12);
        assert_eq!(BitDepth::from(BitDepthParam::Eight).bits(), 8);
        assert_eq!(BitDepth::from(BitDepthParam::Four).bits(), 4);
    }

    /// Default parameter values reach the staging area as-is.
    #[test]
    fn test_forward_defaults() {
        let params = GlitchDelayParams::default();
        let staging = ParameterStaging::new();
        let mut edges = ControlEdges::default();
        params.forward_to(&staging, &mut edges);

        let staged = staging.take();
        assert_eq!(staged.bit_depth, BitDepth::Sixteen);
        assert!((staged.feedback - 0.40).abs() < 1e-6);
        assert!((staged.mix - 0.50).abs() < 1e-6);
        assert!((staged.speed - 1.0).abs() < 1e-6);
        assert_eq!(staged.loop_position, 0.0, "loops start behind the write head");
        assert!(staged.glitch.is_none(), "trigger is not pressed");
        assert_eq!(staged.freeze, Some(crate::staging::FreezeRequest::Off));
    }
}
