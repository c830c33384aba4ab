//! # Engine Configuration
//!
//! Everything here is decided once, before the first audio callback. The
//! real-time path never validates anything; it relies on the guarantees
//! [`EngineConfig::validate`] establishes up front.

use thiserror::Error;

use crate::dsp::codec::BitDepth;
use crate::dsp::delay_buffer::FADE_WINDOW;

/// Samples per engine callback. Effect durations are counted in callbacks,
/// so this is fixed at build time.
pub const BLOCK_SIZE: usize = 128;

/// Gap left between the end of a loop and the write head when the loop is
/// taken. The first-wrap crossfade reads past `loop_end`, at up to twice
/// normal speed, and everything it reads must already be recorded.
pub const LOOP_MARGIN: usize = 2 * FADE_WINDOW;

/// Shortest loop the controller will take, long enough for a full fade.
pub const MIN_LOOP_SAMPLES: usize = 2 * FADE_WINDOW;

/// Byte size of the delay arena on the pedal hardware (50 KiB).
pub const DEFAULT_BUFFER_SIZE_BYTES: usize = 1024 * 50;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid sample rate {0}: must be finite and positive")]
    InvalidSampleRate(f32),

    #[error(
        "delay buffer of {bytes} bytes is too small: at least {required} bytes are needed \
         to hold a glitch loop and one block"
    )]
    BufferTooSmall { bytes: usize, required: usize },

    #[error("{0} must be at least 1")]
    ZeroGlitchSetting(&'static str),
}

/// How a timed glitch moves its loop window around.
///
/// Every `shift_period_updates` callbacks the window slides by its own
/// length. It starts by moving backwards, and turns round after
/// `shifts_per_direction` moves, so it never wanders more than that many
/// loop lengths behind where it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlitchSettings {
    pub shift_period_updates: usize,
    pub shifts_per_direction: usize,
}

impl Default for GlitchSettings {
    fn default() -> Self {
        Self {
            shift_period_updates: 8,
            shifts_per_direction: 1,
        }
    }
}

impl GlitchSettings {
    /// How many loop lengths the glitch window can cover end to end.
    pub fn span_in_loops(&self) -> usize {
        1 + self.shifts_per_direction
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub buffer_size_bytes: usize,
    pub sample_rate: f32,
    pub glitch: GlitchSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size_bytes: DEFAULT_BUFFER_SIZE_BYTES,
            sample_rate: 48_000.0,
            glitch: GlitchSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Smallest arena that still fits the widest possible glitch window,
    /// the loop margin and two blocks at the widest slot size.
    pub fn min_buffer_size_bytes(&self) -> usize {
        let slots = MIN_LOOP_SAMPLES * self.glitch.span_in_loops() + LOOP_MARGIN + 2 * BLOCK_SIZE;
        slots * BitDepth::Sixteen.bytes_per_sample()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.glitch.shift_period_updates == 0 {
            return Err(ConfigError::ZeroGlitchSetting("shift_period_updates"));
        }
        if self.glitch.shifts_per_direction == 0 {
            return Err(ConfigError::ZeroGlitchSetting("shifts_per_direction"));
        }

        let required = self.min_buffer_size_bytes();
        if self.buffer_size_bytes < required {
            return Err(ConfigError::BufferTooSmall {
                bytes: self.buffer_size_bytes,
                required,
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
        assert_eq!(EngineConfig::default().buffer_size_bytes, 51_200);
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        for rate in [0.0, -44_100.0, f32::NAN, f32::INFINITY] {
            let config = EngineConfig::with_sample_rate(rate);
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidSampleRate(_))),
                "sample rate {rate} should be rejected"
            );
        }
    }

    /// The minimum grows with how far a glitch may wander.
    #[test]
    fn test_rejects_tiny_buffer() {
        let mut config = EngineConfig {
            buffer_size_bytes: 1_000,
            ..EngineConfig::default()
        };
        let required = config.min_buffer_size_bytes();
        assert_eq!(
            config.validate(),
            Err(ConfigError::BufferTooSmall {
                bytes: 1_000,
                required
            })
        );

        config.buffer_size_bytes = required;
        assert_eq!(config.validate(), Ok(()));

        config.glitch.shifts_per_direction = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_glitch_settings() {
        let mut config = EngineConfig::default();
        config.glitch.shift_period_updates = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroGlitchSetting("shift_period_updates"))
        );

        let mut config = EngineConfig::default();
        config.glitch.shifts_per_direction = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::InvalidSampleRate(0.0);
        assert_eq!(
            err.to_string(),
            "invalid sample rate 0: must be finite and positive"
        );
    }
}
