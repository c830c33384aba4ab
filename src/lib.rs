//! # Glitch Delay: An AU/VST3/CLAP Freeze & Glitch Delay Plugin
//!
//! The DSP core of a lo-fi delay pedal, built with
//! [nih-plug](https://github.com/robbert-vdh/nih-plug) and exported as Audio
//! Unit (AUv2), VST3 and CLAP from a single codebase. Audio is stored as
//! raw bytes at a selectable bit depth, and two footswitches can freeze the
//! most recent audio into a loop or make it stutter for a moment.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬──────────────────────────────────────────── × (1 - mix) ───┐
//!         │                                                            │
//!         │    ┌───────────────────────────────────────────────────┐   │
//!         │    │                 FEEDBACK LOOP                     │   │
//!         │    │                                                   │   │
//!         └──►(+)──► encode ──► [Byte Ring / Delay Buffer]         │   │
//!              ▲      (bit depth)     │                            │   │
//!              │                      ▼                            │   │
//!              │              [Play Head] ◄── loop / shift ── [Glitch / Freeze]
//!              │                      │
//!              │                      ▼
//!              └────── × feedback ── wet ──────── × mix ────────────►(+)──► Output
//! ```
//!
//! ## Module Map
//!
//! - [`dsp`]: codec, delay buffer, play head and the glitch controller.
//! - [`engine`]: ties them together behind one per-block entry point.
//! - [`staging`]: lock-free hand-off of control values to the engine.
//! - [`config`]: construction-time settings and their validation.
//! - [`block_fifo`]: adapts the host's buffer sizes to the engine's block.

pub mod block_fifo;
pub mod config;
pub mod dsp;
pub mod engine;
mod params;
pub mod staging;

use std::num::NonZeroU32;
use std::sync::Arc;

use block_fifo::BlockFifo;
use config::{EngineConfig, BLOCK_SIZE};
use dsp::delay_buffer::SampleSource;
use engine::GlitchDelayEngine;
use nih_plug::prelude::*;
use params::{ControlEdges, GlitchDelayParams};

/// The main plugin struct.
///
/// The engine is only created once the host has told us its sample rate
/// in `initialize()`; until then `engine` is `None` and the plugin passes
/// silence.
struct GlitchDelay {
    params: Arc<GlitchDelayParams>,
    engine: Option<GlitchDelayEngine>,
    fifo: BlockFifo,
    edges: ControlEdges,
}

impl Default for GlitchDelay {
    fn default() -> Self {
        Self {
            params: Arc::new(GlitchDelayParams::default()),
            engine: None,
            fifo: BlockFifo::new(),
            edges: ControlEdges::default(),
        }
    }
}

impl Plugin for GlitchDelay {
    const NAME: &'static str = "Glitch Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // The pedal is mono: one input jack, one output jack.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(1),
        main_output_channels: NonZeroU32::new(1),
        aux_input_ports: &[],
        aux_output_ports: &[],
        names: PortNames::const_default(),
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Control values are only read at block boundaries.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Build the engine for the host's sample rate. A configuration the
    /// engine rejects makes the host refuse the plugin instead of playing
    /// garbage.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        let config = EngineConfig::with_sample_rate(buffer_config.sample_rate);
        let engine = match GlitchDelayEngine::new(config) {
            Ok(engine) => engine,
            Err(err) => {
                nih_error!("cannot start the glitch delay engine: {err}");
                return false;
            }
        };

        nih_log!(
            "glitch delay engine ready: {} bytes, {} slots at {} Hz",
            engine.buffer().capacity_bytes(),
            engine.buffer().len(),
            buffer_config.sample_rate
        );
        self.engine = Some(engine);
        self.fifo.clear();
        self.edges = ControlEdges::default();

        // Every sample waits for its block to fill before the engine sees it.
        context.set_latency_samples(BLOCK_SIZE as u32);
        true
    }

    /// Called when playback stops or the plugin is bypassed. Old audio,
    /// loops and queued samples are dropped; the switch edges are forgotten
    /// so a held freeze is sent again on the next block.
    fn reset(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
        self.fifo.clear();
        self.edges = ControlEdges::default();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let Some(engine) = self.engine.as_mut() else {
            return ProcessStatus::Normal;
        };
        let Some(channel) = buffer.as_slice().get_mut(0) else {
            return ProcessStatus::Normal;
        };

        for sample in channel.iter_mut() {
            // Step 1: QUEUE the input and take back the output for this slot.
            //
            // The FIFO hands out samples from the previous full block, which
            // is where the one block of reported latency comes from.
            *sample = self.fifo.push(*sample);

            if self.fifo.is_full() {
                // Step 2: FORWARD the knobs and switches to the engine.
                //
                // Values are read once per engine block, and the switches
                // only send something when they change.
                self.params.forward_to(engine.staging(), &mut self.edges);

                // Step 3: RUN one engine callback over the queued block.
                self.fifo.run(engine);
            }
        }

        // A frozen loop keeps sounding with no input at all, so the host
        // must never decide the tail has ended.
        ProcessStatus::KeepAlive
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for GlitchDelay {
    const CLAP_ID: &'static str = "com.loveless-audio.glitch-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A lo-fi delay with freeze, glitch and bit-depth reduction");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Mono,
        ClapFeature::Delay,
        ClapFeature::Glitch,
    ];
}

impl Vst3Plugin for GlitchDelay {
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssGlitchDly01";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Delay,
        Vst3SubCategory::Mono,
    ];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────

nih_export_clap!(GlitchDelay);
nih_export_vst3!(GlitchDelay);

// Re-export the CLAP entry point as an Audio Unit for Logic Pro.
clap_wrapper::export_auv2!();
