//! Client-side effect chain
//!
//! A fixed series of ten stages applied to the decoded stream before the
//! master volume:
//!
//! ```text
//! distortion → chorus → echo → reverb → flanger → eq → compressor
//!            → phaser → tremolo → stereo phase
//! ```
//!
//! Stages are always present in the graph; a disabled stage runs with its
//! dry/wet mix at full dry so toggling never reorders or reallocates
//! anything on the audio thread. All audible parameter changes go through
//! [`SmoothedParam`] so settings swaps never click.

pub mod stages;

use crate::config::EffectSettings;
use crate::types::StereoBuffer;

use stages::compressor::Compressor;
use stages::distortion::Distortion;
use stages::eq::Equalizer;
use stages::feedback_delay::FeedbackDelay;
use stages::mod_delay::ModDelay;
use stages::phaser::Phaser;
use stages::stereo_phase::StereoPhase;
use stages::tremolo::Tremolo;

/// Default smoothing time for audible parameters, in seconds
pub const PARAM_RAMP_SECONDS: f32 = 0.02;

/// One-pole exponential parameter smoother
///
/// Approaches the target with a ~20ms time constant by default, so a
/// settings swap glides instead of stepping. `next()` is called once per
/// sample on the audio thread.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedParam {
    pub fn new(value: f32, ramp_seconds: f32, sample_rate: u32) -> Self {
        let coeff = 1.0 - (-1.0 / (ramp_seconds * sample_rate as f32)).exp();
        Self {
            current: value,
            target: value,
            coeff,
        }
    }

    /// Begin gliding toward a new target
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump immediately, abandoning any glide in progress
    #[inline]
    pub fn snap_to(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Advance one sample and return the current value
    #[inline]
    pub fn next(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }
}

/// The fixed ten-stage effect chain
pub struct EffectChain {
    distortion: Distortion,
    chorus: ModDelay,
    echo: FeedbackDelay,
    reverb: FeedbackDelay,
    flanger: ModDelay,
    eq: Equalizer,
    compressor: Compressor,
    phaser: Phaser,
    tremolo: Tremolo,
    stereo_phase: StereoPhase,
}

impl EffectChain {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            distortion: Distortion::new(sample_rate),
            chorus: ModDelay::new(sample_rate, 0.1),
            echo: FeedbackDelay::new(sample_rate, 1.0),
            reverb: FeedbackDelay::new(sample_rate, 0.5),
            flanger: ModDelay::new(sample_rate, 0.02),
            eq: Equalizer::new(sample_rate),
            compressor: Compressor::new(sample_rate),
            phaser: Phaser::new(sample_rate),
            tremolo: Tremolo::new(sample_rate),
            stereo_phase: StereoPhase::new(sample_rate),
        }
    }

    /// Apply a resolved settings record to every stage
    ///
    /// Parameters glide to their new values; nothing is reallocated.
    pub fn apply(&mut self, settings: &EffectSettings) {
        self.distortion.apply(&settings.distortion);
        self.chorus.apply(&settings.chorus);
        self.echo.apply(&settings.echo);
        self.reverb.apply(&settings.reverb);
        self.flanger.apply(&settings.flanger);
        self.eq.apply(&settings.eq);
        self.compressor.apply(&settings.compressor);
        self.phaser.apply(&settings.phaser);
        self.tremolo.apply(&settings.tremolo);
        self.stereo_phase.apply(&settings.stereo_phase);
    }

    /// Process a buffer in place through all ten stages
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        self.distortion.process(buffer);
        self.chorus.process(buffer);
        self.echo.process(buffer);
        self.reverb.process(buffer);
        self.flanger.process(buffer);
        self.eq.process(buffer);
        self.compressor.process(buffer);
        self.phaser.process(buffer);
        self.tremolo.process(buffer);
        self.stereo_phase.process(buffer);
    }

    /// Clear all delay lines, filter state, and envelopes
    ///
    /// Settings and smoothed targets survive; only audio state is wiped.
    /// Used when playback context is rebuilt after a reset.
    pub fn reset(&mut self) {
        self.distortion.reset();
        self.chorus.reset();
        self.echo.reset();
        self.reverb.reset();
        self.flanger.reset();
        self.eq.reset();
        self.compressor.reset();
        self.phaser.reset();
        self.tremolo.reset();
        self.stereo_phase.reset();
    }
}
