//! Dynamics compressor stage
//!
//! Feed-forward compressor with a soft knee: a peak envelope follower
//! with separate attack/release coefficients drives a dB-domain gain
//! computer. When enabled, the wet path fully replaces the dry signal.

use crate::config::CompressorSettings;
use crate::effect::{SmoothedParam, PARAM_RAMP_SECONDS};
use crate::types::StereoBuffer;

pub struct Compressor {
    sample_rate: u32,
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Envelope level in dB
    envelope_db: f32,
    dry: SmoothedParam,
    wet: SmoothedParam,
}

/// Floor for the envelope so log10 stays sane on silence
const SILENCE_DB: f32 = -100.0;

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let mut c = Self {
            sample_rate,
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope_db: SILENCE_DB,
            dry: SmoothedParam::new(1.0, PARAM_RAMP_SECONDS, sample_rate),
            wet: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
        };
        c.set_times(0.003, 0.25);
        c
    }

    fn set_times(&mut self, attack: f32, release: f32) {
        let sr = self.sample_rate as f32;
        self.attack_coeff = 1.0 - (-1.0 / (attack.max(1e-4) * sr)).exp();
        self.release_coeff = 1.0 - (-1.0 / (release.max(1e-4) * sr)).exp();
    }

    pub fn apply(&mut self, settings: &CompressorSettings) {
        self.threshold_db = settings.threshold_db;
        self.knee_db = settings.knee_db.max(0.0);
        self.ratio = settings.ratio.max(1.0);
        self.set_times(settings.attack, settings.release);
        if settings.enabled {
            self.dry.set_target(0.0);
            self.wet.set_target(1.0);
        } else {
            self.dry.set_target(1.0);
            self.wet.set_target(0.0);
        }
    }

    /// Gain reduction in dB for an input level in dB (soft knee)
    #[inline]
    fn gain_reduction_db(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold_db;
        let half_knee = self.knee_db * 0.5;
        if over <= -half_knee {
            0.0
        } else if over < half_knee {
            // Quadratic interpolation through the knee
            let t = over + half_knee;
            (1.0 / self.ratio - 1.0) * t * t / (2.0 * self.knee_db)
        } else {
            (1.0 / self.ratio - 1.0) * over
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let dry = self.dry.next();
            let wet = self.wet.next();

            let peak = sample.peak().max(1e-5);
            let level_db = 20.0 * peak.log10();

            // Attack when the level rises above the envelope, release otherwise
            let coeff = if level_db > self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db += coeff * (level_db - self.envelope_db);
            self.envelope_db = self.envelope_db.max(SILENCE_DB);

            let gain = 10.0_f32.powf(self.gain_reduction_db(self.envelope_db) / 20.0);

            sample.left = sample.left * dry + sample.left * gain * wet;
            sample.right = sample.right * dry + sample.right * gain * wet;
        }
    }

    pub fn reset(&mut self) {
        self.envelope_db = SILENCE_DB;
    }
}
