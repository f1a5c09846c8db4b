//! Phaser stage
//!
//! A cascade of second-order allpass sections swept by a sine LFO, with
//! a feedback path from the cascade output back to its input. All active
//! sections track the same modulated center frequency; sections beyond
//! the configured count keep running at the base frequency so changing
//! the stage count never discontinues their state.

use crate::config::PhaserSettings;
use crate::effect::{SmoothedParam, PARAM_RAMP_SECONDS};
use crate::types::{StereoBuffer, StereoSample};

use super::eq::Biquad;
use super::MAX_PHASER_STAGES;

/// Coefficients are recomputed at control rate, not per sample
const MOD_INTERVAL: usize = 16;

pub struct Phaser {
    stages: Vec<Biquad>,
    sample_rate: u32,
    active_stages: usize,
    rate_hz: f32,
    lfo_amount: f32,
    base_frequency: f32,
    lfo_phase: f32,
    samples_until_update: usize,
    feedback: SmoothedParam,
    dry: SmoothedParam,
    wet: SmoothedParam,
    last_output: StereoSample,
}

impl Phaser {
    pub fn new(sample_rate: u32) -> Self {
        let mut stages = Vec::with_capacity(MAX_PHASER_STAGES);
        for _ in 0..MAX_PHASER_STAGES {
            let mut biquad = Biquad::new();
            biquad.set_params(
                crate::config::EqFilterType::Allpass,
                700.0,
                1.0,
                0.0,
                sample_rate,
            );
            stages.push(biquad);
        }
        Self {
            stages,
            sample_rate,
            active_stages: 0,
            rate_hz: 0.0,
            lfo_amount: 0.0,
            base_frequency: 700.0,
            lfo_phase: 0.0,
            samples_until_update: 0,
            feedback: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
            dry: SmoothedParam::new(1.0, PARAM_RAMP_SECONDS, sample_rate),
            wet: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
            last_output: StereoSample::silence(),
        }
    }

    pub fn apply(&mut self, settings: &PhaserSettings) {
        self.active_stages = settings.stages.min(MAX_PHASER_STAGES);
        self.rate_hz = settings.rate.max(0.0);
        self.lfo_amount = settings.lfo_amount;
        self.base_frequency = settings.base_frequency;
        self.feedback.set_target(settings.feedback);
        if settings.enabled {
            self.dry.set_target(0.5);
            self.wet.set_target(0.5);
        } else {
            self.dry.set_target(1.0);
            self.wet.set_target(0.0);
        }
        // Inactive sections park at the base frequency
        for stage in self.stages.iter_mut().skip(self.active_stages) {
            stage.set_params(
                crate::config::EqFilterType::Allpass,
                self.base_frequency,
                1.0,
                0.0,
                self.sample_rate,
            );
        }
        self.samples_until_update = 0;
    }

    fn update_modulation(&mut self) {
        let freq = (self.base_frequency + self.lfo_amount * self.lfo_phase.sin()).max(20.0);
        for stage in self.stages.iter_mut().take(self.active_stages) {
            stage.set_params(
                crate::config::EqFilterType::Allpass,
                freq,
                1.0,
                0.0,
                self.sample_rate,
            );
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let phase_inc = std::f32::consts::TAU * self.rate_hz / self.sample_rate as f32;

        for sample in buffer.iter_mut() {
            if self.samples_until_update == 0 {
                self.update_modulation();
                self.samples_until_update = MOD_INTERVAL;
            }
            self.samples_until_update -= 1;
            self.lfo_phase += phase_inc;
            if self.lfo_phase >= std::f32::consts::TAU {
                self.lfo_phase -= std::f32::consts::TAU;
            }

            let fb = self.feedback.next();
            let dry = self.dry.next();
            let wet = self.wet.next();

            let mut l = sample.left + self.last_output.left * fb;
            let mut r = sample.right + self.last_output.right * fb;
            for stage in self.stages.iter_mut().take(self.active_stages) {
                let (nl, nr) = stage.process(l, r);
                l = nl;
                r = nr;
            }
            self.last_output = StereoSample::new(l, r);

            sample.left = sample.left * dry + l * wet;
            sample.right = sample.right * dry + r * wet;
        }
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
        self.lfo_phase = 0.0;
        self.last_output = StereoSample::silence();
        self.samples_until_update = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SAMPLE_RATE;

    fn settings(enabled: bool, stages: usize) -> PhaserSettings {
        PhaserSettings {
            enabled,
            rate: 0.5,
            lfo_amount: 0.5 * 700.0 * 0.7,
            feedback: 0.3,
            stages,
            base_frequency: 700.0,
        }
    }

    #[test]
    fn test_disabled_passes_dry() {
        let mut phaser = Phaser::new(SAMPLE_RATE);
        phaser.apply(&settings(false, 0));

        let mut buffer = StereoBuffer::silence(64);
        buffer[0] = StereoSample::new(1.0, 1.0);
        phaser.process(&mut buffer);

        assert!((buffer[0].left - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_enabled_output_finite_and_altered() {
        let mut phaser = Phaser::new(SAMPLE_RATE);
        phaser.apply(&settings(true, 4));

        let mut warmup = StereoBuffer::silence(SAMPLE_RATE as usize / 10);
        phaser.process(&mut warmup);

        let mut buffer = StereoBuffer::silence(4096);
        for (i, s) in buffer.iter_mut().enumerate() {
            let v = (std::f32::consts::TAU * 700.0 * i as f32 / SAMPLE_RATE as f32).sin();
            *s = StereoSample::new(v, v);
        }
        let reference: Vec<f32> = buffer.iter().map(|s| s.left).collect();
        phaser.process(&mut buffer);

        let mut diff = 0.0;
        for (s, want) in buffer.iter().zip(reference.iter()) {
            assert!(s.left.is_finite());
            diff += (s.left - want).abs();
        }
        assert!(diff > 1.0, "phaser should color the signal near its sweep");
    }

    #[test]
    fn test_stage_count_capped() {
        let mut phaser = Phaser::new(SAMPLE_RATE);
        phaser.apply(&settings(true, 99));
        assert_eq!(phaser.active_stages, MAX_PHASER_STAGES);
    }
}
