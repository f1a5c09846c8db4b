//! Tremolo stage
//!
//! A sine LFO modulating the signal gain around a base level. At depth
//! `d` the gain swings over `[1 - d, 1]`: base level `1 - d/2` with an
//! LFO excursion of `d/2`.

use crate::config::TremoloSettings;
use crate::effect::{SmoothedParam, PARAM_RAMP_SECONDS};
use crate::types::StereoBuffer;

pub struct Tremolo {
    sample_rate: u32,
    rate_hz: f32,
    lfo_phase: f32,
    base_gain: SmoothedParam,
    depth_gain: SmoothedParam,
}

impl Tremolo {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            rate_hz: 0.0,
            lfo_phase: 0.0,
            base_gain: SmoothedParam::new(1.0, PARAM_RAMP_SECONDS, sample_rate),
            depth_gain: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
        }
    }

    pub fn apply(&mut self, settings: &TremoloSettings) {
        self.rate_hz = settings.rate.max(0.0);
        if settings.enabled {
            self.base_gain.set_target(1.0 - settings.depth * 0.5);
            self.depth_gain.set_target(settings.depth * 0.5);
        } else {
            self.base_gain.set_target(1.0);
            self.depth_gain.set_target(0.0);
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let phase_inc = std::f32::consts::TAU * self.rate_hz / self.sample_rate as f32;
        for sample in buffer.iter_mut() {
            let lfo = self.lfo_phase.sin();
            self.lfo_phase += phase_inc;
            if self.lfo_phase >= std::f32::consts::TAU {
                self.lfo_phase -= std::f32::consts::TAU;
            }

            let gain = self.base_gain.next() + self.depth_gain.next() * lfo;
            sample.left *= gain;
            sample.right *= gain;
        }
    }

    pub fn reset(&mut self) {
        self.lfo_phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StereoSample, SAMPLE_RATE};

    #[test]
    fn test_disabled_is_unity() {
        let mut trem = Tremolo::new(SAMPLE_RATE);
        trem.apply(&TremoloSettings {
            enabled: false,
            rate: 5.0,
            depth: 0.0,
        });

        let mut buffer = StereoBuffer::silence(64);
        for s in buffer.iter_mut() {
            *s = StereoSample::new(0.7, 0.7);
        }
        trem.process(&mut buffer);
        assert!((buffer[32].left - 0.7).abs() < 0.01);
    }

    #[test]
    fn test_depth_bounds_gain_swing() {
        let mut trem = Tremolo::new(SAMPLE_RATE);
        trem.apply(&TremoloSettings {
            enabled: true,
            rate: 5.0,
            depth: 0.5,
        });

        // One full LFO period of constant input after the ramp settles
        let mut warmup = StereoBuffer::silence(SAMPLE_RATE as usize / 10);
        for s in warmup.iter_mut() {
            *s = StereoSample::new(1.0, 1.0);
        }
        trem.process(&mut warmup);

        let period = SAMPLE_RATE as usize / 5;
        let mut buffer = StereoBuffer::silence(period);
        for s in buffer.iter_mut() {
            *s = StereoSample::new(1.0, 1.0);
        }
        trem.process(&mut buffer);

        let min = buffer.iter().map(|s| s.left).fold(f32::MAX, f32::min);
        let max = buffer.iter().map(|s| s.left).fold(f32::MIN, f32::max);
        // Depth 0.5: gain sweeps [0.5, 1.0]
        assert!((min - 0.5).abs() < 0.05, "min={}", min);
        assert!((max - 1.0).abs() < 0.05, "max={}", max);
    }
}
