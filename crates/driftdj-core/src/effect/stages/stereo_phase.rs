//! Stereo phase-shift stage
//!
//! Scales the right channel by `cos(amount * 2π)` while the left passes
//! untouched. Amount 0 gives unity gain; 0.5 inverts the right channel,
//! collapsing a mono signal to silence when summed downstream.

use crate::config::StereoPhaseSettings;
use crate::effect::{SmoothedParam, PARAM_RAMP_SECONDS};
use crate::types::StereoBuffer;

pub struct StereoPhase {
    right_gain: SmoothedParam,
}

impl StereoPhase {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            right_gain: SmoothedParam::new(1.0, PARAM_RAMP_SECONDS, sample_rate),
        }
    }

    pub fn apply(&mut self, settings: &StereoPhaseSettings) {
        self.right_gain.set_target(settings.right_gain);
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            sample.right *= self.right_gain.next();
        }
    }

    pub fn reset(&mut self) {
        // Gain-only; nothing to clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StereoSample, SAMPLE_RATE};

    #[test]
    fn test_neutral_amount_passes_both_channels() {
        let mut stage = StereoPhase::new(SAMPLE_RATE);
        stage.apply(&StereoPhaseSettings { right_gain: 1.0 });

        let mut buffer = StereoBuffer::silence(16);
        for s in buffer.iter_mut() {
            *s = StereoSample::new(0.5, 0.5);
        }
        stage.process(&mut buffer);
        assert!((buffer[15].right - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_half_turn_inverts_right() {
        let mut stage = StereoPhase::new(SAMPLE_RATE);
        // amount 0.5 -> cos(pi) = -1
        stage.apply(&StereoPhaseSettings { right_gain: -1.0 });

        let mut buffer = StereoBuffer::silence(SAMPLE_RATE as usize / 10);
        for s in buffer.iter_mut() {
            *s = StereoSample::new(0.5, 0.5);
        }
        stage.process(&mut buffer);

        let last = buffer[buffer.len() - 1];
        assert!((last.left - 0.5).abs() < 0.01);
        assert!((last.right + 0.5).abs() < 0.01);
    }
}
