//! Waveshaping distortion
//!
//! The classic arctangent-flavored shaper:
//!
//! ```text
//! f(x) = ((3 + k) * x * 20 * (π/180)) / (π + k * |x|)      k = amount * 200
//! ```
//!
//! At `k == 0` the curve is replaced by the identity so a zero amount is
//! exactly transparent, not merely quiet. The shaper is memoryless; only
//! the amount parameter is smoothed.

use crate::config::DistortionSettings;
use crate::effect::{SmoothedParam, PARAM_RAMP_SECONDS};
use crate::types::StereoBuffer;

pub struct Distortion {
    amount: SmoothedParam,
}

impl Distortion {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            amount: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
        }
    }

    pub fn apply(&mut self, settings: &DistortionSettings) {
        let amount = if settings.enabled { settings.amount } else { 0.0 };
        self.amount.set_target(amount);
    }

    #[inline]
    fn shape(x: f32, k: f32) -> f32 {
        if k == 0.0 {
            return x;
        }
        let deg = std::f32::consts::PI / 180.0;
        ((3.0 + k) * x * 20.0 * deg) / (std::f32::consts::PI + k * x.abs())
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let k = self.amount.next() * 200.0;
            sample.left = Self::shape(sample.left, k);
            sample.right = Self::shape(sample.right, k);
        }
    }

    pub fn reset(&mut self) {
        // Memoryless; nothing to clear
    }
}
