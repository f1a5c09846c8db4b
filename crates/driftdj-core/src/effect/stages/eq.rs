//! Parametric EQ stage
//!
//! A single RBJ biquad section with the usual eight filter types. While
//! the stage is disabled the filter parks in allpass with zero gain and
//! the mix sits at full dry, so re-enabling never replays a stale curve.
//!
//! Coefficients follow the Audio EQ Cookbook (Robert Bristow-Johnson).

use crate::config::{EqFilterType, EqSettings};
use crate::effect::{SmoothedParam, PARAM_RAMP_SECONDS};
use crate::types::StereoBuffer;

/// Transposed direct form II biquad, stereo
pub(super) struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1_l: f32,
    z2_l: f32,
    z1_r: f32,
    z2_r: f32,
}

impl Biquad {
    pub(super) fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1_l: 0.0,
            z2_l: 0.0,
            z1_r: 0.0,
            z2_r: 0.0,
        }
    }

    pub(super) fn set_params(
        &mut self,
        filter_type: EqFilterType,
        frequency: f32,
        q: f32,
        gain_db: f32,
        sample_rate: u32,
    ) {
        let sr = sample_rate as f32;
        let freq = frequency.clamp(10.0, sr * 0.45);
        let q = q.max(0.025);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::TAU * freq / sr;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            EqFilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            EqFilterType::Highpass => {
                let b1 = -(1.0 + cos_w0);
                (-b1 / 2.0, b1, -b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            EqFilterType::Bandpass => {
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            EqFilterType::Notch => {
                (1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            EqFilterType::Allpass => (
                1.0 - alpha,
                -2.0 * cos_w0,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            EqFilterType::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            EqFilterType::Lowshelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            EqFilterType::Highshelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    pub(super) fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let out_l = self.b0 * left + self.z1_l;
        self.z1_l = self.b1 * left - self.a1 * out_l + self.z2_l;
        self.z2_l = self.b2 * left - self.a2 * out_l;

        let out_r = self.b0 * right + self.z1_r;
        self.z1_r = self.b1 * right - self.a1 * out_r + self.z2_r;
        self.z2_r = self.b2 * right - self.a2 * out_r;

        (out_l, out_r)
    }

    pub(super) fn reset(&mut self) {
        self.z1_l = 0.0;
        self.z2_l = 0.0;
        self.z1_r = 0.0;
        self.z2_r = 0.0;
    }
}

pub struct Equalizer {
    filter: Biquad,
    sample_rate: u32,
    dry: SmoothedParam,
    wet: SmoothedParam,
}

impl Equalizer {
    pub fn new(sample_rate: u32) -> Self {
        let mut filter = Biquad::new();
        filter.set_params(EqFilterType::Allpass, 800.0, 1.0, 0.0, sample_rate);
        Self {
            filter,
            sample_rate,
            dry: SmoothedParam::new(1.0, PARAM_RAMP_SECONDS, sample_rate),
            wet: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
        }
    }

    pub fn apply(&mut self, settings: &EqSettings) {
        self.filter.set_params(
            settings.filter_type,
            settings.frequency,
            settings.q,
            settings.gain_db,
            self.sample_rate,
        );
        if settings.enabled {
            self.dry.set_target(0.0);
            self.wet.set_target(1.0);
        } else {
            self.dry.set_target(1.0);
            self.wet.set_target(0.0);
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let dry = self.dry.next();
            let wet = self.wet.next();
            // Wet gain sits before the filter, matching the graph order
            let (filt_l, filt_r) = self.filter.process(sample.left * wet, sample.right * wet);
            sample.left = sample.left * dry + filt_l;
            sample.right = sample.right * dry + filt_r;
        }
    }

    pub fn reset(&mut self) {
        self.filter.reset();
    }
}
