//! Feedback delay, used for both the echo and reverb stages
//!
//! A single delay line with a feedback path and a dry/wet mix. The echo
//! stage runs it with up to a second of delay; the reverb stage uses a
//! short delay with the decay control mapped onto feedback, giving a
//! cheap small-room tail.

use crate::config::FeedbackDelaySettings;
use crate::effect::{SmoothedParam, PARAM_RAMP_SECONDS};
use crate::types::StereoBuffer;

/// Stereo delay line with fractional (linearly interpolated) reads
pub(super) struct StereoDelayLine {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    len: usize,
}

impl StereoDelayLine {
    pub(super) fn new(sample_rate: u32, max_seconds: f32) -> Self {
        let len = (sample_rate as f32 * max_seconds) as usize + 2;
        Self {
            buffer_l: vec![0.0; len],
            buffer_r: vec![0.0; len],
            write_pos: 0,
            len,
        }
    }

    pub(super) fn max_delay_samples(&self) -> f32 {
        (self.len - 2) as f32
    }

    /// Read at a fractional delay behind the write position
    #[inline]
    pub(super) fn read(&self, delay_samples: f32) -> (f32, f32) {
        let delay = delay_samples.clamp(0.0, self.max_delay_samples());
        let whole = delay as usize;
        let frac = delay - whole as f32;

        let idx0 = (self.write_pos + self.len - whole) % self.len;
        let idx1 = (idx0 + self.len - 1) % self.len;

        let l = self.buffer_l[idx0] + (self.buffer_l[idx1] - self.buffer_l[idx0]) * frac;
        let r = self.buffer_r[idx0] + (self.buffer_r[idx1] - self.buffer_r[idx0]) * frac;
        (l, r)
    }

    /// Write one frame and advance
    #[inline]
    pub(super) fn write(&mut self, left: f32, right: f32) {
        self.buffer_l[self.write_pos] = left;
        self.buffer_r[self.write_pos] = right;
        self.write_pos = (self.write_pos + 1) % self.len;
    }

    pub(super) fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

pub struct FeedbackDelay {
    line: StereoDelayLine,
    sample_rate: u32,
    delay_time: SmoothedParam,
    feedback: SmoothedParam,
    dry: SmoothedParam,
    wet: SmoothedParam,
}

impl FeedbackDelay {
    pub fn new(sample_rate: u32, max_seconds: f32) -> Self {
        Self {
            line: StereoDelayLine::new(sample_rate, max_seconds),
            sample_rate,
            delay_time: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
            feedback: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
            dry: SmoothedParam::new(1.0, PARAM_RAMP_SECONDS, sample_rate),
            wet: SmoothedParam::new(0.0, PARAM_RAMP_SECONDS, sample_rate),
        }
    }

    pub fn apply(&mut self, settings: &FeedbackDelaySettings) {
        self.delay_time.set_target(settings.delay_time);
        self.feedback.set_target(settings.feedback);
        if settings.enabled {
            self.dry.set_target(1.0 - settings.mix);
            self.wet.set_target(settings.mix);
        } else {
            self.dry.set_target(1.0);
            self.wet.set_target(0.0);
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let sr = self.sample_rate as f32;
        for sample in buffer.iter_mut() {
            let delay_samples = self.delay_time.next() * sr;
            let fb = self.feedback.next();
            let dry = self.dry.next();
            let wet = self.wet.next();

            let (delayed_l, delayed_r) = self.line.read(delay_samples);
            self.line
                .write(sample.left + delayed_l * fb, sample.right + delayed_r * fb);

            sample.left = sample.left * dry + delayed_l * wet;
            sample.right = sample.right * dry + delayed_r * wet;
        }
    }

    pub fn reset(&mut self) {
        self.line.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StereoSample, SAMPLE_RATE};

    fn settings(enabled: bool, delay_time: f32, feedback: f32, mix: f32) -> FeedbackDelaySettings {
        FeedbackDelaySettings {
            enabled,
            delay_time,
            feedback,
            mix,
        }
    }

    #[test]
    fn test_disabled_passes_dry() {
        let mut delay = FeedbackDelay::new(SAMPLE_RATE, 1.0);
        delay.apply(&settings(false, 0.25, 0.0, 0.0));

        let mut buffer = StereoBuffer::silence(64);
        buffer[0] = StereoSample::new(1.0, 1.0);
        delay.process(&mut buffer);

        assert!((buffer[0].left - 1.0).abs() < 0.01);
        assert!(buffer[32].left.abs() < 0.01);
    }

    #[test]
    fn test_impulse_reappears_after_delay_time() {
        let mut delay = FeedbackDelay::new(SAMPLE_RATE, 1.0);
        delay.apply(&settings(true, 0.05, 0.0, 1.0));

        // Settle the smoothers before the impulse goes in
        let mut warmup = StereoBuffer::silence(SAMPLE_RATE as usize / 10);
        delay.process(&mut warmup);

        let delay_samples = (0.05 * SAMPLE_RATE as f32) as usize;
        let mut buffer = StereoBuffer::silence(delay_samples * 2);
        buffer[0] = StereoSample::new(1.0, 1.0);
        delay.process(&mut buffer);

        let found = buffer
            .iter()
            .skip(delay_samples - 10)
            .take(20)
            .any(|s| s.left.abs() > 0.5);
        assert!(found, "delayed impulse should appear near {} samples", delay_samples);
    }

    #[test]
    fn test_feedback_produces_repeats() {
        let mut delay = FeedbackDelay::new(SAMPLE_RATE, 1.0);
        delay.apply(&settings(true, 0.02, 0.5, 1.0));

        let mut warmup = StereoBuffer::silence(SAMPLE_RATE as usize / 10);
        delay.process(&mut warmup);

        let delay_samples = (0.02 * SAMPLE_RATE as f32) as usize;
        let mut buffer = StereoBuffer::silence(delay_samples * 4);
        buffer[0] = StereoSample::new(1.0, 1.0);
        delay.process(&mut buffer);

        // Energy in the second repeat window means feedback is live
        let second_repeat: f32 = buffer
            .iter()
            .skip(delay_samples * 2 - 10)
            .take(20)
            .map(|s| s.left.abs())
            .sum();
        assert!(second_repeat > 0.1, "expected second echo, energy={}", second_repeat);
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut delay = FeedbackDelay::new(SAMPLE_RATE, 1.0);
        delay.apply(&settings(true, 0.1, 0.5, 1.0));

        let mut buffer = StereoBuffer::silence(4096);
        for s in buffer.iter_mut() {
            *s = StereoSample::new(1.0, 1.0);
        }
        delay.process(&mut buffer);

        delay.reset();

        let mut buffer = StereoBuffer::silence(64);
        delay.process(&mut buffer);
        for s in buffer.iter() {
            assert!(s.left.abs() < 0.01, "tail should be clear after reset");
        }
    }
}
