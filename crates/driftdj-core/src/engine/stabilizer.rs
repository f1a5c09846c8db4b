//! Low-buffer stabilizer fade
//!
//! Sits in front of the effect chain and fades the stream out before a
//! starving buffer turns into a hard cut, then fades back in once the
//! buffer recovers. The check runs at a coarse interval; the fades
//! themselves are long enough to read as a deliberate dip rather than a
//! glitch.

use super::gain::{GainRamp, GAIN_FLOOR};

/// Buffered seconds below which the fade-out starts
pub const FADE_THRESHOLD_SECONDS: f64 = 3.0;

/// Length of the fade, both directions
pub const FADE_SECONDS: f64 = 3.0;

/// How often the buffer level is consulted
pub const CHECK_INTERVAL_SECONDS: f64 = 0.25;

pub struct Stabilizer {
    sample_rate: u32,
    enabled: bool,
    gain: GainRamp,
    fading_down: bool,
    next_check_sample: u64,
}

impl Stabilizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            enabled: true,
            gain: GainRamp::new(1.0),
            fading_down: false,
            next_check_sample: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool, now: u64) {
        self.enabled = enabled;
        if !enabled {
            self.gain.set_now(1.0, now);
            self.fading_down = false;
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Consult the buffer level; called once per processing block
    ///
    /// Throttled internally to the check interval.
    pub fn update(&mut self, buffered_seconds: f64, now: u64) {
        if !self.enabled || now < self.next_check_sample {
            return;
        }
        self.next_check_sample =
            now + (CHECK_INTERVAL_SECONDS * self.sample_rate as f64) as u64;

        let fade_samples = (FADE_SECONDS * self.sample_rate as f64) as u64;
        if buffered_seconds < FADE_THRESHOLD_SECONDS {
            if !self.fading_down {
                self.fading_down = true;
                self.gain.ramp_to(GAIN_FLOOR, now, fade_samples);
            }
        } else if self.fading_down {
            self.fading_down = false;
            self.gain.ramp_to(1.0, now, fade_samples);
        }
    }

    /// Gain at an absolute sample position
    #[inline]
    pub fn gain_at(&self, sample: u64) -> f32 {
        if self.enabled {
            self.gain.value_at(sample)
        } else {
            1.0
        }
    }

    pub fn is_fading_down(&self) -> bool {
        self.fading_down
    }

    /// Clear the fade state, e.g. after a re-anchor restarts the run
    ///
    /// A lowered gain ramps back to unity rather than snapping; the
    /// re-anchor lead is silent anyway, so the ramp just avoids a step
    /// under whatever tail is still rendering.
    pub fn reset(&mut self, now: u64) {
        self.fading_down = false;
        self.next_check_sample = 0;
        if self.gain.value_at(now) < 1.0 {
            let fade_samples = (FADE_SECONDS * self.sample_rate as f64) as u64;
            self.gain.ramp_to(1.0, now, fade_samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SAMPLE_RATE;

    const SR: u64 = SAMPLE_RATE as u64;

    #[test]
    fn test_healthy_buffer_stays_at_unity() {
        let mut s = Stabilizer::new(SAMPLE_RATE);
        s.update(5.0, 0);
        assert_eq!(s.gain_at(SR), 1.0);
        assert!(!s.is_fading_down());
    }

    #[test]
    fn test_low_buffer_fades_down() {
        let mut s = Stabilizer::new(SAMPLE_RATE);
        s.update(1.0, 0);
        assert!(s.is_fading_down());
        // Fully faded after the fade duration
        let after = 3 * SR + 1;
        assert!((s.gain_at(after) - GAIN_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn test_recovery_fades_back_up() {
        let mut s = Stabilizer::new(SAMPLE_RATE);
        s.update(1.0, 0);
        // Buffer recovers after the check interval
        let t = SR / 2;
        s.update(4.0, t);
        assert!(!s.is_fading_down());
        assert!((s.gain_at(t + 3 * SR + 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_checks_are_throttled() {
        let mut s = Stabilizer::new(SAMPLE_RATE);
        s.update(5.0, 0);
        // A low reading inside the check interval is ignored
        s.update(0.5, 100);
        assert!(!s.is_fading_down());
        // Past the interval it is honored
        s.update(0.5, SR / 4 + 1);
        assert!(s.is_fading_down());
    }

    #[test]
    fn test_reset_ramps_back_to_unity() {
        let mut s = Stabilizer::new(SAMPLE_RATE);
        s.update(0.5, 0);
        // Fully faded by 4s
        let t = 4 * SR;
        assert!((s.gain_at(t) - GAIN_FLOOR).abs() < 1e-6);

        s.reset(t);
        assert!(!s.is_fading_down());
        // No snap: still near the floor right after the reset
        assert!(s.gain_at(t + 100) < 0.01);
        // Back at unity once the ramp completes
        assert!((s.gain_at(t + 3 * SR + 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_disabled_is_unity_regardless() {
        let mut s = Stabilizer::new(SAMPLE_RATE);
        s.update(0.5, 0);
        s.set_enabled(false, SR);
        assert_eq!(s.gain_at(2 * SR), 1.0);
    }
}
