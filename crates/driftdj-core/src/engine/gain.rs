//! Sample-clock gain automation
//!
//! A gain value with a single scheduled linear ramp, evaluated against
//! the engine's absolute sample counter. Starting a new ramp cancels any
//! ramp in flight and departs from the value it had reached, so a pause
//! fade interrupted by play resumes from wherever the fade got to.

/// Gain floor used instead of true zero so exponential-feeling fades
/// never hit denormals or divide-by-zero downstream
pub const GAIN_FLOOR: f32 = 0.0001;

#[derive(Debug, Clone, Copy)]
struct Ramp {
    start_sample: u64,
    end_sample: u64,
    from: f32,
    to: f32,
}

/// A scheduled-ramp gain parameter
#[derive(Debug, Clone, Copy)]
pub struct GainRamp {
    value: f32,
    ramp: Option<Ramp>,
}

impl GainRamp {
    pub fn new(initial: f32) -> Self {
        Self {
            value: initial,
            ramp: None,
        }
    }

    /// Cancel any pending ramp, freezing at the value reached by `now`
    pub fn cancel(&mut self, now: u64) {
        self.value = self.value_at(now);
        self.ramp = None;
    }

    /// Jump to a value immediately, cancelling any ramp
    pub fn set_now(&mut self, value: f32, now: u64) {
        let _ = now;
        self.value = value;
        self.ramp = None;
    }

    /// Begin a linear ramp from the current value to `target`
    ///
    /// The ramp starts at `now` and completes `duration_samples` later.
    /// A zero duration is an immediate set.
    pub fn ramp_to(&mut self, target: f32, now: u64, duration_samples: u64) {
        let from = self.value_at(now);
        if duration_samples == 0 {
            self.value = target;
            self.ramp = None;
            return;
        }
        self.value = from;
        self.ramp = Some(Ramp {
            start_sample: now,
            end_sample: now + duration_samples,
            from,
            to: target,
        });
    }

    /// Value at an absolute sample position
    #[inline]
    pub fn value_at(&self, sample: u64) -> f32 {
        match self.ramp {
            None => self.value,
            Some(r) => {
                if sample <= r.start_sample {
                    r.from
                } else if sample >= r.end_sample {
                    r.to
                } else {
                    let t = (sample - r.start_sample) as f32
                        / (r.end_sample - r.start_sample) as f32;
                    r.from + (r.to - r.from) * t
                }
            }
        }
    }

    /// Advance past `now`, collapsing a completed ramp into the value
    #[inline]
    pub fn settle(&mut self, now: u64) {
        if let Some(r) = self.ramp {
            if now >= r.end_sample {
                self.value = r.to;
                self.ramp = None;
            }
        }
    }

    /// Whether a ramp is still in flight at `now`
    pub fn is_ramping(&self, now: u64) -> bool {
        matches!(self.ramp, Some(r) if now < r.end_sample)
    }
}
