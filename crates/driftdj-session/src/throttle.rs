//! Rate limiter for config and prompt pushes
//!
//! Leading-edge: the first offer in a window goes out immediately.
//! Later offers in the same window replace each other, and the last one
//! flushes when the window closes; intermediate values are dropped, the
//! service only ever needs the newest state.

use std::time::{Duration, Instant};

/// Minimum spacing between applied updates
pub const UPDATE_THROTTLE: Duration = Duration::from_millis(200);

pub struct Throttle<T> {
    window: Duration,
    last_sent: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: None,
            pending: None,
        }
    }

    /// Offer a value; returns it if it should be applied right now
    pub fn offer(&mut self, value: T, now: Instant) -> Option<T> {
        match self.last_sent {
            Some(t) if now.duration_since(t) < self.window => {
                self.pending = Some(value);
                None
            }
            _ => {
                self.last_sent = Some(now);
                self.pending = None;
                Some(value)
            }
        }
    }

    /// Release the trailing value once the window has closed
    ///
    /// Called from the periodic tick; returns at most one value per
    /// window.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_none() {
            return None;
        }
        let open = match self.last_sent {
            Some(t) => now.duration_since(t) >= self.window,
            None => true,
        };
        if open {
            self.last_sent = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any pending value without sending it
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
