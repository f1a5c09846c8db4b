//! Chunk scheduling against the playback watermark
//!
//! Incoming audio chunks are placed back-to-back on the engine's sample
//! clock. The watermark is the time the last scheduled chunk ends; the
//! next chunk starts exactly there. The first chunk of a run anchors the
//! watermark a lead interval ahead of the current time. A chunk that
//! arrives after the watermark has fallen behind realtime is dropped:
//! the watermark resets and the chunk after it re-anchors fresh.
//!
//! The scheduler is pure decision logic: callers pass in the current
//! time and act on the returned start time.

/// Lead applied when anchoring with the stabilizer active
pub const STABILIZED_LEAD_SECONDS: f64 = 5.0;

/// Lead applied when anchoring without the stabilizer
pub const DIRECT_LEAD_SECONDS: f64 = 2.0;

/// Where a chunk was placed, and why
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkDecision {
    /// First chunk of a run; playback anchored a lead ahead of now
    Anchor { at: f64 },
    /// Normal in-order append at the watermark
    At { at: f64 },
    /// The watermark had fallen behind realtime; this chunk is dropped
    /// and the next one re-anchors
    Underrun,
}

#[derive(Debug)]
pub struct ChunkScheduler {
    /// End time of the last scheduled chunk; None until the run anchors
    watermark: Option<f64>,
    lead_seconds: f64,
}

impl ChunkScheduler {
    pub fn new(lead_seconds: f64) -> Self {
        Self {
            watermark: None,
            lead_seconds,
        }
    }

    /// Change the anchor lead; takes effect at the next (re-)anchor
    pub fn set_lead(&mut self, lead_seconds: f64) {
        self.lead_seconds = lead_seconds;
    }

    pub fn lead(&self) -> f64 {
        self.lead_seconds
    }

    /// Place a chunk of `duration` seconds given the current time
    pub fn schedule(&mut self, now: f64, duration: f64) -> ChunkDecision {
        match self.watermark {
            None => {
                let at = now + self.lead_seconds;
                self.watermark = Some(at + duration);
                ChunkDecision::Anchor { at }
            }
            Some(mark) if mark < now => {
                // Starting a late chunk would overlap realtime already
                // rendered; drop it and let the next chunk anchor
                self.watermark = None;
                ChunkDecision::Underrun
            }
            Some(mark) => {
                self.watermark = Some(mark + duration);
                ChunkDecision::At { at: mark }
            }
        }
    }

    /// Seconds of audio scheduled beyond `now`; zero before the anchor
    /// or after an un-noticed underrun
    pub fn buffered_ahead(&self, now: f64) -> f64 {
        match self.watermark {
            None => 0.0,
            Some(mark) => (mark - now).max(0.0),
        }
    }

    /// Drop the watermark; the next chunk re-anchors
    pub fn reset(&mut self) {
        self.watermark = None;
    }

    pub fn is_anchored(&self) -> bool {
        self.watermark.is_some()
    }
}
