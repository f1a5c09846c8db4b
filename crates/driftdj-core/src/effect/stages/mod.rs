//! The individual effect stages
//!
//! Each stage owns its own DSP state and a handful of smoothed
//! parameters, and exposes the same three methods: `apply` (retarget
//! parameters from a resolved settings record), `process` (in place, one
//! buffer at a time), and `reset` (wipe audio state, keep settings).

pub mod compressor;
pub mod distortion;
pub mod eq;
pub mod feedback_delay;
pub mod mod_delay;
pub mod phaser;
pub mod stereo_phase;
pub mod tremolo;

/// Hard cap on phaser allpass stages
pub const MAX_PHASER_STAGES: usize = 12;
