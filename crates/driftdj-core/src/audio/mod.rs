//! Cross-platform audio output for driftdj
//!
//! A single stereo output stream driven by CPAL. The design is lock-free
//! for real-time safety:
//!
//! - **Control thread**: sends commands via a lock-free ringbuffer
//! - **Audio thread**: owns the AudioEngine exclusively, processes commands
//! - **Shared clock**: the audio thread publishes rendered-sample counts
//!   through a relaxed atomic; the control thread reads time from it
//!
//! The output device is asked for the stream's native 48kHz rate. If the
//! device cannot do it we fall back to whatever it supports and log a
//! warning; the engine still renders at the device rate, so generated
//! chunks play slightly off-pitch rather than not at all.

mod cpal_backend;
mod error;

/// Requested frames per callback when the device lets us choose
pub const DEFAULT_BUFFER_SIZE: u32 = 1024;

/// Upper bound on frames per callback; pre-allocated engine buffers are
/// sized to this
pub const MAX_BUFFER_SIZE: usize = 8192;

pub use cpal_backend::{start_audio_system, AudioHandle, AudioSystemResult, CommandSender};
pub use error::{AudioError, AudioResult};
