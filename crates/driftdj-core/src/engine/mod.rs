//! Audio engine: chunk scheduling, stabilizer, gains, filler, recording
//!
//! The engine proper lives on the audio thread and is driven by the
//! lock-free command queue. The recorders are control-thread helpers
//! that pair with the engine's taps.

mod command;
#[allow(clippy::module_inception)]
mod engine;
mod filler;
mod gain;
mod recorder;
mod scheduler;
mod stabilizer;

pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use engine::{AudioEngine, SharedClock};
pub use filler::{
    decode_wav_bed, synthesize_crackle, Filler, FILLER_FADE_IN_SECONDS,
    FILLER_FADE_OUT_SECONDS,
};
pub use gain::{GainRamp, GAIN_FLOOR};
pub use recorder::{FxRecorder, RawRecorder};
pub use scheduler::{
    ChunkDecision, ChunkScheduler, DIRECT_LEAD_SECONDS, STABILIZED_LEAD_SECONDS,
};
pub use stabilizer::{
    Stabilizer, CHECK_INTERVAL_SECONDS, FADE_SECONDS, FADE_THRESHOLD_SECONDS,
};
