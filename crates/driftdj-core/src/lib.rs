//! driftdj core - real-time audio pipeline for the live generation client

pub mod audio;
pub mod config;
pub mod effect;
pub mod engine;
pub mod types;

pub use types::*;
