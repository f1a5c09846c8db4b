//! Configuration for the driftdj client
//!
//! Two layers live here:
//!
//! - [`GenerationConfig`]: the per-session tuning record. Model-level
//!   fields are forwarded verbatim to the generation service; client
//!   effect fields are resolved against the defaults record and applied
//!   to the effect chain.
//! - [`AppConfig`]: locally persisted application settings (master
//!   volume, stabilizer, filler bed, auto-volume), stored as YAML.

mod app;
mod generation;
mod io;

pub use app::{AppConfig, AutoVolumeConfig, FillerConfig};
pub use generation::{
    CompressorSettings, DistortionSettings, EffectSettings, EqFilterType, EqSettings,
    FeedbackDelaySettings, GenerationConfig, ModDelaySettings, ModelConfig, PhaserSettings,
    StereoPhaseSettings, TremoloSettings,
};
pub use io::{default_config_path, load_config, save_config};
