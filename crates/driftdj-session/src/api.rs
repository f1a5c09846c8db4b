//! Wire protocol and the session abstraction
//!
//! `MusicSession` is the seam between the orchestrator and the remote
//! generation service: the real TCP client implements it, and the
//! reconnection tests drive the orchestrator with a scripted double.

use serde::{Deserialize, Serialize};

use driftdj_core::config::ModelConfig;

use crate::error::SessionResult;

/// A prompt as sent to the service: text plus blend weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: f64,
}

/// Messages sent from the client to the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    Play,
    Pause,
    Stop,
    /// Drop the model's generation context; the stream restarts fresh
    ResetContext,
    SetWeightedPrompts { prompts: Vec<WeightedPrompt> },
    SetMusicGenerationConfig { config: ModelConfig },
    /// Clean disconnection
    Close,
}

/// Messages sent from the service to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake done, the session is ready for control messages
    SetupComplete,
    /// One generated chunk: base64 PCM16 interleaved stereo at 48kHz
    AudioChunk { data: String },
    /// A prompt was rejected by the service's content filter
    FilteredPrompt { text: String, reason: String },
    Error { message: String },
}

/// Decoded updates delivered to the orchestrator
///
/// The base64/PCM boundary lives in the reader thread; by the time an
/// update reaches the orchestrator the payload is raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    SetupComplete,
    /// Interleaved PCM16 little-endian stereo bytes
    Chunk(Vec<u8>),
    FilteredPrompt { text: String, reason: String },
    Error(String),
    /// The transport dropped; no further updates will arrive
    Closed,
}

/// Control surface of a live generation session
pub trait MusicSession: Send {
    fn play(&mut self) -> SessionResult<()>;
    fn pause(&mut self) -> SessionResult<()>;
    fn stop(&mut self) -> SessionResult<()>;
    fn reset_context(&mut self) -> SessionResult<()>;
    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> SessionResult<()>;
    fn set_music_generation_config(&mut self, config: &ModelConfig) -> SessionResult<()>;
    /// Close the transport; the session is unusable afterwards
    fn close(&mut self) -> SessionResult<()>;
}
