//! Session layer for driftdj
//!
//! Everything between the remote generation service and the audio
//! engine: the wire protocol and session client, the orchestrator state
//! machines (playback, connection recovery, stuck-loading watchdog),
//! prompt and preset management, and the throttled config pusher.
//!
//! The audio engine itself lives in `driftdj-core`; this crate only
//! talks to it through the lock-free command channel.

pub mod api;
pub mod client;
pub mod clock;
pub mod error;
pub mod framing;
pub mod orchestrator;
pub mod preset;
pub mod probe;
pub mod prompts;
pub mod throttle;

pub use api::{ClientMessage, MusicSession, ServerMessage, SessionUpdate, WeightedPrompt};
pub use client::RemoteSession;
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{SessionError, SessionResult};
pub use orchestrator::{Command, ConnectionState, Event, Orchestrator, OrchestratorDeps};
pub use preset::{ImportOutcome, Preset, PresetStore};
pub use prompts::{default_prompts, unused_color, Prompt, PROMPT_COLORS, PROMPT_TEXT_PRESETS};
pub use throttle::{Throttle, UPDATE_THROTTLE};
