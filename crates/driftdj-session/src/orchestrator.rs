//! Orchestrator: the single actor behind the whole client
//!
//! Every state transition runs here, serialized through one event loop:
//! playback control, the connection recovery ladder (error → internet
//! check → reconnect), the stuck-loading watchdog, prompt and preset
//! management, throttled pushes to the service, and the recording taps.
//!
//! The orchestrator owns the session handle and the engine command
//! channel but never touches the socket or the audio thread directly.
//! All timing goes through the injected `Clock`, so the recovery ladder
//! is testable without a single sleep.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use driftdj_core::audio::CommandSender;
use driftdj_core::config::{save_config, AppConfig, EffectSettings, GenerationConfig};
use driftdj_core::engine::{
    EngineCommand, FxRecorder, RawRecorder, SharedClock, DIRECT_LEAD_SECONDS, FADE_SECONDS,
    FILLER_FADE_IN_SECONDS, FILLER_FADE_OUT_SECONDS, GAIN_FLOOR, STABILIZED_LEAD_SECONDS,
};
use driftdj_core::types::{PlaybackState, StereoBuffer, StereoSample, SAMPLE_RATE};

use crate::api::{MusicSession, SessionUpdate, WeightedPrompt};
use crate::clock::Clock;
use crate::error::SessionResult;
use crate::preset::{generate_id, Preset, PresetStore};
use crate::probe::{ConnectivityProbe, PROBE_INTERVAL};
use crate::prompts::{unused_color, Prompt, PROMPT_TEXT_PRESETS};
use crate::throttle::{Throttle, UPDATE_THROTTLE};

/// Pause fades the output over this long
pub const PAUSE_FADE_SECONDS: f64 = 2.0;
/// A reopened session must confirm setup within this window
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// No audio while loading for this long forces a session restart
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(32);
/// Breather between a forced stop and the session recreate
const RESTART_DELAY: Duration = Duration::from_millis(250);
/// Settings are re-pushed this long after a context reset
const SETTINGS_REPLAY_DELAY: Duration = Duration::from_millis(200);
/// FX tap ring: ~4s of headroom between drains
const FX_TAP_CAPACITY: usize = SAMPLE_RATE as usize * 4;

/// Builds a fresh session during reconnection
pub type SessionFactory =
    Box<dyn FnMut(Sender<SessionUpdate>) -> SessionResult<Box<dyn MusicSession>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Transport lost, recovery not yet started or waiting to start
    ConnectionError,
    /// Probing for internet reachability
    CheckingInternet,
    /// Session reopened, waiting for setup confirmation
    Reconnecting,
}

/// User-facing operations
#[derive(Debug)]
pub enum Command {
    PlayPause,
    Stop,
    /// Reset the model context and restore default settings
    Reset,
    AddPrompt { text: String },
    AddRandomPrompt,
    EditPrompt {
        id: String,
        text: Option<String>,
        weight: Option<f64>,
    },
    SetPromptLocked { id: String, locked: bool },
    RemovePrompt { id: String },
    UpdateSettings(Box<GenerationConfig>),
    SetAutoDensity(bool),
    SetAutoBrightness(bool),
    SetMasterVolume(f32),
    SetStabilizerEnabled(bool),
    SetAutoVolume {
        enabled: bool,
        frequency_hz: f64,
        min_level_percent: f64,
    },
    ToggleRawRecording,
    ToggleFxRecording,
    SavePreset { name: String },
    LoadPreset { id: String },
    DeletePreset { id: String },
    Shutdown,
}

/// Everything the event loop consumes
#[derive(Debug)]
pub enum Event {
    Command(Command),
    Session(SessionUpdate),
    Tick,
}

/// Construction-time wiring
pub struct OrchestratorDeps {
    pub clock: Box<dyn Clock>,
    pub probe: Box<dyn ConnectivityProbe>,
    pub session: Box<dyn MusicSession>,
    pub session_factory: SessionFactory,
    /// Cloned into every freshly-built session
    pub update_tx: Sender<SessionUpdate>,
    pub audio: CommandSender,
    pub engine_clock: SharedClock,
    pub app: AppConfig,
    pub config_path: PathBuf,
    pub prompts: Vec<Prompt>,
    pub prompts_path: PathBuf,
    pub preset_path: PathBuf,
    pub recordings_dir: PathBuf,
}

pub struct Orchestrator {
    clock: Box<dyn Clock>,
    probe: Box<dyn ConnectivityProbe>,
    session: Box<dyn MusicSession>,
    session_factory: SessionFactory,
    update_tx: Sender<SessionUpdate>,
    audio: CommandSender,
    engine_clock: SharedClock,
    app: AppConfig,
    config_path: PathBuf,

    playback: PlaybackState,
    connection: ConnectionState,

    prompts: Vec<Prompt>,
    prompts_path: PathBuf,
    prompt_seq: usize,
    filtered: HashSet<String>,
    config: GenerationConfig,
    defaults: GenerationConfig,
    auto_density: bool,
    auto_brightness: bool,
    presets: PresetStore,

    prompt_throttle: Throttle<Vec<WeightedPrompt>>,
    config_throttle: Throttle<GenerationConfig>,

    // Recovery ladder deadlines, all on the injected clock
    fade_done_at: Option<Instant>,
    next_probe_at: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    awaiting_setup: bool,
    /// Reopen attempts since the connection was last healthy
    reconnect_attempts: u32,
    watchdog_deadline: Option<Instant>,
    watchdog_logged_secs: u64,
    restart_at: Option<Instant>,
    settings_replay_at: Option<Instant>,
    /// Anchored start of the pending Loading → Playing transition
    pending_play_at: Option<Instant>,

    last_underruns: u64,
    raw_recorder: RawRecorder,
    fx_recorder: FxRecorder,
    fx_consumer: Option<rtrb::Consumer<StereoSample>>,
    recordings_dir: PathBuf,

    rng: StdRng,
    status: Option<String>,
    shutdown: bool,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        let defaults = GenerationConfig::defaults();
        let last_underruns = deps.engine_clock.underruns();
        let prompt_seq = deps.prompts.len();
        Self {
            clock: deps.clock,
            probe: deps.probe,
            session: deps.session,
            session_factory: deps.session_factory,
            update_tx: deps.update_tx,
            audio: deps.audio,
            engine_clock: deps.engine_clock,
            app: deps.app,
            config_path: deps.config_path,
            playback: PlaybackState::Stopped,
            connection: ConnectionState::Connected,
            prompts: deps.prompts,
            prompts_path: deps.prompts_path,
            prompt_seq,
            filtered: HashSet::new(),
            config: defaults.clone(),
            defaults,
            auto_density: false,
            auto_brightness: false,
            presets: PresetStore::load(&deps.preset_path),
            prompt_throttle: Throttle::new(UPDATE_THROTTLE),
            config_throttle: Throttle::new(UPDATE_THROTTLE),
            fade_done_at: None,
            next_probe_at: None,
            reconnect_deadline: None,
            awaiting_setup: false,
            reconnect_attempts: 0,
            watchdog_deadline: None,
            watchdog_logged_secs: 0,
            restart_at: None,
            settings_replay_at: None,
            pending_play_at: None,
            last_underruns,
            raw_recorder: RawRecorder::new(),
            fx_recorder: FxRecorder::new(),
            fx_consumer: None,
            recordings_dir: deps.recordings_dir,
            rng: StdRng::from_entropy(),
            status: None,
            shutdown: false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────

    /// Drive the loop until shutdown
    pub fn run(&mut self, commands: Receiver<Command>, updates: Receiver<SessionUpdate>) {
        let ticker = crossbeam::channel::tick(Duration::from_millis(100));
        while !self.shutdown {
            crossbeam::channel::select! {
                recv(commands) -> msg => match msg {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => break,
                },
                recv(updates) -> msg => match msg {
                    Ok(update) => self.handle_update(update),
                    Err(_) => break,
                },
                recv(ticker) -> _ => self.handle_tick(),
            }
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Command(cmd) => self.handle_command(cmd),
            Event::Session(update) => self.handle_update(update),
            Event::Tick => self.handle_tick(),
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::PlayPause => self.play_pause(),
            Command::Stop => self.stop_audio(false),
            Command::Reset => self.reset(),
            Command::AddPrompt { text } => self.add_prompt(text),
            Command::AddRandomPrompt => self.add_random_prompt(),
            Command::EditPrompt { id, text, weight } => self.edit_prompt(&id, text, weight),
            Command::SetPromptLocked { id, locked } => {
                if let Some(p) = self.prompts.iter_mut().find(|p| p.prompt_id == id) {
                    p.locked = locked;
                }
            }
            Command::RemovePrompt { id } => self.remove_prompt(&id),
            Command::UpdateSettings(config) => {
                self.config = *config;
                self.queue_settings();
            }
            Command::SetAutoDensity(on) => {
                self.auto_density = on;
                self.queue_settings();
            }
            Command::SetAutoBrightness(on) => {
                self.auto_brightness = on;
                self.queue_settings();
            }
            Command::SetMasterVolume(volume) => {
                self.app.master_volume = volume.clamp(0.0, 1.0);
                let volume = self.app.master_volume;
                self.send_audio(EngineCommand::SetMasterVolume { volume });
            }
            Command::SetStabilizerEnabled(enabled) => {
                self.app.stabilizer_enabled = enabled;
                self.send_audio(EngineCommand::SetStabilizerEnabled(enabled));
            }
            Command::SetAutoVolume {
                enabled,
                frequency_hz,
                min_level_percent,
            } => {
                self.app.auto_volume.enabled = enabled;
                self.app.auto_volume.frequency_hz = frequency_hz;
                self.app.auto_volume.min_level_percent = min_level_percent;
                self.send_audio(EngineCommand::SetAutoVolume {
                    enabled,
                    frequency_hz,
                    min_level_percent,
                });
            }
            Command::ToggleRawRecording => self.toggle_raw_recording(),
            Command::ToggleFxRecording => self.toggle_fx_recording(),
            Command::SavePreset { name } => self.save_preset(name),
            Command::LoadPreset { id } => self.load_preset(&id),
            Command::DeletePreset { id } => {
                if self.presets.delete(&id) {
                    self.persist_presets();
                }
            }
            Command::Shutdown => self.do_shutdown(),
        }
    }

    pub fn handle_update(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::SetupComplete => {
                info!("Session setup complete");
                let was_reconnecting = self.connection == ConnectionState::Reconnecting;
                self.connection = ConnectionState::Connected;
                self.cancel_recovery();
                if was_reconnecting {
                    self.send_prompts_now();
                    self.apply_settings(self.config.clone());
                    self.load_audio();
                }
            }
            SessionUpdate::Chunk(bytes) => self.on_chunk(bytes),
            SessionUpdate::FilteredPrompt { text, reason } => {
                warn!("Prompt filtered by the service: {:?} ({})", text, reason);
                self.status = Some(format!("Prompt \"{}\" was filtered: {}", text, reason));
                self.filtered.insert(text);
                self.queue_prompts();
            }
            SessionUpdate::Error(message) => self.connection_lost(&message),
            SessionUpdate::Closed => self.connection_lost("connection closed"),
        }
    }

    pub fn handle_tick(&mut self) {
        let now = self.clock.now();

        // Loading → Playing once the anchored start passes
        if let Some(t) = self.pending_play_at {
            if now >= t && self.playback == PlaybackState::Loading {
                self.pending_play_at = None;
                self.playback = PlaybackState::Playing;
                self.send_audio(EngineCommand::SetPlaybackState(PlaybackState::Playing));
                info!("Playback running");
            }
        }

        // Stuck-loading watchdog
        if let Some(deadline) = self.watchdog_deadline {
            if self.playback == PlaybackState::Loading {
                let left = deadline.saturating_duration_since(now).as_secs();
                if left != self.watchdog_logged_secs {
                    self.watchdog_logged_secs = left;
                    debug!("Buffering stalled, forced restart in {}s", left);
                }
                if now >= deadline {
                    // Fires once per arming
                    self.watchdog_deadline = None;
                    warn!("Loading did not produce audio in time, restarting session");
                    self.status = Some("Stream stalled, restarting".to_string());
                    self.stop_audio(true);
                    self.restart_at = Some(self.clock.now() + RESTART_DELAY);
                }
            } else {
                self.watchdog_deadline = None;
            }
        }

        // Watchdog restart: recreate the session after the breather
        if let Some(t) = self.restart_at {
            if now >= t {
                self.restart_at = None;
                if self.recreate_session() {
                    self.send_prompts_now();
                    self.apply_settings(self.config.clone());
                    self.load_audio();
                }
            }
        }

        // Error fade finished: move on to internet checking
        if let Some(t) = self.fade_done_at {
            if now >= t {
                self.fade_done_at = None;
                if self.connection == ConnectionState::ConnectionError {
                    info!("Checking internet connectivity");
                    self.connection = ConnectionState::CheckingInternet;
                    self.next_probe_at = Some(now);
                }
            }
        }

        // Reachability probe
        if self.connection == ConnectionState::CheckingInternet {
            if let Some(t) = self.next_probe_at {
                if now >= t {
                    if self.probe.is_online() {
                        self.next_probe_at = None;
                        self.begin_reconnect();
                    } else {
                        self.next_probe_at = Some(now + PROBE_INTERVAL);
                    }
                }
            }
        }

        // Reconnect confirmation timeout
        if self.awaiting_setup {
            if let Some(deadline) = self.reconnect_deadline {
                if now >= deadline {
                    warn!("Session did not confirm setup within {:?}", RECONNECT_TIMEOUT);
                    self.awaiting_setup = false;
                    self.reconnect_deadline = None;
                    self.connection = ConnectionState::ConnectionError;
                    // Back to the top of the ladder
                    self.fade_done_at = Some(now);
                }
            }
        }

        // Deferred settings replay after a context reset
        if let Some(t) = self.settings_replay_at {
            if now >= t {
                self.settings_replay_at = None;
                self.apply_settings(self.config.clone());
            }
        }

        // Trailing throttle flushes
        if let Some(prompts) = self.prompt_throttle.poll(now) {
            self.send_prompts(prompts);
        }
        if let Some(config) = self.config_throttle.poll(now) {
            self.apply_settings(config);
        }

        // Engine-side underruns put us back into Loading
        let underruns = self.engine_clock.underruns();
        if underruns != self.last_underruns {
            self.last_underruns = underruns;
            if self.playback == PlaybackState::Playing {
                warn!("Playback underrun, rebuffering");
                self.playback = PlaybackState::Loading;
                self.send_audio(EngineCommand::SetPlaybackState(PlaybackState::Loading));
                self.arm_watchdog();
            }
        }

        // Keep the FX tap ring from filling between finalizations
        if self.fx_recorder.is_active() {
            if let Some(rx) = self.fx_consumer.as_mut() {
                self.fx_recorder.drain(rx);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────

    fn play_pause(&mut self) {
        match self.playback {
            PlaybackState::Playing => self.pause_audio(),
            PlaybackState::Loading => self.stop_audio(true),
            PlaybackState::Paused | PlaybackState::Stopped => {
                if self.connection == ConnectionState::Connected {
                    self.load_audio();
                } else {
                    self.start_recovery();
                }
            }
        }
    }

    fn load_audio(&mut self) {
        self.send_audio(EngineCommand::ResetWatermark);
        self.send_audio(EngineCommand::SetOutputGain { value: GAIN_FLOOR });
        if let Err(e) = self.session.play() {
            warn!("Failed to start the stream: {}", e);
            self.connection_lost(&e.to_string());
            return;
        }
        self.playback = PlaybackState::Loading;
        self.send_audio(EngineCommand::SetPlaybackState(PlaybackState::Loading));
        self.pending_play_at = None;
        self.arm_watchdog();
        info!("Loading stream");
    }

    fn pause_audio(&mut self) {
        if !self.playback.is_active() {
            return;
        }
        self.cancel_recovery();
        self.watchdog_deadline = None;
        self.pending_play_at = None;
        self.finish_recordings();
        // The transport may already be gone; pausing a dead session is fine
        if let Err(e) = self.session.pause() {
            debug!("Pause not delivered: {}", e);
        }
        self.send_audio(EngineCommand::FadeOutput {
            target: GAIN_FLOOR,
            seconds: PAUSE_FADE_SECONDS,
        });
        self.send_audio(EngineCommand::StopFiller {
            fade_seconds: FILLER_FADE_OUT_SECONDS,
        });
        self.send_audio(EngineCommand::ResetWatermark);
        self.playback = PlaybackState::Paused;
        self.send_audio(EngineCommand::SetPlaybackState(PlaybackState::Paused));
        info!("Paused");
    }

    /// Stop playback; `hard` cuts the gain instead of fading
    fn stop_audio(&mut self, hard: bool) {
        if self.playback == PlaybackState::Stopped {
            return;
        }
        self.cancel_recovery();
        self.watchdog_deadline = None;
        self.pending_play_at = None;
        self.finish_recordings();
        if let Err(e) = self.session.stop() {
            debug!("Stop not delivered: {}", e);
        }
        if hard {
            self.send_audio(EngineCommand::SetOutputGain { value: 0.0 });
        } else {
            self.send_audio(EngineCommand::FadeOutput {
                target: GAIN_FLOOR,
                seconds: FADE_SECONDS,
            });
        }
        self.send_audio(EngineCommand::StopFiller {
            fade_seconds: FILLER_FADE_OUT_SECONDS,
        });
        self.send_audio(EngineCommand::ResetWatermark);
        self.playback = PlaybackState::Stopped;
        self.send_audio(EngineCommand::SetPlaybackState(PlaybackState::Stopped));
        info!("Stopped");
    }

    /// Reset the model context and restore default settings
    fn reset(&mut self) {
        if self.connection != ConnectionState::Connected {
            self.start_recovery();
            return;
        }
        self.pause_audio();
        if let Err(e) = self.session.reset_context() {
            warn!("Context reset not delivered: {}", e);
        }
        self.send_audio(EngineCommand::ResetContext);
        self.config = self.defaults.clone();
        self.settings_replay_at = Some(self.clock.now() + SETTINGS_REPLAY_DELAY);
        info!("Context reset, settings restored to defaults");
    }

    fn on_chunk(&mut self, bytes: Vec<u8>) {
        if !self.playback.is_active() {
            // Late chunk after pause/stop
            return;
        }
        if self.connection != ConnectionState::Connected {
            // Live data is proof of a live transport
            self.connection = ConnectionState::Connected;
            self.cancel_recovery();
        }
        self.raw_recorder.push_bytes(&bytes);

        if self.playback == PlaybackState::Loading && self.pending_play_at.is_none() {
            // First audio: the engine anchors it one lead ahead; fade the
            // output up to land with it
            let lead = if self.app.stabilizer_enabled {
                STABILIZED_LEAD_SECONDS
            } else {
                DIRECT_LEAD_SECONDS
            };
            self.send_audio(EngineCommand::FadeOutput {
                target: 1.0,
                seconds: lead,
            });
            // Release any outage bed now that fresh audio is flowing
            self.send_audio(EngineCommand::StopFiller {
                fade_seconds: FILLER_FADE_OUT_SECONDS,
            });
            self.pending_play_at = Some(self.clock.now() + Duration::from_secs_f64(lead));
            self.watchdog_deadline = None;
        }

        let buffer = StereoBuffer::from_pcm16_interleaved(&bytes);
        self.send_audio(EngineCommand::SubmitChunk(Box::new(buffer)));
    }

    fn arm_watchdog(&mut self) {
        self.watchdog_deadline = Some(self.clock.now() + WATCHDOG_TIMEOUT);
        self.watchdog_logged_secs = WATCHDOG_TIMEOUT.as_secs();
    }

    // ─────────────────────────────────────────────────────────────
    // Connection recovery
    // ─────────────────────────────────────────────────────────────

    fn connection_lost(&mut self, reason: &str) {
        if self.connection != ConnectionState::Connected {
            // Already recovering
            return;
        }
        warn!("Session connection lost: {}", reason);
        self.status = Some(format!("Connection lost: {}", reason));
        self.connection = ConnectionState::ConnectionError;

        if !self.app.continuous_playback || !self.playback.is_active() {
            // No automatic recovery; wind down and wait for the user
            self.stop_audio(!self.app.stabilizer_enabled);
            return;
        }

        // Fade the stream out and bring the bed up underneath it; the
        // bed sits past the output gain so the fade cannot take it down
        self.send_audio(EngineCommand::FadeOutput {
            target: GAIN_FLOOR,
            seconds: FADE_SECONDS,
        });
        if self.app.filler.enabled {
            self.send_audio(EngineCommand::PlayFiller {
                fade_seconds: FILLER_FADE_IN_SECONDS,
            });
        }
        self.fade_done_at = Some(self.clock.now() + Duration::from_secs_f64(FADE_SECONDS));
    }

    /// User-initiated recovery from the error state
    fn start_recovery(&mut self) {
        if self.connection == ConnectionState::CheckingInternet
            || self.connection == ConnectionState::Reconnecting
        {
            return;
        }
        info!("Checking internet connectivity");
        self.connection = ConnectionState::CheckingInternet;
        self.next_probe_at = Some(self.clock.now());
    }

    fn begin_reconnect(&mut self) {
        self.reconnect_attempts += 1;
        info!(
            "Network reachable, reopening session (attempt {})",
            self.reconnect_attempts
        );
        self.connection = ConnectionState::Reconnecting;
        if let Err(e) = self.session.close() {
            debug!("Old session close: {}", e);
        }
        match (self.session_factory)(self.update_tx.clone()) {
            Ok(session) => {
                self.session = session;
                self.awaiting_setup = true;
                self.reconnect_deadline = Some(self.clock.now() + RECONNECT_TIMEOUT);
            }
            Err(e) => {
                warn!("Reconnect failed: {}", e);
                self.connection = ConnectionState::ConnectionError;
                // Straight back to internet checking
                self.fade_done_at = Some(self.clock.now());
            }
        }
    }

    fn recreate_session(&mut self) -> bool {
        if let Err(e) = self.session.close() {
            debug!("Old session close: {}", e);
        }
        match (self.session_factory)(self.update_tx.clone()) {
            Ok(session) => {
                self.session = session;
                true
            }
            Err(e) => {
                warn!("Session restart failed: {}", e);
                self.status = Some(format!("Session restart failed: {}", e));
                self.connection = ConnectionState::ConnectionError;
                false
            }
        }
    }

    /// Clear every pending recovery timer as a group
    fn cancel_recovery(&mut self) {
        self.fade_done_at = None;
        self.next_probe_at = None;
        self.reconnect_deadline = None;
        self.awaiting_setup = false;
        self.reconnect_attempts = 0;
        self.restart_at = None;
    }

    // ─────────────────────────────────────────────────────────────
    // Prompts
    // ─────────────────────────────────────────────────────────────

    fn add_prompt(&mut self, text: String) {
        let used: Vec<String> = self.prompts.iter().map(|p| p.color.clone()).collect();
        let color = unused_color(&used, &mut self.rng);
        let prompt_id = self.next_prompt_id();
        self.prompts.push(Prompt {
            prompt_id,
            text,
            weight: 0.0,
            color,
            locked: false,
        });
        self.queue_prompts();
    }

    fn add_random_prompt(&mut self) {
        let unused: Vec<&str> = PROMPT_TEXT_PRESETS
            .iter()
            .copied()
            .filter(|t| !self.prompts.iter().any(|p| p.text == *t))
            .collect();
        let pool = if unused.is_empty() {
            &PROMPT_TEXT_PRESETS[..]
        } else {
            &unused[..]
        };
        if let Some(text) = pool.choose(&mut self.rng) {
            self.add_prompt(text.to_string());
        }
    }

    fn edit_prompt(&mut self, id: &str, text: Option<String>, weight: Option<f64>) {
        let Some(prompt) = self.prompts.iter_mut().find(|p| p.prompt_id == id) else {
            return;
        };
        if let Some(text) = text {
            // Edited text gets another chance with the filter
            self.filtered.remove(&prompt.text);
            prompt.text = text;
        }
        if let Some(weight) = weight {
            prompt.weight = weight.clamp(0.0, 2.0);
        }
        self.queue_prompts();
    }

    fn remove_prompt(&mut self, id: &str) {
        if let Some(prompt) = self.prompts.iter().find(|p| p.prompt_id == id) {
            if prompt.locked {
                warn!("Refusing to remove locked prompt {:?}", prompt.text);
                return;
            }
        }
        let before = self.prompts.len();
        self.prompts.retain(|p| p.prompt_id != id);
        if self.prompts.len() != before {
            self.queue_prompts();
        }
    }

    fn next_prompt_id(&mut self) -> String {
        loop {
            let id = format!("prompt-{}", self.prompt_seq);
            self.prompt_seq += 1;
            if !self.prompts.iter().any(|p| p.prompt_id == id) {
                return id;
            }
        }
    }

    /// Active prompts only: weight > 0 and not service-filtered
    fn active_weighted_prompts(&self) -> Vec<WeightedPrompt> {
        self.prompts
            .iter()
            .filter(|p| p.weight > 0.0 && !self.filtered.contains(&p.text))
            .map(|p| WeightedPrompt {
                text: p.text.clone(),
                weight: p.weight,
            })
            .collect()
    }

    fn queue_prompts(&mut self) {
        let prompts = self.active_weighted_prompts();
        let now = self.clock.now();
        if let Some(prompts) = self.prompt_throttle.offer(prompts, now) {
            self.send_prompts(prompts);
        }
    }

    fn send_prompts(&mut self, prompts: Vec<WeightedPrompt>) {
        if let Err(e) = self.session.set_weighted_prompts(&prompts) {
            warn!("Failed to set prompts: {}", e);
            self.status = Some(format!("Failed to set prompts: {}", e));
            self.pause_audio();
        }
    }

    /// Bypass the throttle; used on reconnect where ordering matters
    fn send_prompts_now(&mut self) {
        let prompts = self.active_weighted_prompts();
        self.send_prompts(prompts);
    }

    // ─────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────

    fn queue_settings(&mut self) {
        let config = self.config.clone();
        let now = self.clock.now();
        if let Some(config) = self.config_throttle.offer(config, now) {
            self.apply_settings(config);
        }
    }

    /// Push one settings snapshot both ways: resolved effect settings to
    /// the engine, the model subset to the service
    fn apply_settings(&mut self, config: GenerationConfig) {
        let resolved = EffectSettings::resolve(&config, &self.defaults);
        self.send_audio(EngineCommand::SetEffects(Box::new(resolved)));

        let mut model = config.model_config();
        if self.auto_density {
            model.density = None;
        }
        if self.auto_brightness {
            model.brightness = None;
        }
        if let Err(e) = self.session.set_music_generation_config(&model) {
            warn!("Failed to push generation config: {}", e);
        }
    }

    /// Initial push after construction: prompts and settings, unthrottled
    pub fn sync_session(&mut self) {
        self.send_prompts_now();
        self.apply_settings(self.config.clone());
    }

    // ─────────────────────────────────────────────────────────────
    // Presets
    // ─────────────────────────────────────────────────────────────

    fn save_preset(&mut self, name: String) {
        let preset = Preset {
            id: generate_id(),
            name,
            prompts: self.prompts.clone(),
            settings: self.config.clone(),
            auto_density: self.auto_density,
            auto_brightness: self.auto_brightness,
        };
        self.presets.upsert(preset);
        self.persist_presets();
    }

    fn load_preset(&mut self, id: &str) {
        let Some(preset) = self.presets.get(id).cloned() else {
            warn!("No preset with id {:?}", id);
            return;
        };
        info!("Loading preset {:?}", preset.name);
        self.prompts = preset.prompts;
        self.prompt_seq = self.prompts.len();
        self.config = preset.settings;
        self.auto_density = preset.auto_density;
        self.auto_brightness = preset.auto_brightness;
        self.queue_prompts();
        self.queue_settings();
    }

    fn persist_presets(&mut self) {
        if let Err(e) = self.presets.save() {
            warn!("Failed to save presets: {}", e);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────

    fn toggle_raw_recording(&mut self) {
        if self.raw_recorder.is_active() {
            match self.raw_recorder.finalize(&self.recordings_dir) {
                Ok(Some(path)) => self.status = Some(format!("Saved {:?}", path)),
                Ok(None) => self.status = Some("Nothing to save".to_string()),
                Err(e) => {
                    warn!("Raw recording failed: {}", e);
                    self.status = Some(format!("Recording failed: {}", e));
                }
            }
        } else {
            self.ensure_playing_for_recording();
            self.raw_recorder.start();
            info!("Raw recording started");
        }
    }

    fn toggle_fx_recording(&mut self) {
        if self.fx_recorder.is_active() {
            self.send_audio(EngineCommand::SetFxTap(None));
            if let Some(mut rx) = self.fx_consumer.take() {
                self.fx_recorder.drain(&mut rx);
            }
            match self.fx_recorder.finalize(&self.recordings_dir) {
                Ok(Some(path)) => self.status = Some(format!("Saved {:?}", path)),
                Ok(None) => self.status = Some("Nothing to save".to_string()),
                Err(e) => {
                    warn!("FX recording failed: {}", e);
                    self.status = Some(format!("Recording failed: {}", e));
                }
            }
        } else {
            self.ensure_playing_for_recording();
            let (tx, rx) = rtrb::RingBuffer::<StereoSample>::new(FX_TAP_CAPACITY);
            self.fx_consumer = Some(rx);
            self.send_audio(EngineCommand::SetFxTap(Some(Box::new(tx))));
            self.fx_recorder.start();
            info!("FX recording started");
        }
    }

    /// Starting a tap while stopped or paused force-starts playback
    fn ensure_playing_for_recording(&mut self) {
        if !self.playback.is_active() {
            self.play_pause();
        }
    }

    fn finish_recordings(&mut self) {
        if self.raw_recorder.is_active() {
            if let Err(e) = self.raw_recorder.finalize(&self.recordings_dir) {
                warn!("Raw recording failed: {}", e);
            }
        }
        if self.fx_recorder.is_active() {
            self.send_audio(EngineCommand::SetFxTap(None));
            if let Some(mut rx) = self.fx_consumer.take() {
                self.fx_recorder.drain(&mut rx);
            }
            if let Err(e) = self.fx_recorder.finalize(&self.recordings_dir) {
                warn!("FX recording failed: {}", e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle and introspection
    // ─────────────────────────────────────────────────────────────

    fn do_shutdown(&mut self) {
        self.stop_audio(true);
        if let Err(e) = self.session.close() {
            debug!("Session close: {}", e);
        }
        if let Err(e) = save_config(&self.app, &self.config_path) {
            warn!("Failed to save config: {}", e);
        }
        if let Ok(json) = serde_json::to_string_pretty(&self.prompts) {
            if let Some(parent) = self.prompts_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(&self.prompts_path, json) {
                warn!("Failed to save prompts: {}", e);
            }
        }
        self.persist_presets();
        self.shutdown = true;
    }

    fn send_audio(&mut self, command: EngineCommand) {
        if self.audio.send(command).is_err() {
            // Queue full means the audio thread has stalled; nothing
            // useful to do from here but say so
            warn!("Audio command queue is full, command dropped");
        }
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Session reopen attempts since the connection was last healthy
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Take the latest user-facing status message, if any
    pub fn take_status(&mut self) -> Option<String> {
        self.status.take()
    }
}
