//! Connection recovery state machine, driven by a mock clock
//!
//! No sleeps and no sockets: a fake session records every control call,
//! a fake probe flips between offline and online, and the clock only
//! moves when a test advances it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{unbounded, Sender};

use driftdj_core::audio::CommandSender;
use driftdj_core::config::{AppConfig, ModelConfig};
use driftdj_core::engine::{command_channel, AudioEngine, EngineCommand};
use driftdj_core::types::{PlaybackState, StereoBuffer};

use driftdj_session::api::{MusicSession, SessionUpdate, WeightedPrompt};
use driftdj_session::clock::MockClock;
use driftdj_session::error::SessionResult;
use driftdj_session::orchestrator::{
    Command, ConnectionState, Orchestrator, OrchestratorDeps, SessionFactory, RECONNECT_TIMEOUT,
    WATCHDOG_TIMEOUT,
};
use driftdj_session::probe::{ConnectivityProbe, PROBE_INTERVAL};
use driftdj_session::prompts::Prompt;

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

struct FakeSession {
    log: CallLog,
}

impl MusicSession for FakeSession {
    fn play(&mut self) -> SessionResult<()> {
        self.log.push("play");
        Ok(())
    }
    fn pause(&mut self) -> SessionResult<()> {
        self.log.push("pause");
        Ok(())
    }
    fn stop(&mut self) -> SessionResult<()> {
        self.log.push("stop");
        Ok(())
    }
    fn reset_context(&mut self) -> SessionResult<()> {
        self.log.push("reset_context");
        Ok(())
    }
    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> SessionResult<()> {
        let texts: Vec<&str> = prompts.iter().map(|p| p.text.as_str()).collect();
        self.log.push(format!("set_prompts:{}", texts.join(",")));
        Ok(())
    }
    fn set_music_generation_config(&mut self, _config: &ModelConfig) -> SessionResult<()> {
        self.log.push("set_config");
        Ok(())
    }
    fn close(&mut self) -> SessionResult<()> {
        self.log.push("close");
        Ok(())
    }
}

struct FakeProbe {
    online: Arc<AtomicBool>,
    checks: Arc<AtomicUsize>,
}

impl ConnectivityProbe for FakeProbe {
    fn is_online(&mut self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

struct Harness {
    orchestrator: Orchestrator,
    clock: MockClock,
    log: CallLog,
    online: Arc<AtomicBool>,
    probe_checks: Arc<AtomicUsize>,
    /// The engine the orchestrator's commands feed; pumped on demand
    engine: AudioEngine,
    engine_rx: rtrb::Consumer<EngineCommand>,
    _update_tx: Sender<SessionUpdate>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(continuous_playback: bool) -> Self {
        let clock = MockClock::new();
        let log = CallLog::default();
        let online = Arc::new(AtomicBool::new(false));
        let probe_checks = Arc::new(AtomicUsize::new(0));

        let (cmd_tx, engine_rx) = command_channel();
        let engine = AudioEngine::new(48_000);
        let engine_clock = engine.shared_clock();

        let (update_tx, _update_rx) = unbounded();
        let dir = tempfile::tempdir().unwrap();

        let mut app = AppConfig::default();
        app.continuous_playback = continuous_playback;
        app.stabilizer_enabled = true;

        let factory_log = log.clone();
        let session_factory: SessionFactory = Box::new(move |_tx| {
            factory_log.push("connect");
            Ok(Box::new(FakeSession {
                log: factory_log.clone(),
            }) as Box<dyn MusicSession>)
        });

        let prompts = vec![
            Prompt {
                prompt_id: "prompt-0".to_string(),
                text: "Trip Hop".to_string(),
                weight: 1.0,
                color: "#9900ff".to_string(),
                locked: false,
            },
            Prompt {
                prompt_id: "prompt-1".to_string(),
                text: "Shoegaze".to_string(),
                weight: 1.0,
                color: "#5200ff".to_string(),
                locked: true,
            },
        ];

        let orchestrator = Orchestrator::new(OrchestratorDeps {
            clock: Box::new(clock.clone()),
            probe: Box::new(FakeProbe {
                online: online.clone(),
                checks: probe_checks.clone(),
            }),
            session: Box::new(FakeSession { log: log.clone() }),
            session_factory,
            update_tx: update_tx.clone(),
            audio: CommandSender::new(cmd_tx),
            engine_clock,
            app,
            config_path: dir.path().join("config.yaml"),
            prompts,
            prompts_path: dir.path().join("prompts.json"),
            preset_path: dir.path().join("presets.json"),
            recordings_dir: dir.path().to_path_buf(),
        });

        Self {
            orchestrator,
            clock,
            log,
            online,
            probe_checks,
            engine,
            engine_rx,
            _update_tx: update_tx,
            _dir: dir,
        }
    }

    fn advance_and_tick(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.orchestrator.handle_tick();
    }

    /// Drain queued engine commands and render `blocks` × 1024 frames
    fn pump_engine(&mut self, blocks: usize) {
        let mut out = StereoBuffer::silence(1024);
        for _ in 0..blocks {
            self.engine.process_commands(&mut self.engine_rx);
            self.engine.process(&mut out);
        }
    }

    /// Get into steady playing state: play, first chunk, lead elapsed
    fn start_playing(&mut self) {
        self.orchestrator.handle_command(Command::PlayPause);
        assert_eq!(self.orchestrator.playback(), PlaybackState::Loading);
        self.orchestrator
            .handle_update(SessionUpdate::Chunk(vec![0u8; 64]));
        self.advance_and_tick(Duration::from_secs(6));
        assert_eq!(self.orchestrator.playback(), PlaybackState::Playing);
    }
}

#[test]
fn test_close_fade_probe_reconnect_resend_load_ordering() {
    let mut h = Harness::new(true);
    h.start_playing();

    // Transport drops mid-playback
    h.orchestrator.handle_update(SessionUpdate::Closed);
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Playing);

    // A second close while recovering must not restart the ladder
    h.orchestrator.handle_update(SessionUpdate::Closed);

    // Probing starts only after the fade-out window
    h.advance_and_tick(Duration::from_secs(1));
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);
    assert_eq!(h.probe_checks.load(Ordering::SeqCst), 0);

    // Fade done: enter internet checking; the first probe fires right
    // away and finds us offline
    h.advance_and_tick(Duration::from_secs(2));
    assert_eq!(h.orchestrator.connection(), ConnectionState::CheckingInternet);
    assert_eq!(h.probe_checks.load(Ordering::SeqCst), 1);

    // Still offline after one interval
    h.advance_and_tick(PROBE_INTERVAL);
    assert_eq!(h.probe_checks.load(Ordering::SeqCst), 2);

    // Network comes back: the next probe moves us to Reconnecting
    h.online.store(true, Ordering::SeqCst);
    h.advance_and_tick(PROBE_INTERVAL);
    assert_eq!(h.orchestrator.connection(), ConnectionState::Reconnecting);

    // Setup confirmation completes the ladder
    h.orchestrator.handle_update(SessionUpdate::SetupComplete);
    assert_eq!(h.orchestrator.connection(), ConnectionState::Connected);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Loading);

    // Strict ordering: close old, connect new, prompts, config, play
    let calls = h.log.calls();
    let tail: Vec<&str> = calls.iter().rev().take(5).rev().map(|s| s.as_str()).collect();
    assert_eq!(
        tail,
        vec![
            "close",
            "connect",
            "set_prompts:Trip Hop,Shoegaze",
            "set_config",
            "play"
        ]
    );
}

#[test]
fn test_reconnect_timeout_returns_to_probing() {
    let mut h = Harness::new(true);
    h.start_playing();

    h.orchestrator.handle_update(SessionUpdate::Closed);
    h.online.store(true, Ordering::SeqCst);

    // Fade completes, probe finds the network, session reopens
    h.advance_and_tick(Duration::from_secs(3));
    assert_eq!(h.orchestrator.connection(), ConnectionState::Reconnecting);

    // No SetupComplete arrives within the confirmation window
    h.advance_and_tick(RECONNECT_TIMEOUT);
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);

    // The ladder re-enters internet checking and probes again
    h.online.store(false, Ordering::SeqCst);
    let checks_before = h.probe_checks.load(Ordering::SeqCst);
    h.advance_and_tick(Duration::from_millis(100));
    assert_eq!(h.orchestrator.connection(), ConnectionState::CheckingInternet);
    assert!(h.probe_checks.load(Ordering::SeqCst) > checks_before);
}

#[test]
fn test_reconnect_attempts_counted_and_reset() {
    let mut h = Harness::new(true);
    h.start_playing();
    assert_eq!(h.orchestrator.reconnect_attempts(), 0);

    h.orchestrator.handle_update(SessionUpdate::Closed);
    h.online.store(true, Ordering::SeqCst);

    // First reopen after the fade
    h.advance_and_tick(Duration::from_secs(3));
    assert_eq!(h.orchestrator.connection(), ConnectionState::Reconnecting);
    assert_eq!(h.orchestrator.reconnect_attempts(), 1);

    // Confirmation never arrives; the ladder loops and reopens again
    h.advance_and_tick(RECONNECT_TIMEOUT);
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);
    assert_eq!(h.orchestrator.reconnect_attempts(), 1);

    h.advance_and_tick(Duration::from_millis(100));
    assert_eq!(h.orchestrator.connection(), ConnectionState::Reconnecting);
    assert_eq!(h.orchestrator.reconnect_attempts(), 2);

    // A confirmed setup clears the count
    h.orchestrator.handle_update(SessionUpdate::SetupComplete);
    assert_eq!(h.orchestrator.connection(), ConnectionState::Connected);
    assert_eq!(h.orchestrator.reconnect_attempts(), 0);
}

#[test]
fn test_no_recovery_without_continuous_playback() {
    let mut h = Harness::new(false);
    h.start_playing();

    h.orchestrator.handle_update(SessionUpdate::Closed);
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Stopped);

    // Time passes, nothing probes
    for _ in 0..10 {
        h.advance_and_tick(Duration::from_secs(5));
    }
    assert_eq!(h.probe_checks.load(Ordering::SeqCst), 0);
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);
}

#[test]
fn test_watchdog_fires_exactly_once_per_arming() {
    let mut h = Harness::new(true);

    h.orchestrator.handle_command(Command::PlayPause);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Loading);
    assert_eq!(h.log.count("play"), 1);

    // No audio ever arrives; the watchdog forces a stop + recreate
    h.advance_and_tick(WATCHDOG_TIMEOUT);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Stopped);
    assert_eq!(h.log.count("stop"), 1);

    // After the breather the session is rebuilt and reloaded
    h.advance_and_tick(Duration::from_millis(250));
    assert_eq!(h.orchestrator.playback(), PlaybackState::Loading);
    assert_eq!(h.log.count("connect"), 1);
    assert_eq!(h.log.count("play"), 2);

    // One firing per arming: nothing else happens until the new deadline
    h.advance_and_tick(Duration::from_secs(1));
    assert_eq!(h.log.count("stop"), 1);

    // Audio arriving disarms the watchdog for good
    h.orchestrator
        .handle_update(SessionUpdate::Chunk(vec![0u8; 64]));
    h.advance_and_tick(Duration::from_secs(6));
    assert_eq!(h.orchestrator.playback(), PlaybackState::Playing);
    h.advance_and_tick(WATCHDOG_TIMEOUT);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Playing);
    assert_eq!(h.log.count("stop"), 1);
}

#[test]
fn test_pause_cancels_recovery() {
    let mut h = Harness::new(true);
    h.start_playing();

    h.orchestrator.handle_update(SessionUpdate::Closed);
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);

    // User pauses before the fade completes
    h.orchestrator.handle_command(Command::PlayPause);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Paused);

    // The ladder never advances to probing
    for _ in 0..10 {
        h.advance_and_tick(Duration::from_secs(5));
    }
    assert_eq!(h.probe_checks.load(Ordering::SeqCst), 0);
    assert_eq!(h.orchestrator.connection(), ConnectionState::ConnectionError);
}

#[test]
fn test_stop_is_idempotent() {
    let mut h = Harness::new(true);
    h.start_playing();

    h.orchestrator.handle_command(Command::Stop);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Stopped);
    let stops = h.log.count("stop");

    h.orchestrator.handle_command(Command::Stop);
    assert_eq!(h.log.count("stop"), stops);
}

#[test]
fn test_prompt_edits_coalesce_through_the_throttle() {
    let mut h = Harness::new(true);
    h.start_playing();
    let before = h.log.count("set_prompts");

    // Three edits inside one window
    for weight in [0.5, 0.8, 1.2] {
        h.orchestrator.handle_command(Command::EditPrompt {
            id: "prompt-0".to_string(),
            text: None,
            weight: Some(weight),
        });
    }
    // Leading edge went out immediately, the rest coalesced
    assert_eq!(h.log.count("set_prompts"), before + 1);

    // Trailing flush carries only the final value
    h.advance_and_tick(Duration::from_millis(200));
    assert_eq!(h.log.count("set_prompts"), before + 2);
    let calls = h.log.calls();
    let last = calls.last().unwrap();
    assert_eq!(last, "set_prompts:Trip Hop,Shoegaze");
}

#[test]
fn test_filtered_prompt_is_excluded_from_sends() {
    let mut h = Harness::new(true);
    h.start_playing();

    h.orchestrator.handle_update(SessionUpdate::FilteredPrompt {
        text: "Trip Hop".to_string(),
        reason: "policy".to_string(),
    });
    // Flush any trailing resend
    h.advance_and_tick(Duration::from_millis(200));
    h.advance_and_tick(Duration::from_millis(200));

    let calls = h.log.calls();
    let last_send = calls
        .iter()
        .rev()
        .find(|c| c.starts_with("set_prompts"))
        .unwrap();
    assert!(!last_send.contains("Trip Hop"));
    assert!(last_send.contains("Shoegaze"));
}

#[test]
fn test_locked_prompt_refuses_removal() {
    let mut h = Harness::new(true);

    h.orchestrator.handle_command(Command::RemovePrompt {
        id: "prompt-1".to_string(),
    });
    assert_eq!(h.orchestrator.prompts().len(), 2);

    h.orchestrator.handle_command(Command::RemovePrompt {
        id: "prompt-0".to_string(),
    });
    assert_eq!(h.orchestrator.prompts().len(), 1);
}

#[test]
fn test_underrun_reenters_loading() {
    let mut h = Harness::new(true);
    h.start_playing();

    // Render well past the first chunk's end so the watermark is behind
    let blocks = 8 * 48_000 / 1024;
    h.pump_engine(blocks);

    // The next chunk lands in the past: the engine flags an underrun
    h.orchestrator
        .handle_update(SessionUpdate::Chunk(vec![0u8; 64]));
    h.pump_engine(1);

    // The orchestrator polls the counter and rebuffers
    h.advance_and_tick(Duration::from_millis(100));
    assert_eq!(h.orchestrator.playback(), PlaybackState::Loading);
}

#[test]
fn test_reset_restores_defaults_and_replays_settings() {
    let mut h = Harness::new(true);
    h.start_playing();

    let mut config = h.orchestrator.config().clone();
    config.temperature = Some(2.0);
    h.orchestrator
        .handle_command(Command::UpdateSettings(Box::new(config)));
    assert_eq!(h.orchestrator.config().temperature, Some(2.0));

    let configs_before = h.log.count("set_config");
    h.orchestrator.handle_command(Command::Reset);
    assert_eq!(h.orchestrator.config().temperature, Some(1.1));
    assert_eq!(h.log.count("reset_context"), 1);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Paused);

    // The replay lands after the deferred delay
    h.advance_and_tick(Duration::from_millis(200));
    assert_eq!(h.log.count("set_config"), configs_before + 1);
}

#[test]
fn test_recording_start_forces_playback() {
    let mut h = Harness::new(true);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Stopped);

    h.orchestrator.handle_command(Command::ToggleRawRecording);
    assert_eq!(h.orchestrator.playback(), PlaybackState::Loading);
    assert_eq!(h.log.count("play"), 1);
}
