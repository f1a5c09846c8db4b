//! driftdj: headless live generative-music client
//!
//! Wires the pieces together: audio system, filler bed, session
//! connection, prompt bootstrap, orchestrator. Runs until the process
//! is killed.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use crossbeam::channel::unbounded;
use log::{info, warn};

use driftdj_core::audio::start_audio_system;
use driftdj_core::config::{default_config_path, load_config, AppConfig};
use driftdj_core::engine::{decode_wav_bed, synthesize_crackle, EngineCommand};

use driftdj_session::client::RemoteSession;
use driftdj_session::orchestrator::{Orchestrator, OrchestratorDeps, SessionFactory};
use driftdj_session::probe::TcpProbe;
use driftdj_session::prompts::{default_prompts, Prompt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use driftdj_session::MusicSession;

/// Seconds of synthesized crackle when no bed file is configured
const CRACKLE_BED_SECONDS: f32 = 8.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = default_config_path();
    let app: AppConfig = load_config(&config_path);
    let state_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let audio = start_audio_system().context("Failed to start the audio system")?;
    let mut command_sender = audio.command_sender;

    // Filler bed: configured file, or a synthesized crackle loop
    if app.filler.enabled {
        let bed = match &app.filler.path {
            Some(path) => decode_wav_bed(path).unwrap_or_else(|e| {
                warn!("Filler bed unusable, synthesizing instead: {}", e);
                synthesize_crackle(CRACKLE_BED_SECONDS)
            }),
            None => synthesize_crackle(CRACKLE_BED_SECONDS),
        };
        let _ = command_sender.send(EngineCommand::SetFillerBuffer(Box::new(bed)));
    }
    let _ = command_sender.send(EngineCommand::ConfigureFiller {
        enabled: app.filler.enabled,
        volume: app.filler.volume,
        looped: app.filler.looped,
    });
    let _ = command_sender.send(EngineCommand::SetMasterVolume {
        volume: app.master_volume,
    });
    let _ = command_sender.send(EngineCommand::SetStabilizerEnabled(app.stabilizer_enabled));
    let _ = command_sender.send(EngineCommand::SetAutoVolume {
        enabled: app.auto_volume.enabled,
        frequency_hz: app.auto_volume.frequency_hz,
        min_level_percent: app.auto_volume.min_level_percent,
    });

    // Session transport
    let (update_tx, update_rx) = unbounded();
    let session = RemoteSession::connect(&app.server_addr, update_tx.clone())
        .with_context(|| format!("Failed to connect to {}", app.server_addr))?;
    let factory_addr = app.server_addr.clone();
    let session_factory: SessionFactory = Box::new(move |tx| {
        RemoteSession::connect(&factory_addr, tx).map(|s| Box::new(s) as Box<dyn MusicSession>)
    });

    // Prompts: stored set, or a fresh bootstrap
    let prompts_path = state_dir.join("prompts.json");
    let prompts = load_prompts(&prompts_path);

    let probe = TcpProbe::new(&app.probe_addr);
    let recordings_dir = dirs::audio_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut orchestrator = Orchestrator::new(OrchestratorDeps {
        clock: Box::new(driftdj_session::SystemClock),
        probe: Box::new(probe),
        session: Box::new(session),
        session_factory,
        update_tx,
        audio: command_sender,
        engine_clock: audio.clock,
        app,
        config_path,
        prompts,
        prompts_path,
        preset_path: state_dir.join("presets.json"),
        recordings_dir,
    });

    orchestrator.sync_session();

    let (command_tx, command_rx) = unbounded();
    let _ = command_tx.send(driftdj_session::Command::PlayPause);
    // The sender stays alive so the loop never sees a closed channel
    let _command_tx = command_tx;

    info!("driftdj running");
    orchestrator.run(command_rx, update_rx);
    Ok(())
}

fn load_prompts(path: &std::path::Path) -> Vec<Prompt> {
    if let Ok(contents) = fs::read_to_string(path) {
        match serde_json::from_str::<Vec<Prompt>>(&contents) {
            Ok(prompts) if !prompts.is_empty() => return prompts,
            Ok(_) => {}
            Err(e) => warn!("Failed to parse stored prompts: {}", e),
        }
    }
    info!("No stored prompts, bootstrapping defaults");
    default_prompts(&mut StdRng::from_entropy())
}
