//! Locally persisted application settings
//!
//! Everything here survives restarts: master volume, the stabilizer
//! toggle, the silence-filler bed, auto-volume, and the endpoints used
//! for the session and the reachability probe.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Silence-filler bed settings
///
/// A looped background recording (vinyl crackle by default) mixed under
/// the stream whenever playback is active, so buffering gaps never go
/// fully silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    pub enabled: bool,
    /// Linear gain of the bed, 0.0..=1.0
    pub volume: f32,
    /// Restart the bed from the top when it runs out
    pub looped: bool,
    /// WAV file to decode for the bed; None uses the built-in crackle
    pub path: Option<PathBuf>,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.25,
            looped: true,
            path: None,
        }
    }
}

/// Slow sinusoidal master-volume modulation
///
/// Sweeps the master gain between `min_level_percent` and 100% of the
/// user volume on a period of `1 / frequency_hz` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoVolumeConfig {
    pub enabled: bool,
    /// Cycle frequency in Hz; the default is one cycle per 8 minutes
    pub frequency_hz: f64,
    /// Bottom of the sweep as a percentage of the user volume
    pub min_level_percent: f64,
}

impl Default for AutoVolumeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency_hz: 1.0 / (8.0 * 60.0),
            min_level_percent: 60.0,
        }
    }
}

/// Application settings persisted as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// User master volume, linear 0.0..=1.0
    pub master_volume: f32,
    /// Drop-behind-realtime stabilization of incoming chunks
    pub stabilizer_enabled: bool,
    /// Automatically restart playback after errors and watchdog trips
    pub continuous_playback: bool,
    pub filler: FillerConfig,
    pub auto_volume: AutoVolumeConfig,
    /// Generation service endpoint, host:port
    pub server_addr: String,
    /// Endpoint probed to distinguish network loss from server loss
    pub probe_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            stabilizer_enabled: true,
            continuous_playback: false,
            filler: FillerConfig::default(),
            auto_volume: AutoVolumeConfig::default(),
            server_addr: "127.0.0.1:9670".to_string(),
            probe_addr: "1.1.1.1:443".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, save_config};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.master_volume, 1.0);
        assert!(config.stabilizer_enabled);
        assert!(config.filler.enabled);
        assert_eq!(config.filler.volume, 0.25);
        assert!(!config.auto_volume.enabled);
        assert!((config.auto_volume.frequency_hz - 1.0 / 480.0).abs() < 1e-12);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = AppConfig {
            master_volume: 0.8,
            continuous_playback: true,
            ..Default::default()
        };
        save_config(&config, &path).unwrap();
        let loaded: AppConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "master_volume: 0.5\n").unwrap();

        let loaded: AppConfig = load_config(&path);
        assert_eq!(loaded.master_volume, 0.5);
        assert!(loaded.filler.enabled);
    }
}
