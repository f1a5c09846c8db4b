//! Config persistence
//!
//! YAML load/save for any serializable settings type. Loading never
//! fails: a missing or unreadable file yields the defaults so a broken
//! config can't keep the client from starting.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default path for the persisted application config
///
/// `$XDG_CONFIG_HOME/driftdj/config.yaml` on Linux; the platform config
/// directory elsewhere. Falls back to the current directory if no config
/// directory can be determined.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("driftdj")
        .join("config.yaml")
}

/// Load settings from a YAML file, falling back to defaults
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        info!("No config at {:?}, starting with defaults", path);
        return T::default();
    }
    match read_yaml(path) {
        Ok(config) => {
            info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            warn!("Config at {:?} unusable ({:#}), using defaults", path, e);
            T::default()
        }
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).context("read failed")?;
    serde_yaml::from_str(&contents).context("parse failed")
}

/// Write settings as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config {:?}", path))?;
    info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        value: i32,
        name: String,
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: TestConfig = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_load_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "value: [not an int").unwrap();

        let config: TestConfig = load_config(&path);
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-config.yaml");

        let config = TestConfig {
            value: 42,
            name: "test".to_string(),
        };

        save_config(&config, &path).unwrap();
        let loaded: TestConfig = load_config(&path);

        assert_eq!(loaded.value, 42);
        assert_eq!(loaded.name, "test");
    }
}
