//! Preset store
//!
//! A preset snapshots the full creative state: prompts, generation
//! settings, and the auto-density/auto-brightness flags. Presets live
//! in a JSON file next to the app config and round-trip through
//! export/import, where import is deliberately forgiving: each object
//! is validated on its own, invalid ones are skipped and counted, and a
//! valid object missing its id gets a generated one.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use driftdj_core::config::GenerationConfig;

use crate::prompts::Prompt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub prompts: Vec<Prompt>,
    pub settings: GenerationConfig,
    pub auto_density: bool,
    pub auto_brightness: bool,
}

/// Result of an import: how many objects landed, how many were skipped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub errors: usize,
}

pub struct PresetStore {
    path: PathBuf,
    presets: Vec<Preset>,
}

impl PresetStore {
    /// Load the store; a missing or unreadable file yields an empty one
    pub fn load(path: &Path) -> Self {
        let presets = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<Preset>>(&contents) {
                Ok(presets) => presets,
                Err(e) => {
                    warn!("Failed to parse preset file {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path: path.to_path_buf(),
            presets,
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.presets)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn list(&self) -> &[Preset] {
        &self.presets
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// Insert or replace by id
    pub fn upsert(&mut self, preset: Preset) {
        match self.presets.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.presets.len();
        self.presets.retain(|p| p.id != id);
        self.presets.len() != before
    }

    /// Export one preset as pretty JSON with a filesystem-safe filename
    pub fn export(&self, id: &str) -> Option<(String, String)> {
        let preset = self.get(id)?;
        let json = serde_json::to_string_pretty(preset).ok()?;
        Some((export_filename(&preset.name), json))
    }

    /// Import one preset object or an array of them
    ///
    /// Partial corruption never aborts the import: every valid object
    /// is taken, every invalid one is counted and skipped.
    pub fn import(&mut self, json: &str) -> ImportOutcome {
        let value: Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => {
                warn!("Preset import is not valid JSON: {}", e);
                return ImportOutcome {
                    imported: 0,
                    errors: 1,
                };
            }
        };

        let candidates: Vec<Value> = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        let mut outcome = ImportOutcome::default();
        for candidate in candidates {
            match parse_preset(candidate) {
                Some(preset) => {
                    self.upsert(preset);
                    outcome.imported += 1;
                }
                None => outcome.errors += 1,
            }
        }
        info!(
            "Preset import: {} imported, {} skipped",
            outcome.imported, outcome.errors
        );
        outcome
    }
}

/// Validate one candidate object and repair what is repairable
///
/// Required: `name` string, `prompts` array of valid prompt objects,
/// `settings` object, `autoDensity`/`autoBrightness` bools. A missing
/// id is generated; a missing prompt id likewise.
fn parse_preset(mut value: Value) -> Option<Preset> {
    let obj = value.as_object_mut()?;

    if !obj.get("name").map_or(false, Value::is_string) {
        return None;
    }
    if !obj.get("settings").map_or(false, Value::is_object) {
        return None;
    }
    if !obj.get("autoDensity").map_or(false, Value::is_boolean) {
        return None;
    }
    if !obj.get("autoBrightness").map_or(false, Value::is_boolean) {
        return None;
    }

    {
        let prompts = obj.get_mut("prompts")?.as_array_mut()?;
        for (i, prompt) in prompts.iter_mut().enumerate() {
            let p = prompt.as_object_mut()?;
            if !p.get("text").map_or(false, Value::is_string) {
                return None;
            }
            if !p.get("weight").map_or(false, Value::is_number) {
                return None;
            }
            if !p.get("color").map_or(false, Value::is_string) {
                return None;
            }
            if !p.get("promptId").map_or(false, Value::is_string) {
                p.insert("promptId".to_string(), Value::from(format!("prompt-{}", i)));
            }
        }
    }

    if !obj.get("id").map_or(false, Value::is_string) {
        obj.insert("id".to_string(), Value::from(generate_id()));
    }

    serde_json::from_value(value).ok()
}

pub(crate) fn generate_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("preset-{:x}", nanos)
}

/// Lowercased name with everything non-alphanumeric squashed to '-'
fn export_filename(name: &str) -> String {
    let mut sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while sanitized.contains("--") {
        sanitized = sanitized.replace("--", "-");
    }
    format!("{}.json", sanitized.trim_matches('-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_preset(id: &str) -> Preset {
        Preset {
            id: id.to_string(),
            name: "Late Night".to_string(),
            prompts: vec![Prompt {
                prompt_id: "prompt-0".to_string(),
                text: "Trip Hop".to_string(),
                weight: 1.0,
                color: "#9900ff".to_string(),
                locked: false,
            }],
            settings: GenerationConfig::defaults(),
            auto_density: true,
            auto_brightness: false,
        }
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");

        let mut store = PresetStore::load(&path);
        store.upsert(sample_preset("a"));
        store.save().unwrap();

        let reloaded = PresetStore::load(&path);
        assert_eq!(reloaded.list(), store.list());
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::load(&dir.path().join("nope.json"));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_import_counts_valid_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PresetStore::load(&dir.path().join("presets.json"));

        let valid = serde_json::to_value(sample_preset("a")).unwrap();
        let invalid = serde_json::json!({ "name": "broken", "prompts": "not-an-array" });
        let json = serde_json::to_string(&vec![valid, invalid]).unwrap();

        let outcome = store.import(&json);
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.errors, 1);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_import_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PresetStore::load(&dir.path().join("presets.json"));

        let json = serde_json::to_string(&sample_preset("solo")).unwrap();
        let outcome = store.import(&json);
        assert_eq!(outcome.imported, 1);
        assert!(store.get("solo").is_some());
    }

    #[test]
    fn test_import_generates_missing_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PresetStore::load(&dir.path().join("presets.json"));

        let mut value = serde_json::to_value(sample_preset("x")).unwrap();
        value.as_object_mut().unwrap().remove("id");

        let outcome = store.import(&value.to_string());
        assert_eq!(outcome.imported, 1);
        assert!(store.list()[0].id.starts_with("preset-"));
    }

    #[test]
    fn test_import_garbage_is_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PresetStore::load(&dir.path().join("presets.json"));

        let outcome = store.import("{ not json");
        assert_eq!(outcome.imported, 0);
        assert_eq!(outcome.errors, 1);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PresetStore::load(&dir.path().join("presets.json"));

        store.upsert(sample_preset("a"));
        let mut updated = sample_preset("a");
        updated.name = "Renamed".to_string();
        store.upsert(updated);

        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get("a").unwrap().name, "Renamed");
    }

    #[test]
    fn test_export_filename_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PresetStore::load(&dir.path().join("presets.json"));
        let mut preset = sample_preset("a");
        preset.name = "My Wild!! Preset".to_string();
        store.upsert(preset);

        let (filename, json) = store.export("a").unwrap();
        assert_eq!(filename, "my-wild-preset.json");
        assert!(json.contains("\"Trip Hop\""));
    }
}
