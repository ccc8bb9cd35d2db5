use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// `resources/game.config`. The initial scene is the one thing a game cannot
/// run without; everything else has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    #[serde(default = "GameConfig::default_title")]
    pub game_title: String,
    pub initial_scene: String,
}

impl GameConfig {
    fn default_title() -> String {
        "Osprey Game".to_string()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read game config {}", path.display()))?;
        let config: GameConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse game config {}", path.display()))?;
        Ok(config)
    }
}

/// `resources/save.config`. Created with defaults on first boot and rewritten
/// on shutdown so the next session resumes from the last slot touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    #[serde(default = "SaveConfig::default_slots")]
    pub num_save_index: i32,
    #[serde(default)]
    pub last_index_accessed: i32,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self { num_save_index: Self::default_slots(), last_index_accessed: 0 }
    }
}

impl SaveConfig {
    fn default_slots() -> i32 {
        3
    }

    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read save config {}", path.display()))?;
            let config: SaveConfig = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse save config {}", path.display()))?;
            Ok(config)
        } else {
            let config = SaveConfig::default();
            config.store(path)?;
            Ok(config)
        }
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("failed to encode save config")?;
        fs::write(path, text)
            .with_context(|| format!("failed to write save config {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_config_created_with_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("resources/save.config");
        let config = SaveConfig::load_or_create(&path).expect("create default save config");
        assert_eq!(config.num_save_index, 3);
        assert_eq!(config.last_index_accessed, 0);
        assert!(path.exists());
    }

    #[test]
    fn game_config_requires_initial_scene() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("game.config");
        std::fs::write(&path, r#"{"game_title":"Demo"}"#).expect("write config");
        assert!(GameConfig::load(&path).is_err());
    }
}
