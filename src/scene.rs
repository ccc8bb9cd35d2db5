use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// A `.scene` definition file: a flat list of actors to spawn, in file order.
#[derive(Debug, Default, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub actors: Vec<ActorEntry>,
}

/// One actor entry. `components` maps component key to an object holding an
/// optional `type` plus flat field overrides.
#[derive(Debug, Default, Deserialize)]
pub struct ActorEntry {
    pub name: Option<String>,
    pub template: Option<String>,
    #[serde(default)]
    pub components: serde_json::Map<String, serde_json::Value>,
}

/// A `.template` definition file: a reusable actor blueprint.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateFile {
    pub name: Option<String>,
    #[serde(default)]
    pub dont_destroy_on_load: bool,
    #[serde(default)]
    pub components: serde_json::Map<String, serde_json::Value>,
}

impl SceneFile {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read scene {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse scene {}", path.display()))
    }
}

impl TemplateFile {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read template {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse template {}", path.display()))
    }
}

/// Pulls the component's declared type out of an entry's override object.
pub fn entry_type(entry: &serde_json::Value) -> Option<&str> {
    entry.as_object()?.get("type")?.as_str()
}
