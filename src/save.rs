use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::actor::ActorRef;
use crate::component::{Component, Payload};
use crate::config::SaveConfig;
use crate::record;

pub type SaveDoc = serde_json::Map<String, serde_json::Value>;

/// Serializes a component's visible state to a JSON string: `type` and
/// `enabled` plus the payload fields. `key`, `removed`, and the owner handle
/// never persist; values the converter cannot express drop silently.
pub fn component_snapshot(component: &Component) -> String {
    let mut doc = SaveDoc::new();
    doc.insert("type".to_string(), serde_json::Value::String(component.type_name()));
    doc.insert("enabled".to_string(), serde_json::Value::Bool(component.enabled()));
    match &component.0.borrow().payload {
        Payload::Record(table) => {
            for (name, value) in table.own_fields() {
                if let Some(converted) = record::dynamic_to_json(value) {
                    doc.insert(name.to_string(), converted);
                }
            }
        }
        Payload::Body(_) | Payload::Emitter(_) => {
            for name in native_field_names(component) {
                let value = component.get_field(name);
                if let Some(converted) = record::dynamic_to_json(&value) {
                    doc.insert(name.to_string(), converted);
                }
            }
        }
    }
    serde_json::Value::Object(doc).to_string()
}

fn native_field_names(component: &Component) -> &'static [&'static str] {
    match &component.0.borrow().payload {
        Payload::Body(_) => crate::physics::PhysicsBody::FIELD_NAMES,
        Payload::Emitter(_) => crate::particles::ParticleEmitter::FIELD_NAMES,
        Payload::Record(_) => &[],
    }
}

/// Merges a persisted snapshot string back into a live component. Structural
/// names route through the component's write rules, so `enabled` applies and
/// `type` is a no-op.
pub fn apply_snapshot(component: &Component, data: &str) -> Result<()> {
    let doc: SaveDoc =
        serde_json::from_str(data).context("malformed component snapshot")?;
    for (name, value) in &doc {
        if let Some(converted) = record::json_to_dynamic(value) {
            component.set_field(name, converted);
        }
    }
    Ok(())
}

/// Reads a save document; absence is `None`, malformed content is an error.
pub fn read_doc(path: &Path) -> Result<Option<SaveDoc>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read save file {}", path.display()))?;
    let doc: SaveDoc = serde_json::from_str(&text)
        .with_context(|| format!("malformed save file {}", path.display()))?;
    Ok(Some(doc))
}

fn write_doc(path: &Path, doc: &SaveDoc) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = serde_json::Value::Object(doc.clone()).to_string();
    fs::write(path, text).with_context(|| format!("failed to write save file {}", path.display()))
}

/// Numbered save slots plus the staging directory new snapshots accumulate
/// into. A slot commit copies the whole staging tree over the slot, so a
/// slot is always a consistent set of files.
pub struct SaveStore {
    root: PathBuf,
    pub config: SaveConfig,
}

impl SaveStore {
    pub fn boot(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = SaveConfig::load_or_create(&root.join("resources/save.config"))?;
        let store = Self { root, config };
        fs::create_dir_all(store.staging_dir())
            .with_context(|| format!("failed to create {}", store.staging_dir().display()))?;
        Ok(store)
    }

    fn saves_dir(&self) -> PathBuf {
        self.root.join("saves")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.saves_dir().join("temp")
    }

    pub fn slot_dir(&self, index: i32) -> PathBuf {
        self.saves_dir().join(index.to_string())
    }

    pub fn slot_in_range(&self, index: i32) -> bool {
        index >= 1 && index <= self.config.num_save_index
    }

    /// Scene the last-touched slot would resume into, if one was recorded.
    pub fn resume_scene(&self) -> Option<String> {
        self.slot_last_scene(self.config.last_index_accessed)
    }

    pub fn slot_last_scene(&self, index: i32) -> Option<String> {
        let doc = read_doc(&self.slot_dir(index).join("system.save")).ok()??;
        doc.get("last_scene").and_then(|v| v.as_str()).map(str::to_string)
    }

    /// Accumulates scene-scoped actor state into the staging scene file.
    /// Only non-persistent actors belong here; a persistent actor logs a
    /// scope warning and its state is voided for the pass.
    pub fn snapshot_scene(&self, scene: &str, actors: &[ActorRef]) -> Result<()> {
        let path = self.staging_dir().join(format!("{scene}.save"));
        let mut doc = read_doc(&path)?.unwrap_or_default();
        for actor in actors {
            if actor.is_removed() {
                continue;
            }
            if actor.is_persistent() {
                eprintln!(
                    "warning: actor {} is marked persistent but scene-scope saved; state voided",
                    actor.name()
                );
                continue;
            }
            merge_actor(&mut doc, actor);
        }
        write_doc(&path, &doc)
    }

    /// Accumulates cross-scene actor state into the staging system file and
    /// records the scene to resume into.
    pub fn snapshot_system(&self, scene: &str, actors: &[ActorRef]) -> Result<()> {
        let path = self.staging_dir().join("system.save");
        let mut doc = read_doc(&path)?.unwrap_or_default();
        for actor in actors {
            if actor.is_removed() {
                continue;
            }
            if !actor.is_persistent() {
                eprintln!(
                    "warning: actor {} is not persistent but cross-scene saved; state voided",
                    actor.name()
                );
                continue;
            }
            merge_actor(&mut doc, actor);
        }
        doc.insert("last_scene".to_string(), serde_json::Value::String(scene.to_string()));
        write_doc(&path, &doc)
    }

    /// Copies the staging tree over the slot and clears staging. The caller
    /// has already validated the index.
    pub fn commit_slot(&mut self, index: i32) -> Result<()> {
        let slot = self.slot_dir(index);
        if slot.exists() {
            fs::remove_dir_all(&slot)
                .with_context(|| format!("failed to clear slot {}", slot.display()))?;
        }
        fs::create_dir_all(&slot)
            .with_context(|| format!("failed to create slot {}", slot.display()))?;
        for entry in fs::read_dir(self.staging_dir())
            .with_context(|| format!("failed to list {}", self.staging_dir().display()))?
        {
            let entry = entry.context("failed to read staging entry")?;
            fs::copy(entry.path(), slot.join(entry.file_name()))
                .with_context(|| format!("failed to copy {}", entry.path().display()))?;
        }
        self.clear_staging()?;
        self.config.last_index_accessed = index;
        self.persist_config()
    }

    pub fn clear_staging(&self) -> Result<()> {
        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("failed to clear {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create {}", staging.display()))?;
        Ok(())
    }

    pub fn persist_config(&self) -> Result<()> {
        self.config.store(&self.root.join("resources/save.config"))
    }

    /// Restore order: committed slot first, then staging overlays anything
    /// accumulated since the last commit.
    pub fn scene_restore_paths(&self, scene: &str) -> [PathBuf; 2] {
        [
            self.slot_dir(self.config.last_index_accessed).join(format!("{scene}.save")),
            self.staging_dir().join(format!("{scene}.save")),
        ]
    }

    pub fn system_restore_paths(&self) -> [PathBuf; 2] {
        [
            self.slot_dir(self.config.last_index_accessed).join("system.save"),
            self.staging_dir().join("system.save"),
        ]
    }
}

fn merge_actor(doc: &mut SaveDoc, actor: &ActorRef) {
    let by_name = doc
        .entry(actor.name())
        .or_insert_with(|| serde_json::Value::Object(SaveDoc::new()));
    let Some(by_name) = by_name.as_object_mut() else { return };
    let by_id = by_name
        .entry(actor.id().to_string())
        .or_insert_with(|| serde_json::Value::Object(SaveDoc::new()));
    let Some(by_id) = by_id.as_object_mut() else { return };
    for component in actor.all_components() {
        if component.is_removed() {
            continue;
        }
        by_id.insert(
            component.key(),
            serde_json::Value::String(component_snapshot(&component)),
        );
    }
}
