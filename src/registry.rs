use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::actor::{insert_sorted_by_id, remove_actor, ActorRef, SaveScope};
use crate::behaviors::BehaviorLibrary;
use crate::component::{self, Component};
use crate::config::GameConfig;
use crate::events::EventBus;
use crate::particles::SpriteDraw;
use crate::physics::PhysicsWorld;
use crate::record::{CallbackSet, Phase};
use crate::save::{self, SaveStore};
use crate::scene::{entry_type, SceneFile};
use crate::scripts::{self, ScriptHost, WorldScope};
use crate::templates::TemplateLibrary;

/// Which structural pass is currently running. Removal requests that arrive
/// while the matching primary pass is walking its queue are redirected into
/// the secondary will-remove queues, which become primary when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationGuard {
    #[default]
    Idle,
    ClearingScene,
    RemovingActors,
    TrimmingComponents,
}

/// The whole mutable engine state: every actor index, the libraries, the
/// event bus, physics, and the save store. There are no globals; scripts
/// reach this through the scoped pointer the dispatcher installs.
pub struct World {
    pub root: PathBuf,
    pub game_config: GameConfig,
    pub actors: Vec<ActorRef>,
    named: HashMap<String, Vec<ActorRef>>,
    pub(crate) starting_actors: Vec<ActorRef>,
    pub(crate) updating_actors: Vec<ActorRef>,
    pub(crate) late_updating_actors: Vec<ActorRef>,
    comp_added_actors: Vec<ActorRef>,
    comp_removed_actors: Vec<ActorRef>,
    will_comp_remove_actors: Vec<ActorRef>,
    added_actors: Vec<ActorRef>,
    removed_actors: Vec<ActorRef>,
    will_remove_actors: Vec<ActorRef>,
    retained_actors: Vec<ActorRef>,
    scene_save_actors: Vec<ActorRef>,
    system_save_actors: Vec<ActorRef>,
    guard: MutationGuard,
    pub current_scene: String,
    pub next_scene: Option<String>,
    loading_save: bool,
    next_actor_id: i64,
    // Never reset, so runtime keys are unique per process, not per scene.
    runtime_key_counter: u64,
    pub behaviors: BehaviorLibrary,
    pub templates: TemplateLibrary,
    pub bus: EventBus,
    pub physics: PhysicsWorld,
    pub saves: SaveStore,
    pub sprite_queue: Vec<SpriteDraw>,
    pub frame: u64,
    pub quit_requested: bool,
}

impl World {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let game_config = GameConfig::load(&root.join("resources/game.config"))?;
        let saves = SaveStore::boot(&root)?;
        let next_scene =
            Some(saves.resume_scene().unwrap_or_else(|| game_config.initial_scene.clone()));
        Ok(Self {
            behaviors: BehaviorLibrary::new(&root),
            templates: TemplateLibrary::new(&root),
            root,
            game_config,
            actors: Vec::new(),
            named: HashMap::new(),
            starting_actors: Vec::new(),
            updating_actors: Vec::new(),
            late_updating_actors: Vec::new(),
            comp_added_actors: Vec::new(),
            comp_removed_actors: Vec::new(),
            will_comp_remove_actors: Vec::new(),
            added_actors: Vec::new(),
            removed_actors: Vec::new(),
            will_remove_actors: Vec::new(),
            retained_actors: Vec::new(),
            scene_save_actors: Vec::new(),
            system_save_actors: Vec::new(),
            guard: MutationGuard::default(),
            current_scene: String::new(),
            next_scene,
            loading_save: false,
            next_actor_id: 0,
            runtime_key_counter: 0,
            bus: EventBus::new(),
            physics: PhysicsWorld::new(),
            saves,
            sprite_queue: Vec::new(),
            frame: 0,
            quit_requested: false,
        })
    }

    /// Read-only view of the update roster, mostly useful to embedders and
    /// tests asserting scheduling behavior.
    pub fn update_roster(&self) -> &[ActorRef] {
        &self.updating_actors
    }

    fn alloc_id(&mut self) -> i64 {
        let id = self.next_actor_id;
        self.next_actor_id += 1;
        id
    }

    // ---- lookups ----

    pub fn find(&self, name: &str) -> Option<ActorRef> {
        self.named
            .get(name)
            .and_then(|list| list.iter().find(|a| !a.is_removed()))
            .cloned()
    }

    pub fn find_all(&self, name: &str) -> Vec<ActorRef> {
        self.named
            .get(name)
            .map(|list| list.iter().filter(|a| !a.is_removed()).cloned().collect())
            .unwrap_or_default()
    }

    fn actor_exists(&self, name: &str, id: i64) -> bool {
        self.named
            .get(name)
            .map(|list| list.iter().any(|a| a.id() == id))
            .unwrap_or(false)
    }

    fn index_name(&mut self, actor: &ActorRef) {
        self.named.entry(actor.name()).or_default().push(actor.clone());
    }

    // ---- actor lifecycle ----

    /// Spawns a template. While a scene clear runs, only persistent
    /// templates may spawn; the spawn lands in the retained set and survives
    /// into the incoming scene.
    pub fn instantiate(
        &mut self,
        engine: &rhai::Engine,
        template: &str,
    ) -> Result<Option<ActorRef>> {
        let actor = self.templates.instantiate(engine, &mut self.behaviors, template)?;
        if self.guard == MutationGuard::ClearingScene {
            if !self.templates.is_persistent(template) {
                return Ok(None);
            }
            let id = self.alloc_id();
            actor.0.borrow_mut().id = id;
            self.index_name(&actor);
            insert_sorted_by_id(&mut self.retained_actors, &actor);
            return Ok(Some(actor));
        }
        let id = self.alloc_id();
        actor.0.borrow_mut().id = id;
        self.actors.push(actor.clone());
        self.index_name(&actor);
        insert_sorted_by_id(&mut self.added_actors, &actor);
        Ok(Some(actor))
    }

    /// Marks an actor dead: callbacks stop immediately, name lookups stop
    /// finding it, physical removal waits for the actor flush. Idempotent.
    pub fn destroy(&mut self, actor: &ActorRef) {
        if actor.is_removed() {
            return;
        }
        actor.0.borrow_mut().removed = true;
        actor.disable_all_components();
        if let Some(list) = self.named.get_mut(&actor.name()) {
            list.retain(|a| !a.ptr_eq(actor));
            if list.is_empty() {
                self.named.remove(&actor.name());
            }
        }
        if self.guard == MutationGuard::RemovingActors {
            insert_sorted_by_id(&mut self.will_remove_actors, actor);
        } else {
            insert_sorted_by_id(&mut self.removed_actors, actor);
        }
    }

    pub fn flush_actor_adds(&mut self) {
        let list = std::mem::take(&mut self.added_actors);
        for actor in list {
            if actor.has_phase(Phase::Start) {
                insert_sorted_by_id(&mut self.starting_actors, &actor);
            }
            if actor.has_phase(Phase::Update) {
                insert_sorted_by_id(&mut self.updating_actors, &actor);
            }
            if actor.has_phase(Phase::LateUpdate) {
                insert_sorted_by_id(&mut self.late_updating_actors, &actor);
            }
        }
    }

    pub fn flush_actor_removes(&mut self, scripts: &ScriptHost) {
        self.guard = MutationGuard::RemovingActors;
        let list = std::mem::take(&mut self.removed_actors);
        for actor in &list {
            remove_actor(&mut self.actors, actor);
            remove_actor(&mut self.starting_actors, actor);
            remove_actor(&mut self.updating_actors, actor);
            remove_actor(&mut self.late_updating_actors, actor);
            remove_actor(&mut self.added_actors, actor);
            remove_actor(&mut self.comp_added_actors, actor);
            remove_actor(&mut self.comp_removed_actors, actor);
            remove_actor(&mut self.scene_save_actors, actor);
            remove_actor(&mut self.system_save_actors, actor);
            self.finalize_actor(scripts, actor);
        }
        self.guard = MutationGuard::Idle;
        self.removed_actors = std::mem::take(&mut self.will_remove_actors);
    }

    /// Fires destroy callbacks, releases native payloads, and clears bus
    /// subscriptions for every component the actor still holds.
    fn finalize_actor(&mut self, scripts: &ScriptHost, actor: &ActorRef) {
        for component in actor.phase_components(Phase::Destroy) {
            if component.is_record() {
                let _scope = WorldScope::enter(self);
                if let Err(err) =
                    scripts.invoke_callback(&component, Phase::Destroy.callback_name(), Vec::new())
                {
                    scripts::report_callback_error(&component.owner_name(), &err);
                }
            }
        }
        for component in actor.all_components() {
            self.bus.purge_component(&component);
            component.with_body(|body| self.physics.detach_body(body));
        }
        for component in actor.take_pending_adds() {
            self.bus.purge_component(&component);
        }
    }

    // ---- component lifecycle ----

    /// Builds a component of the named type and queues it on the actor. It
    /// joins the indices at the next component add flush; until then lookups
    /// cannot see it.
    pub fn request_add_component(
        &mut self,
        engine: &rhai::Engine,
        actor: &ActorRef,
        type_name: &str,
    ) -> Result<Option<Component>> {
        if actor.is_removed() {
            return Ok(None);
        }
        if self.guard == MutationGuard::ClearingScene && !actor.is_persistent() {
            return Ok(None);
        }
        let key = format!("r{}", self.runtime_key_counter);
        self.runtime_key_counter += 1;
        let component =
            Component::build(engine, &mut self.behaviors, actor.downgrade(), type_name, &key)?;
        actor.queue_add(&component);
        insert_sorted_by_id(&mut self.comp_added_actors, actor);
        Ok(Some(component))
    }

    /// Marks a component removed and queues the trim. Repeat requests are
    /// no-ops: the pending queue holds one entry and the destroy callback
    /// will fire once.
    pub fn request_remove_component(&mut self, actor: &ActorRef, component: &Component) {
        if component.is_removed() {
            return;
        }
        component.mark_removed();
        if actor.pending_add_contains(component) {
            // Never attached; the add flush drops it without a trim pass.
            return;
        }
        if self.guard == MutationGuard::TrimmingComponents {
            actor.queue_will_remove(component);
            insert_sorted_by_id(&mut self.will_comp_remove_actors, actor);
        } else {
            actor.queue_remove(component);
            insert_sorted_by_id(&mut self.comp_removed_actors, actor);
        }
    }

    pub fn flush_component_adds(&mut self) {
        let list = std::mem::take(&mut self.comp_added_actors);
        for actor in list {
            for component in actor.take_pending_adds() {
                if !component.is_removed() {
                    actor.attach_live(&component);
                }
            }
            let pending_actor = self.added_actors.iter().any(|a| a.ptr_eq(&actor));
            if !pending_actor {
                if actor.has_phase(Phase::Start) {
                    insert_sorted_by_id(&mut self.starting_actors, &actor);
                }
                if actor.has_phase(Phase::Update) {
                    insert_sorted_by_id(&mut self.updating_actors, &actor);
                }
                if actor.has_phase(Phase::LateUpdate) {
                    insert_sorted_by_id(&mut self.late_updating_actors, &actor);
                }
            }
        }
    }

    pub fn flush_component_removes(&mut self, scripts: &ScriptHost) {
        self.guard = MutationGuard::TrimmingComponents;
        let list = std::mem::take(&mut self.comp_removed_actors);
        for actor in &list {
            for component in actor.take_pending_removes() {
                self.trim_component(scripts, actor, &component);
            }
        }
        self.guard = MutationGuard::Idle;
        let promoted = std::mem::take(&mut self.will_comp_remove_actors);
        for actor in &promoted {
            actor.promote_will_removes();
        }
        self.comp_removed_actors = promoted;
    }

    fn trim_component(&mut self, scripts: &ScriptHost, actor: &ActorRef, component: &Component) {
        actor.detach(component);
        self.bus.purge_component(component);
        if component.is_record() {
            if component.callbacks().contains(CallbackSet::DESTROY) {
                let _scope = WorldScope::enter(self);
                if let Err(err) =
                    scripts.invoke_callback(component, Phase::Destroy.callback_name(), Vec::new())
                {
                    scripts::report_callback_error(&component.owner_name(), &err);
                }
            }
        } else {
            component.with_body(|body| self.physics.detach_body(body));
        }
    }

    // ---- persistence scopes ----

    pub fn set_save_scope(&mut self, actor: &ActorRef, scope: SaveScope) {
        remove_actor(&mut self.scene_save_actors, actor);
        remove_actor(&mut self.system_save_actors, actor);
        actor.0.borrow_mut().save_scope = scope;
        match scope {
            SaveScope::SceneScoped => self.scene_save_actors.push(actor.clone()),
            SaveScope::CrossScene => self.system_save_actors.push(actor.clone()),
            SaveScope::None => {}
        }
    }

    pub fn save_to_slot(&mut self, index: i32) -> Result<()> {
        if !self.saves.slot_in_range(index) {
            eprintln!("error: saving to an invalid slot index {index}");
            return Ok(());
        }
        self.saves.snapshot_scene(&self.current_scene, &self.scene_save_actors)?;
        self.saves.snapshot_system(&self.current_scene, &self.system_save_actors)?;
        self.saves.commit_slot(index)?;
        println!("saved {} to slot {index}", self.current_scene);
        Ok(())
    }

    /// Points the runtime at a slot's recorded scene (or the configured
    /// initial scene when the slot is empty) and flags the pending load as a
    /// save-load, which forces a full clear.
    pub fn load_slot(&mut self, index: i32) -> Result<()> {
        if !self.saves.slot_in_range(index) {
            eprintln!("error: loading an invalid slot index {index}");
            return Ok(());
        }
        self.saves.config.last_index_accessed = index;
        self.saves.persist_config()?;
        let next = self
            .saves
            .slot_last_scene(index)
            .unwrap_or_else(|| self.game_config.initial_scene.clone());
        self.saves.clear_staging()?;
        self.next_scene = Some(next);
        self.loading_save = true;
        Ok(())
    }

    // ---- scene loading ----

    pub fn load_scene(&mut self, scripts: &ScriptHost, name: &str) -> Result<()> {
        if name == "system" {
            anyhow::bail!("scene name \"system\" is reserved");
        }
        let path = self.root.join("resources/scenes").join(format!("{name}.scene"));
        if !path.exists() {
            anyhow::bail!("scene {name} is missing ({})", path.display());
        }
        let file = SceneFile::load_from_path(&path)?;

        if !self.loading_save && !self.current_scene.is_empty() {
            let current = self.current_scene.clone();
            let scoped = self.scene_save_actors.clone();
            self.saves.snapshot_scene(&current, &scoped)?;
        }

        // Clearing pass. Persistent actors survive unless a save-load forces
        // a full clear; everything else gets its destroy callbacks and goes.
        self.guard = MutationGuard::ClearingScene;
        let prior = std::mem::take(&mut self.actors);
        let mut kept = Vec::new();
        for actor in prior {
            if actor.is_persistent() && !self.loading_save && !actor.is_removed() {
                kept.push(actor);
            } else {
                self.finalize_actor(scripts, &actor);
            }
        }
        self.guard = MutationGuard::Idle;
        // Spawns that happened inside the destroy callbacks.
        kept.extend(std::mem::take(&mut self.retained_actors));

        self.named.clear();
        self.starting_actors.clear();
        self.updating_actors.clear();
        self.late_updating_actors.clear();
        self.comp_added_actors.clear();
        self.comp_removed_actors.clear();
        self.will_comp_remove_actors.clear();
        self.added_actors.clear();
        // Destroys issued inside the clearing callbacks target kept actors;
        // their entries carry over so the next actor flush honors them.
        self.removed_actors.retain(|a| kept.iter().any(|k| k.ptr_eq(a)));
        self.will_remove_actors.clear();
        self.scene_save_actors.clear();
        self.system_save_actors.clear();

        for actor in &kept {
            if actor.is_removed() {
                continue;
            }
            self.named.entry(actor.name()).or_default().push(actor.clone());
            if actor.has_phase(Phase::Start) {
                insert_sorted_by_id(&mut self.starting_actors, actor);
            }
            if actor.has_phase(Phase::Update) {
                insert_sorted_by_id(&mut self.updating_actors, actor);
            }
            if actor.has_phase(Phase::LateUpdate) {
                insert_sorted_by_id(&mut self.late_updating_actors, actor);
            }
            if actor.save_scope() == SaveScope::CrossScene {
                self.system_save_actors.push(actor.clone());
            }
            // Deferred component work queued on a kept actor (a clearing
            // callback adding to or removing from a persistent actor) keeps
            // its place in the flush schedules.
            if actor.has_pending_adds() {
                insert_sorted_by_id(&mut self.comp_added_actors, actor);
            }
            if actor.has_pending_removes() {
                insert_sorted_by_id(&mut self.comp_removed_actors, actor);
            }
            if actor.has_will_removes() {
                insert_sorted_by_id(&mut self.will_comp_remove_actors, actor);
            }
        }
        self.actors = kept;

        self.loading_save = false;
        self.current_scene = name.to_string();
        self.next_scene = None;
        self.next_actor_id = 0;

        for entry in &file.actors {
            let actor = match &entry.template {
                Some(template) => {
                    self.templates.instantiate(&scripts.engine, &mut self.behaviors, template)?
                }
                None => ActorRef::new(-1, ""),
            };
            if let Some(actor_name) = &entry.name {
                actor.0.borrow_mut().name = actor_name.clone();
            }
            let id = self.alloc_id();
            actor.0.borrow_mut().id = id;
            if self.actor_exists(&actor.name(), id) {
                continue;
            }
            for (key, value) in &entry.components {
                if let Some(existing) = actor.component_by_key(key) {
                    if let Some(overrides) = value.as_object() {
                        component::apply_json_overrides(&existing, overrides);
                    }
                } else if let Some(type_name) = entry_type(value) {
                    let instance = Component::build(
                        &scripts.engine,
                        &mut self.behaviors,
                        actor.downgrade(),
                        type_name,
                        key,
                    )?;
                    if let Some(overrides) = value.as_object() {
                        component::apply_json_overrides(&instance, overrides);
                    }
                    actor.attach_live(&instance);
                }
            }
            self.actors.push(actor.clone());
            self.index_name(&actor);
            if actor.has_phase(Phase::Start) {
                insert_sorted_by_id(&mut self.starting_actors, &actor);
            }
            if actor.has_phase(Phase::Update) {
                insert_sorted_by_id(&mut self.updating_actors, &actor);
            }
            if actor.has_phase(Phase::LateUpdate) {
                insert_sorted_by_id(&mut self.late_updating_actors, &actor);
            }
        }

        self.restore_scene_state()?;
        self.restore_system_state(scripts)?;
        Ok(())
    }

    fn restore_scene_state(&mut self) -> Result<()> {
        let scene = self.current_scene.clone();
        for path in self.saves.scene_restore_paths(&scene) {
            let Some(doc) = save::read_doc(&path)? else { continue };
            self.merge_doc(&doc, false, None)?;
        }
        Ok(())
    }

    fn restore_system_state(&mut self, scripts: &ScriptHost) -> Result<()> {
        for path in self.saves.system_restore_paths() {
            let Some(doc) = save::read_doc(&path)? else { continue };
            self.merge_doc(&doc, true, Some(scripts))?;
        }
        Ok(())
    }

    /// Merges one persisted document into the live scene. Matching is by
    /// actor name, id, and component key. Unmatched cross-scene records
    /// materialize phantom actors rebuilt from the persisted `type` field.
    fn merge_doc(
        &mut self,
        doc: &save::SaveDoc,
        cross_scene: bool,
        scripts: Option<&ScriptHost>,
    ) -> Result<()> {
        for (actor_name, ids) in doc {
            let Some(ids) = ids.as_object() else {
                // The system file's `last_scene` marker, not actor state.
                continue;
            };
            for (id_text, components) in ids {
                let Some(components) = components.as_object() else { continue };
                let Ok(id) = id_text.parse::<i64>() else { continue };
                let matched = self
                    .named
                    .get(actor_name)
                    .and_then(|list| list.iter().find(|a| a.id() == id))
                    .cloned();
                match matched {
                    Some(actor) => {
                        for (key, snapshot) in components {
                            let Some(snapshot) = snapshot.as_str() else { continue };
                            if let Some(live) = actor.component_by_key(key) {
                                save::apply_snapshot(&live, snapshot).with_context(|| {
                                    format!("restoring {actor_name}/{id_text}/{key}")
                                })?;
                            }
                        }
                        // Only the system path re-enrolls the actor; a
                        // restored scene-scoped actor persists again only if
                        // a script opts back in.
                        if cross_scene {
                            self.set_save_scope(&actor, SaveScope::CrossScene);
                        }
                    }
                    None if cross_scene => {
                        let scripts = scripts.context("system restore needs the script host")?;
                        let actor =
                            self.materialize_phantom(scripts, actor_name, id, components)?;
                        self.set_save_scope(&actor, SaveScope::CrossScene);
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    /// Rebuilds an actor that only exists in the cross-scene save: each
    /// component is rebuilt from its persisted `type`, so phase membership
    /// comes back through the prototype cache.
    fn materialize_phantom(
        &mut self,
        scripts: &ScriptHost,
        name: &str,
        id: i64,
        components: &save::SaveDoc,
    ) -> Result<ActorRef> {
        let actor = ActorRef::new(id, name);
        actor.0.borrow_mut().dont_destroy_on_load = true;
        for (key, snapshot) in components {
            let Some(snapshot) = snapshot.as_str() else { continue };
            let fields: save::SaveDoc = serde_json::from_str(snapshot)
                .with_context(|| format!("malformed snapshot for {name}/{key}"))?;
            let Some(type_name) = fields.get("type").and_then(|v| v.as_str()) else {
                continue;
            };
            let component = Component::build(
                &scripts.engine,
                &mut self.behaviors,
                actor.downgrade(),
                type_name,
                key,
            )?;
            save::apply_snapshot(&component, snapshot)?;
            actor.attach_live(&component);
        }
        self.actors.push(actor.clone());
        self.index_name(&actor);
        if actor.has_phase(Phase::Start) {
            insert_sorted_by_id(&mut self.starting_actors, &actor);
        }
        if actor.has_phase(Phase::Update) {
            insert_sorted_by_id(&mut self.updating_actors, &actor);
        }
        if actor.has_phase(Phase::LateUpdate) {
            insert_sorted_by_id(&mut self.late_updating_actors, &actor);
        }
        Ok(actor)
    }
}
