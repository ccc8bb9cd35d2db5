use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::actor::ActorRef;
use crate::behaviors::BehaviorLibrary;
use crate::component::{self, Component};
use crate::scene::{entry_type, TemplateFile};

/// Parses and caches actor templates. The cached blueprint is a fully built
/// actor (components attached, overrides applied); instantiation deep-copies
/// it so spawned actors never alias blueprint state.
pub struct TemplateLibrary {
    root: PathBuf,
    cache: HashMap<String, ActorRef>,
}

impl TemplateLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), cache: HashMap::new() }
    }

    /// Whether a template is flagged cross-scene-persistent. Only meaningful
    /// for templates already pulled into the cache; unknown names read false.
    pub fn is_persistent(&self, name: &str) -> bool {
        self.cache.get(name).map(|blueprint| blueprint.is_persistent()).unwrap_or(false)
    }

    pub fn instantiate(
        &mut self,
        engine: &rhai::Engine,
        behaviors: &mut BehaviorLibrary,
        name: &str,
    ) -> Result<ActorRef> {
        if !self.cache.contains_key(name) {
            let blueprint = self.load_blueprint(engine, behaviors, name)?;
            self.cache.insert(name.to_string(), blueprint);
        }
        let blueprint = self.cache.get(name).cloned();
        match blueprint {
            Some(blueprint) => Ok(deep_copy(&blueprint)),
            None => anyhow::bail!("template {name} vanished from the cache"),
        }
    }

    fn load_blueprint(
        &self,
        engine: &rhai::Engine,
        behaviors: &mut BehaviorLibrary,
        name: &str,
    ) -> Result<ActorRef> {
        let path = self.root.join("resources/actor_templates").join(format!("{name}.template"));
        if !path.exists() {
            anyhow::bail!("template {name} is missing ({})", path.display());
        }
        let file = TemplateFile::load_from_path(&path)
            .with_context(|| format!("template {name}"))?;
        let blueprint = ActorRef::new(-1, file.name.as_deref().unwrap_or(""));
        blueprint.0.borrow_mut().dont_destroy_on_load = file.dont_destroy_on_load;
        for (key, entry) in &file.components {
            let Some(type_name) = entry_type(entry) else {
                continue;
            };
            let instance =
                Component::build(engine, behaviors, blueprint.downgrade(), type_name, key)?;
            if let Some(overrides) = entry.as_object() {
                component::apply_json_overrides(&instance, overrides);
            }
            blueprint.attach_live(&instance);
        }
        Ok(blueprint)
    }
}

/// Copies a blueprint into a spawnable actor. Record components keep the
/// shared prototype link but get their own field map; native components copy
/// by value and re-attach on start.
fn deep_copy(blueprint: &ActorRef) -> ActorRef {
    let copy = ActorRef::new(-1, &blueprint.name());
    {
        let source = blueprint.0.borrow();
        let mut target = copy.0.borrow_mut();
        target.dont_destroy_on_load = source.dont_destroy_on_load;
        target.save_scope = source.save_scope;
    }
    for component in ordered_components(blueprint) {
        let duplicate = component.duplicate(copy.downgrade());
        copy.attach_live(&duplicate);
    }
    copy
}

fn ordered_components(actor: &ActorRef) -> Vec<Component> {
    let mut components = actor.all_components();
    components.sort_by_key(|c| c.key());
    components
}
