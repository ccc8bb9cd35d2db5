use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use rhai::Dynamic;

use crate::record::{CallbackSet, Prototype};

/// Compiles and caches behavior definitions. A definition lives at
/// `resources/behaviors/<name>.rhai`; its top-level expression evaluates to
/// the default field map and its functions are the lifecycle callbacks. The
/// cache holds for process lifetime, so editing a definition mid-run has no
/// effect.
pub struct BehaviorLibrary {
    root: PathBuf,
    cache: HashMap<String, Rc<Prototype>>,
}

impl BehaviorLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), cache: HashMap::new() }
    }

    pub fn resolve(&mut self, engine: &rhai::Engine, name: &str) -> Result<Rc<Prototype>> {
        if let Some(proto) = self.cache.get(name) {
            return Ok(Rc::clone(proto));
        }
        let path = self.root.join("resources/behaviors").join(format!("{name}.rhai"));
        let source = fs::read_to_string(&path)
            .with_context(|| format!("missing behavior definition {}", path.display()))?;
        let ast = engine
            .compile(&source)
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("failed to compile behavior {}", path.display()))?;
        let defaults = engine
            .eval_ast::<Dynamic>(&ast)
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("failed to evaluate behavior defaults {}", path.display()))?
            .try_cast::<rhai::Map>()
            .unwrap_or_default();
        let callbacks = CallbackSet::from_ast(&ast);
        let proto = Rc::new(Prototype { name: name.to_string(), ast, defaults, callbacks });
        self.cache.insert(name.to_string(), Rc::clone(&proto));
        Ok(proto)
    }
}
