use std::rc::Rc;

use bitflags::bitflags;
use rhai::{Dynamic, ImmutableString, AST};

use glam::Vec2;

/// The eight lifecycle hooks a behavior definition may expose. Membership in
/// the corresponding phase list is decided once, when the component attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Update,
    LateUpdate,
    Destroy,
    CollisionEnter,
    CollisionExit,
    TriggerEnter,
    TriggerExit,
}

impl Phase {
    pub const COUNT: usize = 8;
    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::Start,
        Phase::Update,
        Phase::LateUpdate,
        Phase::Destroy,
        Phase::CollisionEnter,
        Phase::CollisionExit,
        Phase::TriggerEnter,
        Phase::TriggerExit,
    ];

    pub fn callback_name(self) -> &'static str {
        match self {
            Phase::Start => "on_start",
            Phase::Update => "on_update",
            Phase::LateUpdate => "on_late_update",
            Phase::Destroy => "on_destroy",
            Phase::CollisionEnter => "on_collision_enter",
            Phase::CollisionExit => "on_collision_exit",
            Phase::TriggerEnter => "on_trigger_enter",
            Phase::TriggerExit => "on_trigger_exit",
        }
    }

    pub fn flag(self) -> CallbackSet {
        match self {
            Phase::Start => CallbackSet::START,
            Phase::Update => CallbackSet::UPDATE,
            Phase::LateUpdate => CallbackSet::LATE_UPDATE,
            Phase::Destroy => CallbackSet::DESTROY,
            Phase::CollisionEnter => CallbackSet::COLLISION_ENTER,
            Phase::CollisionExit => CallbackSet::COLLISION_EXIT,
            Phase::TriggerEnter => CallbackSet::TRIGGER_ENTER,
            Phase::TriggerExit => CallbackSet::TRIGGER_EXIT,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CallbackSet: u8 {
        const START = 1 << 0;
        const UPDATE = 1 << 1;
        const LATE_UPDATE = 1 << 2;
        const DESTROY = 1 << 3;
        const COLLISION_ENTER = 1 << 4;
        const COLLISION_EXIT = 1 << 5;
        const TRIGGER_ENTER = 1 << 6;
        const TRIGGER_EXIT = 1 << 7;
    }
}

impl CallbackSet {
    pub fn from_ast(ast: &AST) -> Self {
        let mut set = CallbackSet::empty();
        for func in ast.iter_functions() {
            for phase in Phase::ALL {
                if func.name == phase.callback_name() {
                    set |= phase.flag();
                }
            }
        }
        set
    }
}

/// A cached, immutable behavior definition: the compiled script, the default
/// field map its body evaluates to, and which callbacks it defines. Cached for
/// process lifetime; there is no invalidation.
pub struct Prototype {
    pub name: String,
    pub ast: AST,
    pub defaults: rhai::Map,
    pub callbacks: CallbackSet,
}

/// Two-level field chain: reads fall through from the instance's own map to
/// the shared prototype defaults, writes always land in the own map.
#[derive(Default)]
pub struct FieldTable {
    own: rhai::Map,
    proto: Option<Rc<Prototype>>,
}

impl FieldTable {
    pub fn with_prototype(proto: Rc<Prototype>) -> Self {
        Self { own: rhai::Map::new(), proto: Some(proto) }
    }

    pub fn prototype(&self) -> Option<Rc<Prototype>> {
        self.proto.clone()
    }

    pub fn get(&self, name: &str) -> Option<Dynamic> {
        if let Some(value) = self.own.get(name) {
            return Some(value.clone());
        }
        self.proto.as_ref().and_then(|proto| proto.defaults.get(name).cloned())
    }

    pub fn set(&mut self, name: &str, value: Dynamic) {
        self.own.insert(name.into(), value);
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.own.contains_key(name)
    }

    pub fn own_fields(&self) -> impl Iterator<Item = (&str, &Dynamic)> {
        self.own.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Deep-copy helper for template instantiation: the clone keeps its own
    /// copy of the instance fields but delegates to the same shared prototype.
    pub fn duplicate(&self) -> Self {
        Self { own: self.own.clone(), proto: self.proto.clone() }
    }
}

// ---------- JSON <-> Dynamic ----------

/// Definition-file overrides are flat scalars; anything else is ignored.
pub fn override_from_json(value: &serde_json::Value) -> Option<Dynamic> {
    match value {
        serde_json::Value::Bool(b) => Some(Dynamic::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Dynamic::from(i))
            } else {
                n.as_f64().map(Dynamic::from)
            }
        }
        serde_json::Value::String(s) => Some(Dynamic::from(s.clone())),
        _ => None,
    }
}

/// Full conversion used when merging persisted state back into a live record.
pub fn json_to_dynamic(value: &serde_json::Value) -> Option<Dynamic> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Dynamic::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Dynamic::from(i))
            } else {
                n.as_f64().map(Dynamic::from)
            }
        }
        serde_json::Value::String(s) => Some(Dynamic::from(s.clone())),
        serde_json::Value::Array(items) => {
            let array: rhai::Array = items.iter().filter_map(json_to_dynamic).collect();
            Some(Dynamic::from(array))
        }
        serde_json::Value::Object(map) => {
            let mut out = rhai::Map::new();
            for (key, item) in map {
                if let Some(converted) = json_to_dynamic(item) {
                    out.insert(key.as_str().into(), converted);
                }
            }
            Some(Dynamic::from(out))
        }
    }
}

/// Snapshot conversion: scalars, strings, bools, arrays, maps, and the `Vec2`
/// handle serialize; everything else (function pointers, actor handles) is
/// dropped silently.
pub fn dynamic_to_json(value: &Dynamic) -> Option<serde_json::Value> {
    if value.is_unit() {
        return None;
    }
    if let Ok(b) = value.as_bool() {
        return Some(serde_json::Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Some(serde_json::Value::from(i));
    }
    if let Ok(f) = value.as_float() {
        return Some(serde_json::Value::from(f));
    }
    if let Some(s) = value.clone().try_cast::<ImmutableString>() {
        return Some(serde_json::Value::String(s.to_string()));
    }
    if let Some(v) = value.clone().try_cast::<Vec2>() {
        let mut map = serde_json::Map::new();
        map.insert("x".to_string(), serde_json::Value::from(v.x as f64));
        map.insert("y".to_string(), serde_json::Value::from(v.y as f64));
        return Some(serde_json::Value::Object(map));
    }
    if let Some(array) = value.clone().try_cast::<rhai::Array>() {
        let items: Vec<serde_json::Value> = array.iter().filter_map(dynamic_to_json).collect();
        return Some(serde_json::Value::Array(items));
    }
    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let mut out = serde_json::Map::new();
        for (key, item) in &map {
            if let Some(converted) = dynamic_to_json(item) {
                out.insert(key.to_string(), converted);
            }
        }
        return Some(serde_json::Value::Object(out));
    }
    None
}

// ---------- Dynamic coercion helpers ----------

pub fn dynamic_f32(value: &Dynamic) -> Option<f32> {
    if let Ok(f) = value.as_float() {
        Some(f as f32)
    } else {
        value.as_int().ok().map(|i| i as f32)
    }
}

pub fn dynamic_i32(value: &Dynamic) -> Option<i32> {
    if let Ok(i) = value.as_int() {
        Some(i as i32)
    } else {
        value.as_float().ok().map(|f| f as i32)
    }
}

pub fn dynamic_bool(value: &Dynamic) -> Option<bool> {
    value.as_bool().ok()
}

pub fn dynamic_string(value: &Dynamic) -> Option<String> {
    value.clone().try_cast::<ImmutableString>().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_stay_in_the_instance_map() {
        let proto = Rc::new(Prototype {
            name: "mover".to_string(),
            ast: AST::empty(),
            defaults: {
                let mut map = rhai::Map::new();
                map.insert("speed".into(), Dynamic::from(5_i64));
                map
            },
            callbacks: CallbackSet::empty(),
        });
        let mut table = FieldTable::with_prototype(Rc::clone(&proto));
        assert_eq!(table.get("speed").and_then(|v| v.as_int().ok()), Some(5));
        assert!(!table.has_own("speed"));

        table.set("speed", Dynamic::from(9_i64));
        assert_eq!(table.get("speed").and_then(|v| v.as_int().ok()), Some(9));
        assert!(table.has_own("speed"));
        assert_eq!(proto.defaults.get("speed").and_then(|v| v.as_int().ok()), Some(5));
    }

    #[test]
    fn snapshot_conversion_drops_foreign_values() {
        assert!(dynamic_to_json(&Dynamic::UNIT).is_none());
        assert!(dynamic_to_json(&Dynamic::from(rhai::FnPtr::new("handler").expect("fn ptr"))).is_none());
        let json = dynamic_to_json(&Dynamic::from(Vec2::new(1.0, 2.0))).expect("vec2 serializes");
        assert_eq!(json["x"].as_f64(), Some(1.0));
    }
}
