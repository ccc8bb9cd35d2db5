use std::cell::RefCell;
use std::rc::{Rc, Weak};

use anyhow::Result;
use rhai::Dynamic;

use crate::actor::Actor;
use crate::behaviors::BehaviorLibrary;
use crate::particles::ParticleEmitter;
use crate::physics::PhysicsBody;
use crate::record::{self, CallbackSet, FieldTable, Prototype};

/// What a component actually is. Behavior records are script-defined field
/// tables; the two native payloads expose a fixed field surface and carry
/// engine-side state.
pub enum Payload {
    Record(FieldTable),
    Body(PhysicsBody),
    Emitter(ParticleEmitter),
}

pub struct ComponentInner {
    pub key: String,
    pub type_name: String,
    pub enabled: bool,
    pub removed: bool,
    pub owner: Weak<RefCell<Actor>>,
    pub payload: Payload,
}

/// Shared component handle. Identity is pointer identity; two clones of the
/// same handle always observe the same state.
#[derive(Clone)]
pub struct Component(pub Rc<RefCell<ComponentInner>>);

pub const BODY_TYPE: &str = "Rigidbody";
pub const EMITTER_TYPE: &str = "ParticleEmitter";

impl Component {
    pub fn new(key: &str, type_name: &str, owner: Weak<RefCell<Actor>>, payload: Payload) -> Self {
        Self(Rc::new(RefCell::new(ComponentInner {
            key: key.to_string(),
            type_name: type_name.to_string(),
            enabled: true,
            removed: false,
            owner,
            payload,
        })))
    }

    /// Builds a fresh component of the named type. Script-defined types go
    /// through the prototype cache; the two native names build their payloads
    /// directly.
    pub fn build(
        engine: &rhai::Engine,
        behaviors: &mut BehaviorLibrary,
        owner: Weak<RefCell<Actor>>,
        type_name: &str,
        key: &str,
    ) -> Result<Self> {
        let payload = match type_name {
            BODY_TYPE => Payload::Body(PhysicsBody::default()),
            EMITTER_TYPE => Payload::Emitter(ParticleEmitter::default()),
            _ => {
                let proto = behaviors.resolve(engine, type_name)?;
                Payload::Record(FieldTable::with_prototype(proto))
            }
        };
        Ok(Self::new(key, type_name, owner, payload))
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn key(&self) -> String {
        self.0.borrow().key.clone()
    }

    pub fn type_name(&self) -> String {
        self.0.borrow().type_name.clone()
    }

    pub fn enabled(&self) -> bool {
        self.0.borrow().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.borrow_mut().enabled = enabled;
    }

    pub fn is_removed(&self) -> bool {
        self.0.borrow().removed
    }

    pub fn mark_removed(&self) {
        let mut inner = self.0.borrow_mut();
        inner.enabled = false;
        inner.removed = true;
    }

    pub fn owner(&self) -> Option<Rc<RefCell<Actor>>> {
        self.0.borrow().owner.upgrade()
    }

    pub fn set_owner(&self, owner: Weak<RefCell<Actor>>) {
        self.0.borrow_mut().owner = owner;
    }

    pub fn owner_name(&self) -> String {
        match self.owner() {
            Some(actor) => actor.borrow().name.clone(),
            None => "<detached>".to_string(),
        }
    }

    /// Which lifecycle callbacks this component participates in. Decided once
    /// from the payload; attach-time phase registration reads this.
    pub fn callbacks(&self) -> CallbackSet {
        match &self.0.borrow().payload {
            Payload::Record(table) => {
                table.prototype().map(|p| p.callbacks).unwrap_or_default()
            }
            Payload::Body(_) => CallbackSet::START | CallbackSet::DESTROY,
            Payload::Emitter(_) => CallbackSet::START | CallbackSet::UPDATE,
        }
    }

    pub fn prototype(&self) -> Option<Rc<Prototype>> {
        match &self.0.borrow().payload {
            Payload::Record(table) => table.prototype(),
            _ => None,
        }
    }

    /// Field read with the structural names resolved first, then the payload.
    /// Unknown names read as unit so scripts can probe with `== ()`.
    pub fn get_field(&self, name: &str) -> Dynamic {
        let inner = self.0.borrow();
        match name {
            "key" => Dynamic::from(inner.key.clone()),
            "type" => Dynamic::from(inner.type_name.clone()),
            "enabled" => Dynamic::from(inner.enabled),
            "removed" => Dynamic::from(inner.removed),
            "actor" => match inner.owner.upgrade() {
                Some(actor) => Dynamic::from(crate::actor::ActorRef(actor)),
                None => Dynamic::UNIT,
            },
            _ => match &inner.payload {
                Payload::Record(table) => table.get(name).unwrap_or(Dynamic::UNIT),
                Payload::Body(body) => body.get_field(name).unwrap_or(Dynamic::UNIT),
                Payload::Emitter(emitter) => emitter.get_field(name).unwrap_or(Dynamic::UNIT),
            },
        }
    }

    /// Field write. `key`, `type`, `removed`, and the owner handle are
    /// read-only; `enabled` toggles dispatch eligibility.
    pub fn set_field(&self, name: &str, value: Dynamic) {
        let mut inner = self.0.borrow_mut();
        match name {
            "key" | "type" | "removed" | "actor" => {}
            "enabled" => {
                if let Some(flag) = record::dynamic_bool(&value) {
                    inner.enabled = flag;
                }
            }
            _ => match &mut inner.payload {
                Payload::Record(table) => table.set(name, value),
                Payload::Body(body) => {
                    body.set_field(name, &value);
                }
                Payload::Emitter(emitter) => {
                    emitter.set_field(name, &value);
                }
            },
        }
    }

    pub fn has_own_field(&self, name: &str) -> bool {
        match &self.0.borrow().payload {
            Payload::Record(table) => table.has_own(name),
            Payload::Body(_) => PhysicsBody::FIELD_NAMES.contains(&name),
            Payload::Emitter(_) => ParticleEmitter::FIELD_NAMES.contains(&name),
        }
    }

    pub fn with_body<R>(&self, f: impl FnOnce(&mut PhysicsBody) -> R) -> Option<R> {
        match &mut self.0.borrow_mut().payload {
            Payload::Body(body) => Some(f(body)),
            _ => None,
        }
    }

    pub fn with_emitter<R>(&self, f: impl FnOnce(&mut ParticleEmitter) -> R) -> Option<R> {
        match &mut self.0.borrow_mut().payload {
            Payload::Emitter(emitter) => Some(f(emitter)),
            _ => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.0.borrow().payload, Payload::Record(_))
    }

    /// Deep copy for template instantiation: records clone their own field
    /// map and share the prototype; natives copy by value without handles.
    pub fn duplicate(&self, owner: Weak<RefCell<Actor>>) -> Self {
        let inner = self.0.borrow();
        let payload = match &inner.payload {
            Payload::Record(table) => Payload::Record(table.duplicate()),
            Payload::Body(body) => Payload::Body(body.duplicate()),
            Payload::Emitter(emitter) => Payload::Emitter(emitter.duplicate()),
        };
        let copy = Self::new(&inner.key, &inner.type_name, owner, payload);
        copy.0.borrow_mut().enabled = inner.enabled;
        copy
    }
}

/// Applies flat definition-file overrides. Only scalars, strings, and bools
/// apply; the `type` discriminator is consumed by the caller.
pub fn apply_json_overrides(
    component: &Component,
    overrides: &serde_json::Map<String, serde_json::Value>,
) {
    for (name, value) in overrides {
        if name == "type" {
            continue;
        }
        if let Some(converted) = record::override_from_json(value) {
            component.set_field(name, converted);
        }
    }
}
