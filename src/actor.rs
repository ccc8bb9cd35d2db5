use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::component::Component;
use crate::record::Phase;

/// Persistence category chosen by scripts. Scene-scoped state rides the
/// scene save file; cross-scene state rides the system file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveScope {
    #[default]
    None,
    SceneScoped,
    CrossScene,
}

type PhaseList = SmallVec<[Component; 4]>;

pub struct Actor {
    pub id: i64,
    pub name: String,
    pub removed: bool,
    pub dont_destroy_on_load: bool,
    pub save_scope: SaveScope,
    pub(crate) keyed: HashMap<String, Component>,
    pub(crate) typed: HashMap<String, Vec<Component>>,
    phases: [PhaseList; Phase::COUNT],
    pub(crate) pending_add: Vec<Component>,
    pub(crate) pending_remove: Vec<Component>,
    pub(crate) will_remove: Vec<Component>,
}

/// Shared actor handle. Everything that iterates actors holds one of these;
/// identity is pointer identity, and ids are only unique within a scene
/// generation.
#[derive(Clone)]
pub struct ActorRef(pub Rc<RefCell<Actor>>);

impl ActorRef {
    pub fn new(id: i64, name: &str) -> Self {
        Self(Rc::new(RefCell::new(Actor {
            id,
            name: name.to_string(),
            removed: false,
            dont_destroy_on_load: false,
            save_scope: SaveScope::default(),
            keyed: HashMap::new(),
            typed: HashMap::new(),
            phases: Default::default(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            will_remove: Vec::new(),
        })))
    }

    pub fn ptr_eq(&self, other: &ActorRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> Weak<RefCell<Actor>> {
        Rc::downgrade(&self.0)
    }

    pub fn id(&self) -> i64 {
        self.0.borrow().id
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn is_removed(&self) -> bool {
        self.0.borrow().removed
    }

    pub fn is_persistent(&self) -> bool {
        self.0.borrow().dont_destroy_on_load
    }

    pub fn save_scope(&self) -> SaveScope {
        self.0.borrow().save_scope
    }

    // ---- lookups (removed components are invisible) ----

    pub fn component_by_key(&self, key: &str) -> Option<Component> {
        let actor = self.0.borrow();
        actor.keyed.get(key).filter(|c| !c.is_removed()).cloned()
    }

    pub fn component_of_type(&self, type_name: &str) -> Option<Component> {
        let actor = self.0.borrow();
        actor
            .typed
            .get(type_name)
            .and_then(|list| list.iter().find(|c| !c.is_removed()))
            .cloned()
    }

    pub fn components_of_type(&self, type_name: &str) -> Vec<Component> {
        let actor = self.0.borrow();
        actor
            .typed
            .get(type_name)
            .map(|list| list.iter().filter(|c| !c.is_removed()).cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_components(&self) -> Vec<Component> {
        self.0.borrow().keyed.values().cloned().collect()
    }

    // ---- attach / detach ----

    /// Registers a component in the keyed, typed, and phase indices. Typed
    /// and phase lists stay sorted by component key; an existing keyed entry
    /// wins and the duplicate is ignored.
    pub fn attach_live(&self, component: &Component) {
        let key = component.key();
        let callbacks = component.callbacks();
        let type_name = component.type_name();
        let mut actor = self.0.borrow_mut();
        if actor.keyed.contains_key(&key) {
            return;
        }
        actor.keyed.insert(key.clone(), component.clone());
        let typed = actor.typed.entry(type_name).or_default();
        insert_sorted_by_key(typed, component, &key);
        for phase in Phase::ALL {
            if callbacks.contains(phase.flag()) {
                let list = &mut actor.phases[phase as usize];
                let pos = list
                    .iter()
                    .position(|c| c.key() > key)
                    .unwrap_or(list.len());
                list.insert(pos, component.clone());
            }
        }
    }

    pub fn detach(&self, component: &Component) {
        let key = component.key();
        let mut actor = self.0.borrow_mut();
        if let Some(current) = actor.keyed.get(&key) {
            if current.ptr_eq(component) {
                actor.keyed.remove(&key);
            }
        }
        let type_name = component.type_name();
        if let Some(list) = actor.typed.get_mut(&type_name) {
            list.retain(|c| !c.ptr_eq(component));
            if list.is_empty() {
                actor.typed.remove(&type_name);
            }
        }
        for phase in Phase::ALL {
            actor.phases[phase as usize].retain(|c| !c.ptr_eq(component));
        }
    }

    pub fn phase_components(&self, phase: Phase) -> Vec<Component> {
        self.0.borrow().phases[phase as usize].to_vec()
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        !self.0.borrow().phases[phase as usize].is_empty()
    }

    /// Start is one-shot: the list empties after its components have run.
    pub fn clear_phase(&self, phase: Phase) {
        self.0.borrow_mut().phases[phase as usize].clear();
    }

    // ---- pending queues ----

    pub fn queue_add(&self, component: &Component) {
        self.0.borrow_mut().pending_add.push(component.clone());
    }

    pub fn take_pending_adds(&self) -> Vec<Component> {
        std::mem::take(&mut self.0.borrow_mut().pending_add)
    }

    pub fn pending_add_contains(&self, component: &Component) -> bool {
        self.0.borrow().pending_add.iter().any(|c| c.ptr_eq(component))
    }

    pub fn has_pending_adds(&self) -> bool {
        !self.0.borrow().pending_add.is_empty()
    }

    pub fn has_pending_removes(&self) -> bool {
        !self.0.borrow().pending_remove.is_empty()
    }

    pub fn has_will_removes(&self) -> bool {
        !self.0.borrow().will_remove.is_empty()
    }

    pub fn queue_remove(&self, component: &Component) {
        let mut actor = self.0.borrow_mut();
        if !actor.pending_remove.iter().any(|c| c.ptr_eq(component)) {
            actor.pending_remove.push(component.clone());
        }
    }

    pub fn queue_will_remove(&self, component: &Component) {
        let mut actor = self.0.borrow_mut();
        if !actor.will_remove.iter().any(|c| c.ptr_eq(component)) {
            actor.will_remove.push(component.clone());
        }
    }

    pub fn take_pending_removes(&self) -> Vec<Component> {
        std::mem::take(&mut self.0.borrow_mut().pending_remove)
    }

    pub fn promote_will_removes(&self) {
        let mut actor = self.0.borrow_mut();
        let promoted = std::mem::take(&mut actor.will_remove);
        for component in promoted {
            if !actor.pending_remove.iter().any(|c| c.ptr_eq(&component)) {
                actor.pending_remove.push(component);
            }
        }
    }

    /// Destroy path: everything stops dispatching immediately even though
    /// physical removal is deferred to the flush.
    pub fn disable_all_components(&self) {
        for component in self.all_components() {
            component.mark_removed();
        }
        for component in self.take_pending_adds() {
            component.mark_removed();
        }
    }
}

fn insert_sorted_by_key(list: &mut Vec<Component>, component: &Component, key: &str) {
    let pos = list.iter().position(|c| c.key().as_str() > key).unwrap_or(list.len());
    list.insert(pos, component.clone());
}

/// Keeps a phase-actor index sorted by actor id; duplicates (same handle)
/// are ignored. Equal ids — a retained actor alongside a new scene's actor —
/// keep insertion order.
pub fn insert_sorted_by_id(list: &mut Vec<ActorRef>, actor: &ActorRef) {
    if list.iter().any(|a| a.ptr_eq(actor)) {
        return;
    }
    let id = actor.id();
    let pos = list.iter().position(|a| a.id() > id).unwrap_or(list.len());
    list.insert(pos, actor.clone());
}

pub fn remove_actor(list: &mut Vec<ActorRef>, actor: &ActorRef) {
    list.retain(|a| !a.ptr_eq(actor));
}
