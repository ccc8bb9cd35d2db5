use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use glam::Vec2;
use rapier2d::prelude::*;
use rhai::Dynamic;

use crate::actor::ActorRef;
use crate::record::{dynamic_bool, dynamic_f32, dynamic_string};

/// Body component state as authored in definition files. The rapier handles
/// appear once the start callback attaches the body to the world.
#[derive(Debug, Clone)]
pub struct PhysicsBody {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub body_type: String,
    pub precise: bool,
    pub gravity_scale: f32,
    pub density: f32,
    pub angular_friction: f32,
    pub friction: f32,
    pub bounciness: f32,
    pub has_collider: bool,
    pub collider_type: String,
    pub width: f32,
    pub height: f32,
    pub radius: f32,
    pub has_trigger: bool,
    pub trigger_type: String,
    pub trigger_width: f32,
    pub trigger_height: f32,
    pub trigger_radius: f32,
    pub handle: Option<RigidBodyHandle>,
    collider: Option<ColliderHandle>,
    trigger: Option<ColliderHandle>,
}

impl Default for PhysicsBody {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            body_type: "dynamic".to_string(),
            precise: true,
            gravity_scale: 1.0,
            density: 1.0,
            angular_friction: 0.3,
            friction: 0.3,
            bounciness: 0.3,
            has_collider: true,
            collider_type: "box".to_string(),
            width: 1.0,
            height: 1.0,
            radius: 0.5,
            has_trigger: true,
            trigger_type: "box".to_string(),
            trigger_width: 1.0,
            trigger_height: 1.0,
            trigger_radius: 0.5,
            handle: None,
            collider: None,
            trigger: None,
        }
    }
}

impl PhysicsBody {
    pub const FIELD_NAMES: &'static [&'static str] = &[
        "x",
        "y",
        "rotation",
        "body_type",
        "precise",
        "gravity_scale",
        "density",
        "angular_friction",
        "friction",
        "bounciness",
        "has_collider",
        "collider_type",
        "width",
        "height",
        "radius",
        "has_trigger",
        "trigger_type",
        "trigger_width",
        "trigger_height",
        "trigger_radius",
    ];

    pub fn get_field(&self, name: &str) -> Option<Dynamic> {
        let float = |v: f32| Dynamic::from(v as f64);
        match name {
            "x" => Some(float(self.x)),
            "y" => Some(float(self.y)),
            "rotation" => Some(float(self.rotation)),
            "body_type" => Some(Dynamic::from(self.body_type.clone())),
            "precise" => Some(Dynamic::from(self.precise)),
            "gravity_scale" => Some(float(self.gravity_scale)),
            "density" => Some(float(self.density)),
            "angular_friction" => Some(float(self.angular_friction)),
            "friction" => Some(float(self.friction)),
            "bounciness" => Some(float(self.bounciness)),
            "has_collider" => Some(Dynamic::from(self.has_collider)),
            "collider_type" => Some(Dynamic::from(self.collider_type.clone())),
            "width" => Some(float(self.width)),
            "height" => Some(float(self.height)),
            "radius" => Some(float(self.radius)),
            "has_trigger" => Some(Dynamic::from(self.has_trigger)),
            "trigger_type" => Some(Dynamic::from(self.trigger_type.clone())),
            "trigger_width" => Some(float(self.trigger_width)),
            "trigger_height" => Some(float(self.trigger_height)),
            "trigger_radius" => Some(float(self.trigger_radius)),
            _ => None,
        }
    }

    pub fn set_field(&mut self, name: &str, value: &Dynamic) -> bool {
        match name {
            "x" => assign_f32(&mut self.x, value),
            "y" => assign_f32(&mut self.y, value),
            "rotation" => assign_f32(&mut self.rotation, value),
            "body_type" => assign_string(&mut self.body_type, value),
            "precise" => assign_bool(&mut self.precise, value),
            "gravity_scale" => assign_f32(&mut self.gravity_scale, value),
            "density" => assign_f32(&mut self.density, value),
            "angular_friction" => assign_f32(&mut self.angular_friction, value),
            "friction" => assign_f32(&mut self.friction, value),
            "bounciness" => assign_f32(&mut self.bounciness, value),
            "has_collider" => assign_bool(&mut self.has_collider, value),
            "collider_type" => assign_string(&mut self.collider_type, value),
            "width" => assign_f32(&mut self.width, value),
            "height" => assign_f32(&mut self.height, value),
            "radius" => assign_f32(&mut self.radius, value),
            "has_trigger" => assign_bool(&mut self.has_trigger, value),
            "trigger_type" => assign_string(&mut self.trigger_type, value),
            "trigger_width" => assign_f32(&mut self.trigger_width, value),
            "trigger_height" => assign_f32(&mut self.trigger_height, value),
            "trigger_radius" => assign_f32(&mut self.trigger_radius, value),
            _ => false,
        }
    }

    /// Value copy for template instantiation. Handles stay behind; the copy
    /// attaches its own body when its start callback runs.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.handle = None;
        copy.collider = None;
        copy.trigger = None;
        copy
    }
}

fn assign_f32(slot: &mut f32, value: &Dynamic) -> bool {
    match dynamic_f32(value) {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

fn assign_bool(slot: &mut bool, value: &Dynamic) -> bool {
    match dynamic_bool(value) {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

fn assign_string(slot: &mut String, value: &Dynamic) -> bool {
    match dynamic_string(value) {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Enter,
    Exit,
}

/// One drained collision or sensor event, already resolved to actors.
pub struct Contact {
    pub kind: ContactKind,
    pub sensor: bool,
    pub a: ActorRef,
    pub b: ActorRef,
    pub point: Vec2,
    pub normal: Vec2,
    pub relative_velocity: Vec2,
}

struct EventCollector {
    sender: Sender<CollisionEvent>,
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        let _ = self.sender.send(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Owns the rapier sets plus the collider-to-actor map the dispatcher needs
/// to turn wire events back into actor pairs.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    collider_actors: HashMap<ColliderHandle, ActorRef>,
    events_rx: Receiver<CollisionEvent>,
    events_tx: Sender<CollisionEvent>,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let (events_tx, events_rx) = channel();
        Self {
            pipeline: PhysicsPipeline::new(),
            // Screen coordinates: positive y is down, so gravity is positive.
            gravity: vector![0.0, 9.8],
            integration_parameters: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            collider_actors: HashMap::new(),
            events_rx,
            events_tx,
        }
    }

    pub fn attach_body(&mut self, body: &mut PhysicsBody, owner: &ActorRef) {
        let builder = match body.body_type.as_str() {
            "static" => RigidBodyBuilder::fixed(),
            "kinematic" => RigidBodyBuilder::kinematic_velocity_based(),
            _ => RigidBodyBuilder::dynamic(),
        };
        let rigid = builder
            .translation(vector![body.x, body.y])
            .rotation(body.rotation.to_radians())
            .gravity_scale(body.gravity_scale)
            .angular_damping(body.angular_friction)
            .ccd_enabled(body.precise)
            .build();
        let handle = self.bodies.insert(rigid);
        body.handle = Some(handle);

        if body.has_collider {
            let shape = match body.collider_type.as_str() {
                "circle" => ColliderBuilder::ball(body.radius),
                _ => ColliderBuilder::cuboid(body.width * 0.5, body.height * 0.5),
            };
            let collider = shape
                .density(body.density)
                .friction(body.friction)
                .restitution(body.bounciness)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .build();
            let ch = self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
            self.collider_actors.insert(ch, owner.clone());
            body.collider = Some(ch);
        }
        if body.has_trigger {
            let shape = match body.trigger_type.as_str() {
                "circle" => ColliderBuilder::ball(body.trigger_radius),
                _ => ColliderBuilder::cuboid(body.trigger_width * 0.5, body.trigger_height * 0.5),
            };
            let trigger = shape
                .density(body.density)
                .sensor(true)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .build();
            let ch = self.colliders.insert_with_parent(trigger, handle, &mut self.bodies);
            self.collider_actors.insert(ch, owner.clone());
            body.trigger = Some(ch);
        }
    }

    pub fn detach_body(&mut self, body: &mut PhysicsBody) {
        for slot in [body.collider.take(), body.trigger.take()].into_iter().flatten() {
            self.collider_actors.remove(&slot);
        }
        if let Some(handle) = body.handle.take() {
            self.bodies.remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
    }

    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        let collector = EventCollector { sender: self.events_tx.clone() };
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &collector,
        );
    }

    pub fn drain_contacts(&mut self) -> Vec<Contact> {
        let mut contacts = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            let (h1, h2, kind, sensor) = match event {
                CollisionEvent::Started(h1, h2, flags) => {
                    (h1, h2, ContactKind::Enter, flags.contains(CollisionEventFlags::SENSOR))
                }
                CollisionEvent::Stopped(h1, h2, flags) => {
                    (h1, h2, ContactKind::Exit, flags.contains(CollisionEventFlags::SENSOR))
                }
            };
            let (Some(a), Some(b)) =
                (self.collider_actors.get(&h1).cloned(), self.collider_actors.get(&h2).cloned())
            else {
                // One side was detached before the drain; nothing to dispatch.
                continue;
            };
            let p1 = self.collider_position(h1);
            let p2 = self.collider_position(h2);
            let midpoint = (p1 + p2) * 0.5;
            let normal = (p2 - p1).normalize_or_zero();
            let relative_velocity = self.collider_velocity(h1) - self.collider_velocity(h2);
            contacts.push(Contact {
                kind,
                sensor,
                a,
                b,
                point: midpoint,
                normal,
                relative_velocity,
            });
        }
        contacts
    }

    fn collider_position(&self, handle: ColliderHandle) -> Vec2 {
        match self.colliders.get(handle) {
            Some(collider) => {
                let t = collider.translation();
                Vec2::new(t.x, t.y)
            }
            None => Vec2::ZERO,
        }
    }

    fn collider_velocity(&self, handle: ColliderHandle) -> Vec2 {
        let Some(body) = self
            .colliders
            .get(handle)
            .and_then(|c| c.parent())
            .and_then(|h| self.bodies.get(h))
        else {
            return Vec2::ZERO;
        };
        let v = body.linvel();
        Vec2::new(v.x, v.y)
    }

    // ---- script-facing body accessors ----

    pub fn body_position(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.bodies.get(handle).map(|body| {
            let t = body.position().translation;
            Vec2::new(t.x, t.y)
        })
    }

    pub fn set_body_position(&mut self, handle: RigidBodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vector![position.x, position.y], true);
        }
    }

    pub fn body_velocity(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.bodies.get(handle).map(|body| {
            let v = body.linvel();
            Vec2::new(v.x, v.y)
        })
    }

    pub fn set_body_velocity(&mut self, handle: RigidBodyHandle, velocity: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vector![velocity.x, velocity.y], true);
        }
    }

    pub fn add_body_force(&mut self, handle: RigidBodyHandle, force: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_force(vector![force.x, force.y], true);
        }
    }

    pub fn body_rotation(&self, handle: RigidBodyHandle) -> Option<f32> {
        self.bodies.get(handle).map(|body| body.rotation().angle().to_degrees())
    }

    pub fn set_body_rotation(&mut self, handle: RigidBodyHandle, degrees: f32) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_rotation(Rotation::new(degrees.to_radians()), true);
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}
