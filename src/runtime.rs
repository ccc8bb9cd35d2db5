use std::path::PathBuf;

use anyhow::Result;
use glam::Vec2;
use rhai::Dynamic;

use crate::actor::ActorRef;
use crate::particles::SpriteDraw;
use crate::physics::ContactKind;
use crate::record::Phase;
use crate::registry::World;
use crate::scripts::{self, ScriptHost, WorldScope};
use crate::time::FrameClock;

const PHYSICS_DT: f32 = 1.0 / 60.0;

/// Escalation point for errors the game loop cannot continue past: missing
/// resources, reserved names, malformed persisted state.
pub fn fatal(err: &anyhow::Error) -> ! {
    eprintln!("error: {err:#}");
    std::process::exit(1);
}

/// Owns the world and the script host and drives the fixed frame order:
/// scene load, start, update, late-update, event-bus flush, physics step and
/// contact dispatch, component flushes, actor flushes.
pub struct Runtime {
    pub world: World,
    pub scripts: ScriptHost,
    clock: FrameClock,
}

impl Runtime {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let world = World::new(root)?;
        Ok(Self { world, scripts: ScriptHost::new(), clock: FrameClock::new(60) })
    }

    pub fn run(&mut self) -> Result<()> {
        println!("{}", self.world.game_config.game_title);
        while !self.world.quit_requested {
            self.run_frame()?;
            self.clock.pace();
        }
        // Session teardown: staging state does not outlive the process.
        self.world.saves.clear_staging()?;
        self.world.saves.persist_config()?;
        Ok(())
    }

    pub fn run_frame(&mut self) -> Result<()> {
        if let Some(next) = self.world.next_scene.take() {
            self.world.load_scene(&self.scripts, &next)?;
        }
        run_starts(&mut self.world, &self.scripts);
        run_phase(&mut self.world, &self.scripts, Phase::Update);
        run_phase(&mut self.world, &self.scripts, Phase::LateUpdate);
        self.world.bus.flush();
        step_physics(&mut self.world, &self.scripts);
        self.world.flush_component_adds();
        self.world.flush_component_removes(&self.scripts);
        self.world.flush_actor_adds();
        self.world.flush_actor_removes(&self.scripts);
        self.world.frame += 1;
        Ok(())
    }

    /// Hands the frame's sprite draws to the embedding renderer, sorted by
    /// sorting order.
    pub fn take_sprite_draws(&mut self) -> Vec<SpriteDraw> {
        let mut draws = std::mem::take(&mut self.world.sprite_queue);
        draws.sort_by_key(|d| d.sorting_order);
        draws
    }
}

fn run_starts(world: &mut World, scripts: &ScriptHost) {
    let actors = std::mem::take(&mut world.starting_actors);
    for actor in actors {
        let components = actor.phase_components(Phase::Start);
        for component in components {
            if !component.enabled() {
                continue;
            }
            if component.is_record() {
                let _scope = WorldScope::enter(world);
                if let Err(err) =
                    scripts.invoke_callback(&component, Phase::Start.callback_name(), Vec::new())
                {
                    scripts::report_callback_error(&component.owner_name(), &err);
                }
            } else if component.with_emitter(|e| e.on_start()).is_none() {
                component.with_body(|body| world.physics.attach_body(body, &actor));
            }
        }
        // Start is one-shot; later-added components re-enter through the
        // add flush with their own start pass.
        actor.clear_phase(Phase::Start);
    }
}

fn run_phase(world: &mut World, scripts: &ScriptHost, phase: Phase) {
    let actors = match phase {
        Phase::Update => world.updating_actors.clone(),
        Phase::LateUpdate => world.late_updating_actors.clone(),
        _ => return,
    };
    for actor in actors {
        for component in actor.phase_components(phase) {
            if !component.enabled() {
                continue;
            }
            if component.is_record() {
                let _scope = WorldScope::enter(world);
                if let Err(err) =
                    scripts.invoke_callback(&component, phase.callback_name(), Vec::new())
                {
                    scripts::report_callback_error(&component.owner_name(), &err);
                }
            } else {
                component.with_emitter(|e| e.on_update(&mut world.sprite_queue));
            }
        }
    }
}

fn step_physics(world: &mut World, scripts: &ScriptHost) {
    world.physics.step(PHYSICS_DT);
    let contacts = world.physics.drain_contacts();
    for contact in contacts {
        let (enter_phase, exit_phase) = if contact.sensor {
            (Phase::TriggerEnter, Phase::TriggerExit)
        } else {
            (Phase::CollisionEnter, Phase::CollisionExit)
        };
        let phase = match contact.kind {
            ContactKind::Enter => enter_phase,
            ContactKind::Exit => exit_phase,
        };
        // Only a solid contact's enter event has meaningful geometry.
        let with_geometry = !contact.sensor && contact.kind == ContactKind::Enter;
        let a_payload = contact_payload(&contact.b, &contact, with_geometry);
        let b_payload = contact_payload(&contact.a, &contact, with_geometry);
        dispatch_contact(world, scripts, &contact.a, phase, a_payload);
        dispatch_contact(world, scripts, &contact.b, phase, b_payload);
    }
}

fn contact_payload(
    other: &ActorRef,
    contact: &crate::physics::Contact,
    with_geometry: bool,
) -> Dynamic {
    let mut map = rhai::Map::new();
    map.insert("other".into(), Dynamic::from(other.clone()));
    if with_geometry {
        map.insert("point".into(), Dynamic::from(contact.point));
        map.insert("normal".into(), Dynamic::from(contact.normal));
        map.insert("relative_velocity".into(), Dynamic::from(contact.relative_velocity));
    } else {
        map.insert("point".into(), Dynamic::from(SENTINEL));
        map.insert("normal".into(), Dynamic::from(SENTINEL));
        map.insert("relative_velocity".into(), Dynamic::from(SENTINEL));
    }
    Dynamic::from(map)
}

/// Placeholder vector carried in sensor payloads, which have no meaningful
/// contact geometry.
const SENTINEL: Vec2 = Vec2::new(-999.0, -999.0);

fn dispatch_contact(
    world: &mut World,
    scripts: &ScriptHost,
    actor: &ActorRef,
    phase: Phase,
    payload: Dynamic,
) {
    if actor.is_removed() {
        return;
    }
    for component in actor.phase_components(phase) {
        if !component.enabled() {
            continue;
        }
        let _scope = WorldScope::enter(world);
        if let Err(err) =
            scripts.invoke_callback(&component, phase.callback_name(), vec![payload.clone()])
        {
            scripts::report_callback_error(&component.owner_name(), &err);
        }
    }
}
