use std::cell::Cell;

use glam::Vec2;
use rhai::{
    CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, NativeCallContext,
    Scope,
};

use crate::actor::{ActorRef, SaveScope};
use crate::component::Component;
use crate::events::Subscription;
use crate::registry::World;

thread_local! {
    static ACTIVE_WORLD: Cell<*mut World> = const { Cell::new(std::ptr::null_mut()) };
}

/// Installs the world pointer for the duration of a dispatch so registered
/// script functions can reach the registry. Scopes nest; the previous pointer
/// is restored on drop. Single-threaded by construction, same shape as
/// stashing a raw world pointer in the script API object.
pub(crate) struct WorldScope {
    prev: *mut World,
}

impl WorldScope {
    pub(crate) fn enter(world: &mut World) -> Self {
        let prev = ACTIVE_WORLD.with(|cell| cell.replace(world as *mut World));
        Self { prev }
    }
}

impl Drop for WorldScope {
    fn drop(&mut self) {
        let prev = self.prev;
        ACTIVE_WORLD.with(|cell| cell.set(prev));
    }
}

/// Runs `f` against the active world, or returns `None` outside a dispatch.
fn with_world<R>(f: impl FnOnce(&mut World) -> R) -> Option<R> {
    let ptr = ACTIVE_WORLD.with(|cell| cell.get());
    if ptr.is_null() {
        None
    } else {
        Some(f(unsafe { &mut *ptr }))
    }
}

pub fn report_callback_error(actor_name: &str, err: &str) {
    eprintln!("\x1b[31m{actor_name} : {err}\x1b[0m");
}

/// Owns the rhai engine with the full behavior-facing API registered.
pub struct ScriptHost {
    pub engine: Engine,
}

impl ScriptHost {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        register_component(&mut engine);
        register_actor(&mut engine);
        register_vec2(&mut engine);
        register_globals(&mut engine);
        Self { engine }
    }

    /// Invokes a lifecycle callback with the component bound as `this`. A
    /// missing function is not an error; membership was decided at attach
    /// time and a prototype without the function simply never dispatches.
    pub fn invoke_callback(
        &self,
        component: &Component,
        name: &str,
        args: Vec<Dynamic>,
    ) -> Result<(), String> {
        invoke_callback(&self.engine, component, name, args)
    }

    /// Engine-side publish: same delivery as the script-facing global.
    pub fn publish(&self, world: &mut World, topic: &str, payload: Dynamic) {
        let subscribers = world.bus.subscribers(topic);
        let _scope = WorldScope::enter(world);
        deliver(&self.engine, &subscribers, payload);
    }
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke_callback(
    engine: &Engine,
    component: &Component,
    name: &str,
    args: Vec<Dynamic>,
) -> Result<(), String> {
    let Some(proto) = component.prototype() else {
        return Ok(());
    };
    let mut this = Dynamic::from(component.clone());
    let mut scope = Scope::new();
    let options = CallFnOptions::new()
        .eval_ast(false)
        .rewind_scope(true)
        .bind_this_ptr(&mut this);
    match engine.call_fn_with_options::<Dynamic>(options, &mut scope, &proto.ast, name, args) {
        Ok(_) => Ok(()),
        Err(err) => {
            if matches!(*err, EvalAltResult::ErrorFunctionNotFound(_, _)) {
                Ok(())
            } else {
                Err(err.to_string())
            }
        }
    }
}

/// Delivers a payload to a subscriber snapshot. Handlers are resolved by
/// name against each subscriber's own behavior definition and receive
/// `(component, payload)`.
fn deliver(engine: &Engine, subscribers: &[Subscription], payload: Dynamic) {
    for subscription in subscribers {
        let Some(proto) = subscription.component.prototype() else {
            continue;
        };
        let mut scope = Scope::new();
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = engine.call_fn_with_options::<Dynamic>(
            options,
            &mut scope,
            &proto.ast,
            subscription.handler.fn_name(),
            (Dynamic::from(subscription.component.clone()), payload.clone()),
        );
        if let Err(err) = result {
            report_callback_error(&subscription.component.owner_name(), &err.to_string());
        }
    }
}

fn register_component(engine: &mut Engine) {
    engine.register_type_with_name::<Component>("Component");
    engine.register_indexer_get(|c: &mut Component, field: ImmutableString| -> Dynamic {
        c.get_field(&field)
    });
    engine.register_indexer_set(|c: &mut Component, field: ImmutableString, value: Dynamic| {
        c.set_field(&field, value);
    });
    engine.register_fn("has_own_field", |c: &mut Component, field: ImmutableString| {
        c.has_own_field(&field)
    });

    // Body accessors fall back to the authored fields until the start
    // callback has attached the rapier body.
    engine.register_fn("get_position", |c: &mut Component| -> Dynamic {
        let Some((handle, stored)) = c.with_body(|b| (b.handle, Vec2::new(b.x, b.y))) else {
            return Dynamic::UNIT;
        };
        let live = handle.and_then(|h| with_world(|w| w.physics.body_position(h)).flatten());
        Dynamic::from(live.unwrap_or(stored))
    });
    engine.register_fn("set_position", |c: &mut Component, position: Vec2| {
        let handle = c.with_body(|b| {
            b.x = position.x;
            b.y = position.y;
            b.handle
        });
        if let Some(Some(handle)) = handle {
            with_world(|w| w.physics.set_body_position(handle, position));
        }
    });
    engine.register_fn("get_velocity", |c: &mut Component| -> Dynamic {
        let Some(handle) = c.with_body(|b| b.handle) else {
            return Dynamic::UNIT;
        };
        let live = handle.and_then(|h| with_world(|w| w.physics.body_velocity(h)).flatten());
        Dynamic::from(live.unwrap_or(Vec2::ZERO))
    });
    engine.register_fn("set_velocity", |c: &mut Component, velocity: Vec2| {
        if let Some(Some(handle)) = c.with_body(|b| b.handle) {
            with_world(|w| w.physics.set_body_velocity(handle, velocity));
        }
    });
    engine.register_fn("add_force", |c: &mut Component, force: Vec2| {
        if let Some(Some(handle)) = c.with_body(|b| b.handle) {
            with_world(|w| w.physics.add_body_force(handle, force));
        }
    });
    engine.register_fn("get_rotation", |c: &mut Component| -> Dynamic {
        let Some((handle, stored)) = c.with_body(|b| (b.handle, b.rotation)) else {
            return Dynamic::UNIT;
        };
        let live = handle.and_then(|h| with_world(|w| w.physics.body_rotation(h)).flatten());
        Dynamic::from(live.unwrap_or(stored) as f64)
    });
    engine.register_fn("set_rotation", |c: &mut Component, degrees: f64| {
        let handle = c.with_body(|b| {
            b.rotation = degrees as f32;
            b.handle
        });
        if let Some(Some(handle)) = handle {
            with_world(|w| w.physics.set_body_rotation(handle, degrees as f32));
        }
    });

    engine.register_fn("play", |c: &mut Component| {
        c.with_emitter(|e| e.play());
    });
    engine.register_fn("stop", |c: &mut Component| {
        c.with_emitter(|e| e.stop());
    });
    engine.register_fn("burst", |c: &mut Component| {
        c.with_emitter(|e| e.burst());
    });
}

fn register_actor(engine: &mut Engine) {
    engine.register_type_with_name::<ActorRef>("Actor");
    engine.register_fn("name", |a: &mut ActorRef| a.name());
    engine.register_fn("id", |a: &mut ActorRef| a.id());
    engine.register_fn("get_component", |a: &mut ActorRef, type_name: ImmutableString| {
        a.component_of_type(&type_name).map(Dynamic::from).unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("get_components", |a: &mut ActorRef, type_name: ImmutableString| {
        a.components_of_type(&type_name)
            .into_iter()
            .map(Dynamic::from)
            .collect::<rhai::Array>()
    });
    engine.register_fn("get_component_by_key", |a: &mut ActorRef, key: ImmutableString| {
        a.component_by_key(&key).map(Dynamic::from).unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn(
        "add_component",
        |ctx: NativeCallContext, a: &mut ActorRef, type_name: ImmutableString| -> Dynamic {
            let actor = a.clone();
            with_world(|w| match w.request_add_component(ctx.engine(), &actor, &type_name) {
                Ok(Some(component)) => Dynamic::from(component),
                Ok(None) => Dynamic::UNIT,
                Err(err) => crate::runtime::fatal(&err),
            })
            .unwrap_or(Dynamic::UNIT)
        },
    );
    engine.register_fn("remove_component", |a: &mut ActorRef, component: Component| {
        let actor = a.clone();
        with_world(|w| w.request_remove_component(&actor, &component));
    });
    engine.register_fn("dont_destroy", |a: &mut ActorRef| {
        a.0.borrow_mut().dont_destroy_on_load = true;
    });
    engine.register_fn("scene_save", |a: &mut ActorRef| {
        let actor = a.clone();
        with_world(|w| w.set_save_scope(&actor, SaveScope::SceneScoped));
    });
    engine.register_fn("system_save", |a: &mut ActorRef| {
        let actor = a.clone();
        with_world(|w| w.set_save_scope(&actor, SaveScope::CrossScene));
    });
    engine.register_fn("dont_save", |a: &mut ActorRef| {
        let actor = a.clone();
        with_world(|w| w.set_save_scope(&actor, SaveScope::None));
    });
}

fn register_vec2(engine: &mut Engine) {
    engine.register_type_with_name::<Vec2>("Vec2");
    engine.register_fn("vec2", |x: f64, y: f64| Vec2::new(x as f32, y as f32));
    engine.register_get_set(
        "x",
        |v: &mut Vec2| v.x as f64,
        |v: &mut Vec2, x: f64| v.x = x as f32,
    );
    engine.register_get_set(
        "y",
        |v: &mut Vec2| v.y as f64,
        |v: &mut Vec2, y: f64| v.y = y as f32,
    );
    engine.register_fn("+", |a: Vec2, b: Vec2| a + b);
    engine.register_fn("-", |a: Vec2, b: Vec2| a - b);
    engine.register_fn("*", |a: Vec2, s: f64| a * s as f32);
    engine.register_fn("*", |s: f64, a: Vec2| a * s as f32);
    engine.register_fn("==", |a: Vec2, b: Vec2| a == b);
    engine.register_fn("!=", |a: Vec2, b: Vec2| a != b);
    engine.register_fn("length", |v: &mut Vec2| v.length() as f64);
    engine.register_fn("normalize", |v: &mut Vec2| v.normalize_or_zero());
    engine.register_fn("dot", |a: Vec2, b: Vec2| a.dot(b) as f64);
    engine.register_fn("distance", |a: Vec2, b: Vec2| a.distance(b) as f64);
    engine.register_fn("to_string", |v: &mut Vec2| format!("({}, {})", v.x, v.y));
}

fn register_globals(engine: &mut Engine) {
    engine.register_fn("find", |name: ImmutableString| -> Dynamic {
        with_world(|w| w.find(&name).map(Dynamic::from).unwrap_or(Dynamic::UNIT))
            .unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("find_all", |name: ImmutableString| -> rhai::Array {
        with_world(|w| w.find_all(&name).into_iter().map(Dynamic::from).collect())
            .unwrap_or_default()
    });
    engine.register_fn(
        "instantiate",
        |ctx: NativeCallContext, template: ImmutableString| -> Dynamic {
            with_world(|w| match w.instantiate(ctx.engine(), &template) {
                Ok(Some(actor)) => Dynamic::from(actor),
                Ok(None) => Dynamic::UNIT,
                Err(err) => crate::runtime::fatal(&err),
            })
            .unwrap_or(Dynamic::UNIT)
        },
    );
    engine.register_fn("destroy", |actor: ActorRef| {
        with_world(|w| w.destroy(&actor));
    });
    engine.register_fn(
        "publish",
        |ctx: NativeCallContext, topic: ImmutableString, payload: Dynamic| {
            let subscribers = with_world(|w| w.bus.subscribers(&topic)).unwrap_or_default();
            deliver(ctx.engine(), &subscribers, payload);
        },
    );
    engine.register_fn(
        "subscribe",
        |topic: ImmutableString, component: Component, handler: FnPtr| {
            with_world(move |w| w.bus.queue_subscribe(&topic, component, handler));
        },
    );
    engine.register_fn(
        "unsubscribe",
        |topic: ImmutableString, component: Component, handler: FnPtr| {
            with_world(move |w| w.bus.queue_unsubscribe(&topic, component, handler));
        },
    );
    engine.register_fn("load_scene", |name: ImmutableString| {
        with_world(|w| w.next_scene = Some(name.to_string()));
    });
    engine.register_fn("current_scene", || -> ImmutableString {
        with_world(|w| w.current_scene.clone()).unwrap_or_default().into()
    });
    engine.register_fn("save_to_slot", |index: i64| {
        with_world(|w| {
            if let Err(err) = w.save_to_slot(index as i32) {
                eprintln!("error: {err:#}");
            }
        });
    });
    engine.register_fn("load_slot", |index: i64| {
        with_world(|w| {
            if let Err(err) = w.load_slot(index as i32) {
                eprintln!("error: {err:#}");
            }
        });
    });
    engine.register_fn("log", |message: ImmutableString| {
        println!("[script] {message}");
    });
    engine.register_fn("quit", || {
        with_world(|w| w.quit_requested = true);
    });
    engine.register_fn("frame", || -> i64 {
        with_world(|w| w.frame as i64).unwrap_or(0)
    });
}
