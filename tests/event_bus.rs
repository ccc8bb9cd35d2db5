mod common;

use common::{game_config, write_file};
use osprey_engine::Runtime;
use rhai::Dynamic;

fn listener_fixture(root: &std::path::Path) {
    game_config(root, "main");
    write_file(
        root,
        "resources/behaviors/listener.rhai",
        r#"
fn on_start() {
    subscribe("ping", this, Fn("on_ping"));
}
fn on_ping(component, payload) {
    component.pings += payload;
}
#{ pings: 0 }
"#,
    );
}

#[test]
fn subscriptions_defer_until_end_of_frame() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    listener_fixture(root);
    write_file(
        root,
        "resources/behaviors/broadcaster.rhai",
        r#"
fn on_update() {
    publish("ping", 1);
}
#{}
"#,
    );
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[
            {"name":"listener","components":{"l":{"type":"listener"}}},
            {"name":"broadcaster","components":{"b":{"type":"broadcaster"}}}
        ]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let listener = rt
        .world
        .find("listener")
        .expect("listener exists")
        .component_of_type("listener")
        .expect("listener component");
    // The subscription queued during on_start; the same frame's publish
    // walked an empty live table.
    assert_eq!(listener.get_field("pings").as_int().expect("int"), 0);

    rt.run_frame().expect("second frame");
    assert_eq!(listener.get_field("pings").as_int().expect("int"), 1);
}

#[test]
fn duplicate_subscriptions_collapse_and_unsubscribe_removes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    listener_fixture(root);
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[{"name":"listener","components":{"l":{"type":"listener"}}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame subscribes once");
    let listener = rt
        .world
        .find("listener")
        .expect("listener exists")
        .component_of_type("listener")
        .expect("listener component");
    let handler = rhai::FnPtr::new("on_ping").expect("fn ptr");

    // A second identical subscription is ignored at flush.
    rt.world.bus.queue_subscribe("ping", listener.clone(), handler.clone());
    rt.world.bus.flush();
    rt.scripts.publish(&mut rt.world, "ping", Dynamic::from(1_i64));
    assert_eq!(listener.get_field("pings").as_int().expect("int"), 1);

    rt.world.bus.queue_unsubscribe("ping", listener.clone(), handler);
    rt.world.bus.flush();
    rt.scripts.publish(&mut rt.world, "ping", Dynamic::from(1_i64));
    assert_eq!(listener.get_field("pings").as_int().expect("int"), 1, "no live subscriber left");
}

#[test]
fn purge_drops_the_component_from_every_pending_table() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    listener_fixture(root);
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[{"name":"listener","components":{"l":{"type":"listener"}}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let actor = rt.world.find("listener").expect("listener exists");
    let listener = actor.component_of_type("listener").expect("listener component");
    let handler = rhai::FnPtr::new("on_ping").expect("fn ptr");

    // Trim the component while an unsubscribe for it is still queued; the
    // purge must take the queued entry with it.
    rt.world.bus.queue_unsubscribe("ping", listener.clone(), handler);
    rt.world.request_remove_component(&actor, &listener);
    rt.world.flush_component_removes(&rt.scripts);
    rt.world.bus.flush();

    rt.scripts.publish(&mut rt.world, "ping", Dynamic::from(3_i64));
    assert_eq!(listener.get_field("pings").as_int().expect("int"), 0);
}

#[test]
fn component_removal_purges_its_subscriptions() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    listener_fixture(root);
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[{"name":"listener","components":{"l":{"type":"listener"}}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let actor = rt.world.find("listener").expect("listener exists");
    let listener = actor.component_of_type("listener").expect("listener component");

    rt.world.request_remove_component(&actor, &listener);
    rt.run_frame().expect("second frame trims the component");

    rt.scripts.publish(&mut rt.world, "ping", Dynamic::from(5_i64));
    assert_eq!(listener.get_field("pings").as_int().expect("int"), 0);
}
