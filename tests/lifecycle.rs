mod common;

use common::{game_config, write_file};
use osprey_engine::Runtime;

fn counter_behavior(root: &std::path::Path) {
    write_file(
        root,
        "resources/behaviors/counter.rhai",
        r#"
#{ count: 0 }
"#,
    );
}

#[test]
fn destroy_during_update_defers_removal_to_end_of_frame() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "arena");
    write_file(
        root,
        "resources/behaviors/self_reaper.rhai",
        r#"
fn on_update() {
    destroy(this.actor);
}
#{}
"#,
    );
    write_file(
        root,
        "resources/scenes/arena.scene",
        r#"{"actors":[
            {"name":"doomed_a","components":{"r":{"type":"self_reaper"}}},
            {"name":"doomed_b","components":{"r":{"type":"self_reaper"}}}
        ]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    assert!(rt.world.find("doomed_a").is_none(), "destroyed actor still findable");
    assert!(rt.world.find("doomed_b").is_none(), "destroyed actor still findable");
    assert!(rt.world.actors.is_empty(), "flush should have removed both actors");
}

#[test]
fn double_destroy_fires_destroy_callback_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "arena");
    counter_behavior(root);
    write_file(
        root,
        "resources/behaviors/notifier.rhai",
        r#"
fn on_destroy() {
    let watcher = find("watcher");
    if watcher != () {
        let tally = watcher.get_component("counter");
        tally.count += 1;
    }
}
#{}
"#,
    );
    write_file(
        root,
        "resources/scenes/arena.scene",
        r#"{"actors":[
            {"name":"victim","components":{"n":{"type":"notifier"}}},
            {"name":"watcher","components":{"tally":{"type":"counter"}}}
        ]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let victim = rt.world.find("victim").expect("victim exists");
    rt.world.destroy(&victim);
    rt.world.destroy(&victim);
    rt.run_frame().expect("second frame");

    let watcher = rt.world.find("watcher").expect("watcher survives");
    let tally = watcher.component_of_type("counter").expect("counter attached");
    assert_eq!(tally.get_field("count").as_int().expect("count is int"), 1);
}

#[test]
fn runtime_added_component_invisible_until_flush() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "arena");
    counter_behavior(root);
    write_file(
        root,
        "resources/scenes/arena.scene",
        r#"{"actors":[{"name":"host","components":{}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let host = rt.world.find("host").expect("host exists");
    let pending = rt
        .world
        .request_add_component(&rt.scripts.engine, &host, "counter")
        .expect("behavior resolves")
        .expect("actor accepts the add");

    assert!(host.component_of_type("counter").is_none(), "pending add already visible");
    assert!(pending.key().starts_with('r'), "runtime keys use the r<N> scheme");

    rt.run_frame().expect("second frame flushes the add");
    let live = host.component_of_type("counter").expect("component attached after flush");
    assert!(live.ptr_eq(&pending));
}

#[test]
fn double_remove_request_queues_once_and_destroys_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "arena");
    counter_behavior(root);
    write_file(
        root,
        "resources/behaviors/notifier.rhai",
        r#"
fn on_destroy() {
    let watcher = find("watcher");
    if watcher != () {
        let tally = watcher.get_component("counter");
        tally.count += 1;
    }
}
#{}
"#,
    );
    write_file(
        root,
        "resources/scenes/arena.scene",
        r#"{"actors":[
            {"name":"host","components":{"n":{"type":"notifier"}}},
            {"name":"watcher","components":{"tally":{"type":"counter"}}}
        ]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let host = rt.world.find("host").expect("host exists");
    let component = host.component_of_type("notifier").expect("notifier attached");

    rt.world.request_remove_component(&host, &component);
    rt.world.request_remove_component(&host, &component);
    assert!(component.is_removed(), "marked removed immediately");
    assert!(host.component_of_type("notifier").is_none(), "removed components skip lookups");

    rt.run_frame().expect("second frame trims the component");
    let watcher = rt.world.find("watcher").expect("watcher survives");
    let tally = watcher.component_of_type("counter").expect("counter attached");
    assert_eq!(tally.get_field("count").as_int().expect("count is int"), 1);
}

#[test]
fn phase_membership_is_fixed_at_attach_time() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "arena");
    counter_behavior(root);
    write_file(
        root,
        "resources/scenes/arena.scene",
        r#"{"actors":[{"name":"idle","components":{"tally":{"type":"counter"}}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    // A behavior with no callbacks schedules nothing, and writing fields
    // later never changes that.
    assert!(rt.world.update_roster().is_empty());
    let idle = rt.world.find("idle").expect("idle exists");
    let tally = idle.component_of_type("counter").expect("counter attached");
    tally.set_field("on_update", rhai::Dynamic::from("not a callback".to_string()));
    rt.run_frame().expect("second frame");
    assert!(rt.world.update_roster().is_empty());
}
