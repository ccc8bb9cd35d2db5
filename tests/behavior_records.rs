mod common;

use common::{game_config, write_file};
use osprey_engine::Runtime;

#[test]
fn prototype_defaults_shared_until_first_write() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "main");
    write_file(
        root,
        "resources/behaviors/mover.rhai",
        r#"
#{ speed: 5, label: "drone" }
"#,
    );
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[
            {"name":"a","components":{"m":{"type":"mover"}}},
            {"name":"b","components":{"m":{"type":"mover"}}}
        ]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let a = rt.world.find("a").expect("a exists").component_of_type("mover").expect("mover");
    let b = rt.world.find("b").expect("b exists").component_of_type("mover").expect("mover");

    assert_eq!(a.get_field("speed").as_int().expect("int"), 5);
    assert!(!a.has_own_field("speed"), "untouched fields read through to the prototype");

    a.set_field("speed", rhai::Dynamic::from(9_i64));
    assert_eq!(a.get_field("speed").as_int().expect("int"), 9);
    assert!(a.has_own_field("speed"));
    assert_eq!(b.get_field("speed").as_int().expect("int"), 5, "sibling sees the default");
}

#[test]
fn definition_overrides_apply_flat_scalars_only() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "main");
    write_file(
        root,
        "resources/behaviors/mover.rhai",
        r#"
#{ speed: 5, waypoints: [1, 2] }
"#,
    );
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[{"name":"a","components":{"m":{
            "type":"mover","speed":12,"tag":"fast","waypoints":[9,9,9]
        }}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let mover =
        rt.world.find("a").expect("a exists").component_of_type("mover").expect("mover");
    assert_eq!(mover.get_field("speed").as_int().expect("int"), 12);
    assert_eq!(
        mover.get_field("tag").into_string().expect("string"),
        "fast",
        "string overrides introduce new fields"
    );
    let waypoints = mover.get_field("waypoints").into_array().expect("array");
    assert_eq!(waypoints.len(), 2, "array overrides are ignored, prototype value stands");
}

#[test]
fn callbacks_run_with_the_component_bound_as_this() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "main");
    write_file(
        root,
        "resources/behaviors/greeter.rhai",
        r#"
fn on_start() {
    this.started_by = this.actor.name();
}
fn on_update() {
    this.updates += 1;
}
#{ updates: 0, started_by: "" }
"#,
    );
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[{"name":"greeter","components":{"g":{"type":"greeter"}}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    rt.run_frame().expect("second frame");
    let greeter =
        rt.world.find("greeter").expect("exists").component_of_type("greeter").expect("greeter");
    assert_eq!(greeter.get_field("started_by").into_string().expect("string"), "greeter");
    assert_eq!(greeter.get_field("updates").as_int().expect("int"), 2);
}

#[test]
fn unknown_fields_and_structural_fields_behave() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "main");
    write_file(root, "resources/behaviors/mover.rhai", "#{ speed: 5 }\n");
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[{"name":"a","components":{"m":{"type":"mover"}}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let mover =
        rt.world.find("a").expect("a exists").component_of_type("mover").expect("mover");

    assert!(mover.get_field("nonexistent").is_unit());
    assert_eq!(mover.get_field("key").into_string().expect("string"), "m");
    assert_eq!(mover.get_field("type").into_string().expect("string"), "mover");
    assert!(mover.get_field("enabled").as_bool().expect("bool"));

    // Structural fields other than `enabled` are read-only.
    mover.set_field("key", rhai::Dynamic::from("hijack".to_string()));
    assert_eq!(mover.get_field("key").into_string().expect("string"), "m");
    mover.set_field("enabled", rhai::Dynamic::from(false));
    assert!(!mover.enabled());
}

#[test]
fn missing_behavior_definition_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    game_config(root, "main");
    write_file(
        root,
        "resources/scenes/main.scene",
        r#"{"actors":[{"name":"a","components":{"m":{"type":"ghost"}}}]}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    let err = rt.run_frame().expect_err("unresolvable behavior should fail the load");
    assert!(format!("{err:#}").contains("ghost"));
}
