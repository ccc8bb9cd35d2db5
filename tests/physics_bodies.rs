mod common;

use common::{game_config, write_file};
use osprey_engine::Runtime;

fn body_fixture(root: &std::path::Path) {
    game_config(root, "pit");
    write_file(
        root,
        "resources/scenes/pit.scene",
        r#"{"actors":[{"name":"crate","components":{"body":{
            "type":"Rigidbody","x":3.0,"y":0.0
        }}}]}"#,
    );
}

#[test]
fn dynamic_bodies_fall_under_gravity() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    body_fixture(root);

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame attaches the body");
    let body = rt
        .world
        .find("crate")
        .expect("crate exists")
        .component_of_type("Rigidbody")
        .expect("body attached");
    let handle = body.with_body(|b| b.handle).flatten().expect("rapier handle set");

    for _ in 0..10 {
        rt.run_frame().expect("frame");
    }
    let position = rt.world.physics.body_position(handle).expect("body still live");
    assert!(position.y > 0.0, "positive y is down, the body should have fallen");
    assert!((position.x - 3.0).abs() < 1e-3, "no lateral force applied");
}

#[test]
fn destroying_the_actor_detaches_its_body() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    body_fixture(root);

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame attaches the body");
    assert_eq!(rt.world.physics.bodies.len(), 1);

    let actor = rt.world.find("crate").expect("crate exists");
    rt.world.destroy(&actor);
    rt.run_frame().expect("flush the destroy");
    assert_eq!(rt.world.physics.bodies.len(), 0, "teardown releases the rapier body");
}
