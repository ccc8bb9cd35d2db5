mod common;

use common::{game_config, write_file};
use osprey_engine::{Runtime, SaveScope};
use rhai::Dynamic;

fn stats_fixture(root: &std::path::Path) {
    game_config(root, "camp");
    write_file(
        root,
        "resources/behaviors/stats.rhai",
        r#"
#{ hits: 0, accuracy: 0.0, title: "", alive: true }
"#,
    );
    write_file(
        root,
        "resources/scenes/camp.scene",
        r#"{"actors":[{"name":"hero","components":{"stats":{"type":"stats"}}}]}"#,
    );
}

#[test]
fn slot_roundtrip_restores_scalars_bit_for_bit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    stats_fixture(root);

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let hero = rt.world.find("hero").expect("hero exists");
    let stats = hero.component_of_type("stats").expect("stats attached");
    stats.set_field("hits", Dynamic::from(42_i64));
    stats.set_field("accuracy", Dynamic::from(0.1_f64 + 0.2_f64));
    stats.set_field("title", Dynamic::from("knight".to_string()));
    stats.set_field("alive", Dynamic::from(false));
    rt.world.set_save_scope(&hero, SaveScope::SceneScoped);

    rt.world.save_to_slot(1).expect("save succeeds");
    rt.world.load_slot(1).expect("slot load accepted");
    rt.run_frame().expect("scene reloads from the slot");

    let hero = rt.world.find("hero").expect("hero respawned from scene file");
    let stats = hero.component_of_type("stats").expect("stats attached");
    assert_eq!(stats.get_field("hits").as_int().expect("int"), 42);
    assert_eq!(stats.get_field("accuracy").as_float().expect("float"), 0.1_f64 + 0.2_f64);
    assert_eq!(stats.get_field("title").into_string().expect("string"), "knight");
    assert!(!stats.get_field("alive").as_bool().expect("bool"));
    assert_eq!(
        hero.save_scope(),
        SaveScope::None,
        "a restored scene-scoped actor must opt back in to saving"
    );
}

#[test]
fn scope_mismatch_voids_the_actor_for_the_pass() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    stats_fixture(root);

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let hero = rt.world.find("hero").expect("hero exists");
    // Persistent actors do not belong in the scene-scoped category.
    hero.0.borrow_mut().dont_destroy_on_load = true;
    rt.world.set_save_scope(&hero, SaveScope::SceneScoped);
    rt.world.save_to_slot(1).expect("save succeeds");

    let saved = std::fs::read_to_string(root.join("saves/1/camp.save")).expect("save file");
    let doc: serde_json::Value = serde_json::from_str(&saved).expect("valid JSON");
    assert!(doc.get("hero").is_none(), "mismatched actor must be voided");
}

#[test]
fn unmatched_cross_scene_records_materialize_phantom_actors() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    stats_fixture(root);
    write_file(
        root,
        "resources/actor_templates/companion.template",
        r#"{"name":"companion","dont_destroy_on_load":true,
            "components":{"stats":{"type":"stats"}}}"#,
    );

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let companion = rt
        .world
        .instantiate(&rt.scripts.engine, "companion")
        .expect("template resolves")
        .expect("spawn accepted");
    let stats = companion.component_of_type("stats").expect("stats attached");
    stats.set_field("hits", Dynamic::from(7_i64));
    rt.world.set_save_scope(&companion, SaveScope::CrossScene);

    rt.world.save_to_slot(2).expect("save succeeds");
    rt.world.load_slot(2).expect("slot load accepted");
    rt.run_frame().expect("scene reloads; companion is not in the scene file");

    let phantom = rt.world.find("companion").expect("phantom materialized");
    assert!(phantom.is_persistent());
    assert_eq!(phantom.save_scope(), SaveScope::CrossScene);
    let stats = phantom.component_of_type("stats").expect("stats rebuilt from type");
    assert_eq!(stats.get_field("hits").as_int().expect("int"), 7);
}

#[test]
fn out_of_range_slots_are_reported_not_fatal() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    stats_fixture(root);

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    rt.world.save_to_slot(99).expect("rejection is not an error");
    assert!(!root.join("saves/99").exists());
    rt.world.load_slot(0).expect("rejection is not an error");
    assert_eq!(rt.world.current_scene, "camp");
}

#[test]
fn reserved_and_missing_scene_names_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    stats_fixture(root);

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let err = rt
        .world
        .load_scene(&rt.scripts, "system")
        .expect_err("the system scene name is reserved");
    assert!(format!("{err:#}").contains("reserved"));
    assert!(rt.world.load_scene(&rt.scripts, "nowhere").is_err());
}

#[test]
fn disabled_state_survives_the_roundtrip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path();
    stats_fixture(root);

    let mut rt = Runtime::new(root).expect("runtime boots");
    rt.run_frame().expect("first frame");
    let hero = rt.world.find("hero").expect("hero exists");
    let stats = hero.component_of_type("stats").expect("stats attached");
    stats.set_enabled(false);
    rt.world.set_save_scope(&hero, SaveScope::SceneScoped);

    rt.world.save_to_slot(1).expect("save succeeds");
    rt.world.load_slot(1).expect("slot load accepted");
    rt.run_frame().expect("scene reloads");

    let hero = rt.world.find("hero").expect("hero respawned");
    let stats = hero.component_of_type("stats").expect("stats attached");
    assert!(!stats.enabled(), "enabled persists with the snapshot");
}
