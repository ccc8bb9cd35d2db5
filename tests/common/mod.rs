use std::fs;
use std::path::Path;

pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("fixture parent")).expect("create fixture dirs");
    fs::write(path, contents).expect("write fixture");
}

pub fn game_config(root: &Path, initial_scene: &str) {
    write_file(
        root,
        "resources/game.config",
        &format!(r#"{{"game_title":"Fixture Game","initial_scene":"{initial_scene}"}}"#),
    );
}
