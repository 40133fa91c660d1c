use super::*;

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "swatch_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

#[test]
fn layout_paths_follow_the_project_convention() {
    let layout = ProjectLayout::new("/p");
    assert_eq!(
        layout.material_preview_path("Brick"),
        PathBuf::from("/p/materials/Brick/preview.png")
    );
    assert_eq!(
        layout.material_textures_dir("Brick"),
        PathBuf::from("/p/materials/Brick/textures")
    );
    assert_eq!(layout.pid_path(), PathBuf::from("/p/daemon_pid.txt"));
    assert_eq!(layout.mailbox_dir(), PathBuf::from("/p/.mailbox"));
    assert_eq!(
        layout.resolve("materials/Brick/textures/a.png"),
        PathBuf::from("/p/materials/Brick/textures/a.png")
    );
    assert_eq!(layout.resolve("/abs/a.png"), PathBuf::from("/abs/a.png"));
}

#[test]
fn missing_settings_file_yields_defaults() {
    let dir = temp_dir("settings_missing");
    let layout = ProjectLayout::new(&dir);
    let s = ProjectSettings::load(&layout).unwrap();
    assert_eq!(s, ProjectSettings::default());
    assert!(s.engine_path.is_none());
}

#[test]
fn settings_round_trip_through_json() {
    let dir = temp_dir("settings_round_trip");
    let layout = ProjectLayout::new(&dir);
    layout.create_dirs().unwrap();

    let mut s = ProjectSettings::default();
    s.engine_path = Some(PathBuf::from("/opt/renderer"));
    s.preview_model = PreviewModel::Primitive(crate::ipc::wire::Primitive::Cube);
    s.timings.debounce_ms = 10;
    s.save(&layout).unwrap();

    assert_eq!(ProjectSettings::load(&layout).unwrap(), s);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn malformed_settings_are_a_configuration_error() {
    let dir = temp_dir("settings_malformed");
    std::fs::create_dir_all(&dir).unwrap();
    let layout = ProjectLayout::new(&dir);
    std::fs::write(layout.settings_path(), "{ not json").unwrap();

    let err = ProjectSettings::load(&layout).unwrap_err();
    assert!(matches!(err, SwatchError::Configuration(_)), "{err}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn launch_spec_substitutes_placeholders() {
    let layout = ProjectLayout::new("/proj");
    let mut s = ProjectSettings::default();
    s.engine_args.push("--root={project}".to_string());
    let spec = s.launch_spec(&layout);
    assert_eq!(
        spec.args,
        vec!["daemon", "--mailbox", "/proj/.mailbox", "--root=/proj"]
    );
}

#[test]
fn partial_settings_fill_in_defaults() {
    let s: ProjectSettings = serde_json::from_str(r#"{"engine_path":"/bin/r"}"#).unwrap();
    assert_eq!(s.engine_path, Some(PathBuf::from("/bin/r")));
    assert_eq!(s.engine_args, ProjectSettings::default().engine_args);
    assert_eq!(s.timings, Timings::default());
}
