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

fn request(id: u64) -> RenderRequest {
    RenderRequest {
        id: RequestId(id),
        owner: "M1".to_string(),
        params: MaterialParams::solid([1.0, 0.0, 0.0], 0.8, 0.1),
    }
}

#[test]
fn submit_writes_config_clears_done_and_signals() {
    let dir = temp_dir("mailbox_submit");
    let mb = Mailbox::open(&dir).unwrap();
    fs::write(mb.done_path(), "1").unwrap();

    mb.submit(&request(2)).unwrap();

    assert_eq!(
        fs::read_to_string(mb.config_path()).unwrap(),
        "1,0,0,0.8,0.1"
    );
    assert!(!mb.done_path().exists());
    assert_eq!(
        mb.poll_for_signal(),
        Some(Signal {
            id: Some(RequestId(2))
        })
    );

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn done_marker_must_match_the_polled_request() {
    let dir = temp_dir("mailbox_done_match");
    let mb = Mailbox::open(&dir).unwrap();

    assert_eq!(mb.poll_done(RequestId(3)), DoneState::Pending);

    Mailbox::signal_done(&mb, &Signal { id: Some(RequestId(2)) }).unwrap();
    assert_eq!(mb.poll_done(RequestId(3)), DoneState::Pending);

    Mailbox::signal_done(&mb, &Signal { id: Some(RequestId(3)) }).unwrap();
    assert_eq!(mb.poll_done(RequestId(3)), DoneState::Ready);

    // Renderers that do not echo ids are trusted by presence alone.
    fs::write(mb.done_path(), "done").unwrap();
    assert_eq!(mb.poll_done(RequestId(9)), DoneState::Ready);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn acknowledge_keeps_a_newer_request_marker() {
    let dir = temp_dir("mailbox_ack");
    let mb = Mailbox::open(&dir).unwrap();

    mb.signal_request(Some(RequestId(1))).unwrap();
    let served = Mailbox::poll_for_signal(&mb).unwrap();

    // Editor replaces the request while the daemon is rendering.
    mb.signal_request(Some(RequestId(2))).unwrap();
    assert!(!Mailbox::acknowledge(&mb, &served));
    assert_eq!(
        Mailbox::poll_for_signal(&mb).and_then(|s| s.id),
        Some(RequestId(2))
    );

    assert!(!mb.claim_path().exists());

    let served = Mailbox::poll_for_signal(&mb).unwrap();
    assert!(Mailbox::acknowledge(&mb, &served));
    assert!(Mailbox::poll_for_signal(&mb).is_none());
    assert!(!mb.claim_path().exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn claimed_marker_yields_to_a_request_written_meanwhile() {
    let dir = temp_dir("mailbox_claim_superseded");
    let mb = Mailbox::open(&dir).unwrap();

    // Marker for request 2 set aside by the daemon while the editor already wrote request 3.
    fs::write(mb.claim_path(), "2").unwrap();
    mb.signal_request(Some(RequestId(3))).unwrap();

    mb.restore_claim(&mb.claim_path(), &mb.command_path());

    assert_eq!(
        Mailbox::poll_for_signal(&mb).and_then(|s| s.id),
        Some(RequestId(3))
    );
    assert!(!mb.claim_path().exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn clear_result_drops_the_previous_preview() {
    let dir = temp_dir("mailbox_clear_result");
    let mb = Mailbox::open(&dir).unwrap();
    fs::write(mb.preview_path(), "old").unwrap();

    assert!(RendererEndpoint::discard_result(&mb));
    assert!(!mb.preview_path().exists());
    assert!(mb.clear_result());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn untagged_signals_are_consumed_unconditionally() {
    let dir = temp_dir("mailbox_untagged");
    let mb = Mailbox::open(&dir).unwrap();

    fs::write(mb.command_path(), "render").unwrap();
    let signal = Mailbox::poll_for_signal(&mb).unwrap();
    assert_eq!(signal.id, None);
    assert!(Mailbox::acknowledge(&mb, &signal));
    assert!(!mb.command_path().exists());

    Mailbox::signal_done(&mb, &signal).unwrap();
    assert_eq!(fs::read_to_string(mb.done_path()).unwrap(), "done");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn removing_a_missing_file_succeeds() {
    let dir = temp_dir("mailbox_remove_missing");
    fs::create_dir_all(&dir).unwrap();
    assert!(remove_with_retry(
        &dir.join("nope.txt"),
        RemovalPolicy::default()
    ));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn removal_gives_up_without_error_when_target_resists() {
    let dir = temp_dir("mailbox_remove_resists");
    // A non-empty directory cannot be removed with remove_file on any platform.
    let target = dir.join("stuck");
    fs::create_dir_all(target.join("inner")).unwrap();

    let policy = RemovalPolicy {
        attempts: 3,
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    };
    assert!(!remove_with_retry(&target, policy));
    assert!(target.exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn clear_stale_removes_markers_only() {
    let dir = temp_dir("mailbox_clear_stale");
    let mb = Mailbox::open(&dir).unwrap();
    mb.write_config(&MaterialParams::solid([0.5, 0.5, 0.5], 0.5, 0.5))
        .unwrap();
    mb.signal_request(Some(RequestId(4))).unwrap();
    Mailbox::signal_done(&mb, &Signal { id: Some(RequestId(3)) }).unwrap();

    fs::write(mb.claim_path(), "2").unwrap();

    mb.clear_stale();

    assert!(!mb.claim_path().exists());
    assert!(!mb.command_path().exists());
    assert!(!mb.done_path().exists());
    assert!(mb.config_path().exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn scene_descriptors_fall_back_to_defaults() {
    let dir = temp_dir("mailbox_scene");
    let mb = Mailbox::open(&dir).unwrap();

    let scene = mb.read_scene();
    assert_eq!(scene.model, PreviewModel::default());
    assert_eq!(scene.camera, CameraConfig::default());

    fs::write(mb.camera_path(), "garbage").unwrap();
    fs::write(mb.model_path(), "primitive:torus").unwrap();
    let scene = mb.read_scene();
    assert_eq!(scene.model, PreviewModel::default());
    assert_eq!(scene.camera, CameraConfig::default());

    let cam = CameraConfig {
        position: [1.0, -3.0, 1.5],
        light_rotation_deg: 10.0,
    };
    mb.write_camera(&cam).unwrap();
    mb.write_model(&PreviewModel::Asset("thing.obj".to_string()))
        .unwrap();
    let scene = mb.read_scene();
    assert_eq!(scene.camera, cam);
    assert_eq!(scene.model, PreviewModel::Asset("thing.obj".to_string()));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_config_is_malformed() {
    let dir = temp_dir("mailbox_missing_config");
    let mb = Mailbox::open(&dir).unwrap();
    assert!(matches!(
        mb.read_config(),
        Err(SwatchError::MalformedRequest(_))
    ));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn reset_announces_readiness_after_clearing() {
    let dir = temp_dir("mailbox_ready");
    let mb = Mailbox::open(&dir).unwrap();
    mb.signal_request(Some(RequestId(1))).unwrap();
    assert!(!mb.wait_ready(Duration::from_millis(5)));

    RendererEndpoint::reset(&mb);

    assert!(mb.is_ready());
    assert!(mb.poll_for_signal().is_none());
    assert!(mb.clear_ready());
    assert!(!mb.is_ready());

    fs::remove_dir_all(&dir).ok();
}
