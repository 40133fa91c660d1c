use std::fs;
use std::path::PathBuf;

use super::*;
use crate::ipc::mailbox::Mailbox;
use crate::ipc::wire::PreviewModel;
use crate::ipc::{EditorEndpoint, RenderRequest};

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

#[derive(Default)]
struct RecordingEngine {
    jobs: Vec<RenderJob>,
    fail: bool,
    panic: bool,
    write_nothing: bool,
    during_render: Option<Box<dyn FnMut()>>,
}

impl RenderEngine for RecordingEngine {
    fn render(&mut self, job: &RenderJob, out: &Path) -> SwatchResult<()> {
        self.jobs.push(job.clone());
        if let Some(hook) = self.during_render.as_mut() {
            hook();
        }
        if self.panic {
            panic!("engine exploded");
        }
        if self.fail {
            return Err(SwatchError::engine("scene missing"));
        }
        if self.write_nothing {
            return Ok(());
        }
        fs::write(out, job.params.encode().unwrap()).unwrap();
        Ok(())
    }
}

fn fast_opts() -> DaemonOpts {
    DaemonOpts {
        poll_interval: Duration::from_millis(5),
        read_attempts: 2,
        read_retry_delay: Duration::from_millis(1),
        ..DaemonOpts::default()
    }
}

fn request(id: u64, params: MaterialParams) -> RenderRequest {
    RenderRequest {
        id: RequestId(id),
        owner: "M1".to_string(),
        params,
    }
}

#[test]
fn stale_markers_are_cleared_before_the_first_poll() {
    let dir = temp_dir("daemon_restart");
    let mb = Mailbox::open(&dir).unwrap();
    mb.write_config(&MaterialParams::solid([0.2, 0.2, 0.2], 0.5, 0.5))
        .unwrap();
    fs::write(mb.command_path(), "7").unwrap();
    fs::write(mb.done_path(), "7").unwrap();

    let mut daemon = DaemonLoop::new(mb.clone(), RecordingEngine::default(), fast_opts());
    assert_eq!(daemon.step(), StepOutcome::Idle);
    assert!(daemon.engine().jobs.is_empty());
    assert!(!mb.done_path().exists());
    assert!(!mb.command_path().exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn serves_a_request_and_echoes_its_id() {
    let dir = temp_dir("daemon_serve");
    let mb = Mailbox::open(&dir).unwrap();
    let mut daemon = DaemonLoop::new(mb.clone(), RecordingEngine::default(), fast_opts());
    daemon.start();

    let params = MaterialParams::solid([1.0, 0.0, 0.0], 0.8, 0.1);
    mb.submit(&request(5, params.clone())).unwrap();

    assert_eq!(daemon.step(), StepOutcome::Rendered(Some(RequestId(5))));
    assert_eq!(daemon.state(), DaemonState::Idle);
    assert_eq!(daemon.served(), 1);
    assert_eq!(daemon.engine().jobs[0].params, params);
    assert_eq!(daemon.engine().jobs[0].resolution, Resolution::PREVIEW);
    assert_eq!(daemon.engine().jobs[0].scene.model, PreviewModel::default());
    assert_eq!(fs::read_to_string(mb.done_path()).unwrap(), "5");
    assert!(!mb.command_path().exists());
    assert_eq!(daemon.step(), StepOutcome::Idle);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn same_request_twice_renders_twice_with_equal_results() {
    let dir = temp_dir("daemon_idempotent");
    let mb = Mailbox::open(&dir).unwrap();
    let mut daemon = DaemonLoop::new(mb.clone(), RecordingEngine::default(), fast_opts());
    daemon.start();
    let params = MaterialParams::solid([0.3, 0.6, 0.9], 0.4, 0.2);

    mb.submit(&request(1, params.clone())).unwrap();
    assert_eq!(daemon.step(), StepOutcome::Rendered(Some(RequestId(1))));
    let first = fs::read(mb.preview_path()).unwrap();

    mb.submit(&request(2, params)).unwrap();
    assert!(!mb.done_path().exists());
    assert_eq!(daemon.step(), StepOutcome::Rendered(Some(RequestId(2))));
    let second = fs::read(mb.preview_path()).unwrap();

    assert_eq!(daemon.served(), 2);
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(mb.done_path()).unwrap(), "2");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn malformed_config_abandons_without_completion() {
    let dir = temp_dir("daemon_malformed");
    let mb = Mailbox::open(&dir).unwrap();
    let mut daemon = DaemonLoop::new(mb.clone(), RecordingEngine::default(), fast_opts());
    daemon.start();

    fs::write(mb.config_path(), "1,0,zero").unwrap();
    mb.signal_request(Some(RequestId(3))).unwrap();

    let outcome = daemon.step();
    assert!(matches!(
        outcome,
        StepOutcome::Abandoned {
            id: Some(RequestId(3)),
            ..
        }
    ));
    assert!(daemon.engine().jobs.is_empty());
    assert!(!mb.done_path().exists());
    assert!(!mb.command_path().exists());
    assert_eq!(daemon.state(), DaemonState::Idle);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn short_legacy_tuple_and_untagged_marker_are_served() {
    let dir = temp_dir("daemon_legacy");
    let mb = Mailbox::open(&dir).unwrap();
    let mut daemon = DaemonLoop::new(mb.clone(), RecordingEngine::default(), fast_opts());
    daemon.start();

    fs::write(mb.config_path(), "0.5,0.5,0.5,0.25,0.75").unwrap();
    fs::write(mb.command_path(), "render").unwrap();

    assert_eq!(daemon.step(), StepOutcome::Rendered(None));
    assert_eq!(daemon.engine().jobs[0].params.albedo_map, None);
    assert_eq!(fs::read_to_string(mb.done_path()).unwrap(), "done");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn engine_failure_and_panic_leave_no_completion() {
    let dir = temp_dir("daemon_engine_failure");
    let mb = Mailbox::open(&dir).unwrap();
    let params = MaterialParams::solid([0.1, 0.1, 0.1], 0.1, 0.1);

    let engine = RecordingEngine {
        fail: true,
        ..RecordingEngine::default()
    };
    let mut daemon = DaemonLoop::new(mb.clone(), engine, fast_opts());
    daemon.start();
    mb.submit(&request(1, params.clone())).unwrap();
    assert!(matches!(daemon.step(), StepOutcome::Abandoned { .. }));
    assert!(!mb.done_path().exists());
    assert_eq!(daemon.served(), 0);

    let engine = RecordingEngine {
        panic: true,
        ..RecordingEngine::default()
    };
    let mut daemon = DaemonLoop::new(mb.clone(), engine, fast_opts());
    daemon.start();
    mb.submit(&request(2, params)).unwrap();
    assert!(matches!(daemon.step(), StepOutcome::Abandoned { .. }));
    assert!(!mb.done_path().exists());
    assert_eq!(daemon.state(), DaemonState::Idle);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn silent_engine_never_republishes_the_previous_image() {
    let dir = temp_dir("daemon_silent_engine");
    let mb = Mailbox::open(&dir).unwrap();
    let engine = RecordingEngine {
        write_nothing: true,
        ..RecordingEngine::default()
    };
    let mut daemon = DaemonLoop::new(mb.clone(), engine, fast_opts());
    daemon.start();

    fs::write(mb.preview_path(), "OLD IMAGE").unwrap();
    mb.submit(&request(1, MaterialParams::solid([0.4, 0.4, 0.4], 0.5, 0.5)))
        .unwrap();

    assert!(matches!(
        daemon.step(),
        StepOutcome::Abandoned {
            id: Some(RequestId(1)),
            ..
        }
    ));
    assert_eq!(mb.poll_done(RequestId(1)), crate::ipc::DoneState::Pending);
    assert!(!mb.done_path().exists());
    assert!(!mb.preview_path().exists());
    assert_eq!(daemon.served(), 0);

    fs::remove_dir_all(&dir).ok();
}

#[cfg(unix)]
#[test]
fn external_engine_exiting_cleanly_without_output_is_abandoned() {
    use crate::daemon::command::CommandEngine;

    let dir = temp_dir("daemon_true_engine");
    let mb = Mailbox::open(&dir).unwrap();
    let mut daemon = DaemonLoop::new(
        mb.clone(),
        CommandEngine::new("/bin/true", Vec::new()),
        fast_opts(),
    );
    daemon.start();

    fs::write(mb.preview_path(), "OLD IMAGE").unwrap();
    mb.submit(&request(1, MaterialParams::solid([0.4, 0.4, 0.4], 0.5, 0.5)))
        .unwrap();

    assert!(matches!(daemon.step(), StepOutcome::Abandoned { .. }));
    assert_eq!(mb.poll_done(RequestId(1)), crate::ipc::DoneState::Pending);
    assert!(mb.read_result().is_err());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn request_written_during_render_waits_for_the_next_iteration() {
    let dir = temp_dir("daemon_superseded");
    let mb = Mailbox::open(&dir).unwrap();

    let writer = mb.clone();
    let engine = RecordingEngine {
        during_render: Some(Box::new(move || {
            if writer.poll_for_signal().and_then(|s| s.id) == Some(RequestId(1)) {
                writer
                    .submit(&request(
                        2,
                        MaterialParams::solid([0.0, 1.0, 0.0], 0.5, 0.5),
                    ))
                    .unwrap();
            }
        })),
        ..RecordingEngine::default()
    };
    let mut daemon = DaemonLoop::new(mb.clone(), engine, fast_opts());
    daemon.start();

    mb.submit(&request(1, MaterialParams::solid([1.0, 0.0, 0.0], 0.5, 0.5)))
        .unwrap();

    assert_eq!(daemon.step(), StepOutcome::Rendered(Some(RequestId(1))));
    assert_eq!(
        mb.poll_for_signal().and_then(|s| s.id),
        Some(RequestId(2)),
        "newer marker must survive the acknowledgement of the older one"
    );

    assert_eq!(daemon.step(), StepOutcome::Rendered(Some(RequestId(2))));
    assert_eq!(daemon.engine().jobs[1].params.albedo, [0.0, 1.0, 0.0]);
    assert_eq!(fs::read_to_string(mb.done_path()).unwrap(), "2");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn run_stops_on_shutdown_flag() {
    let dir = temp_dir("daemon_run");
    let mb = Mailbox::open(&dir).unwrap();
    let mut daemon = DaemonLoop::new(mb, RecordingEngine::default(), fast_opts());
    let shutdown = AtomicBool::new(true);
    assert_eq!(daemon.run(&shutdown), 0);
    fs::remove_dir_all(&dir).ok();
}
