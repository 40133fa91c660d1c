use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::RequestId;
use crate::foundation::error::{SwatchError, SwatchResult};
use crate::ipc::wire::{CameraConfig, MaterialParams, PreviewModel};
use crate::ipc::{DoneState, EditorEndpoint, RenderRequest, RendererEndpoint, SceneSetup, Signal};

/// Material params tuple, written by the editor.
pub const CONFIG_FILE: &str = "material_config.txt";
/// Request marker, written by the editor; its presence is the trigger.
pub const COMMAND_FILE: &str = "command.txt";
/// Completion marker, written by the daemon after the image.
pub const DONE_FILE: &str = "done.txt";
/// Rendered preview image.
pub const PREVIEW_FILE: &str = "preview.png";
/// Camera/light tuple, written by the editor.
pub const CAMERA_FILE: &str = "camera_config.txt";
/// Directory with the model descriptor and imported model assets.
pub const MODEL_DIR: &str = "preview_model";
/// Model descriptor inside [`MODEL_DIR`].
pub const MODEL_FILE: &str = "model.txt";
/// Written by the daemon once stale markers are cleared; holds its pid.
pub const READY_FILE: &str = "daemon_ready.txt";

const UNTAGGED_DONE: &str = "done";
const TMP_SUFFIX: &str = ".tmp";
const CLAIM_SUFFIX: &str = ".ack";

/// Bounded retry schedule for removing mailbox files that another process may hold open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovalPolicy {
    pub attempts: u32,
    /// Delay after the first failed attempt; grows linearly per attempt.
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(200),
        }
    }
}

/// Remove `path`, retrying transient failures.
///
/// A missing file counts as removed. Returns `false` (after logging) once the attempts are
/// exhausted; never returns an error so the mailbox stays usable while a file resists deletion.
pub fn remove_with_retry(path: &Path, policy: RemovalPolicy) -> bool {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match fs::remove_file(path) {
            Ok(()) => return true,
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                tracing::debug!(path = %path.display(), attempt, error = %e, "mailbox file busy");
                last_err = Some(e);
                if attempt < attempts {
                    let delay = policy.backoff.saturating_mul(attempt).min(policy.max_backoff);
                    thread::sleep(delay);
                }
            }
        }
    }
    tracing::warn!(
        path = %path.display(),
        attempts,
        error = %last_err.map(|e| e.to_string()).unwrap_or_default(),
        "could not remove mailbox file; leaving it in place"
    );
    false
}

/// Write through a sibling temp file and rename, so readers see either the old or the new
/// content, never a prefix.
fn write_atomic(path: &Path, contents: &[u8]) -> SwatchResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).with_context(|| format!("write '{}'", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename '{}' -> '{}'", tmp.display(), path.display()))?;
    Ok(())
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => Some(s),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "mailbox file not readable yet");
            None
        }
    }
}

/// At-most-one-pending-request channel made of fixed-name files in one directory.
#[derive(Clone, Debug)]
pub struct Mailbox {
    dir: PathBuf,
    removal: RemovalPolicy,
}

impl Mailbox {
    /// Open (and create if needed) the mailbox directory.
    pub fn open(dir: impl Into<PathBuf>) -> SwatchResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(MODEL_DIR))
            .with_context(|| format!("create mailbox directory '{}'", dir.display()))?;
        Ok(Self {
            dir,
            removal: RemovalPolicy::default(),
        })
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal = policy;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn command_path(&self) -> PathBuf {
        self.dir.join(COMMAND_FILE)
    }

    pub fn done_path(&self) -> PathBuf {
        self.dir.join(DONE_FILE)
    }

    pub fn preview_path(&self) -> PathBuf {
        self.dir.join(PREVIEW_FILE)
    }

    pub fn camera_path(&self) -> PathBuf {
        self.dir.join(CAMERA_FILE)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.dir.join(MODEL_DIR)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join(MODEL_FILE)
    }

    pub fn ready_path(&self) -> PathBuf {
        self.dir.join(READY_FILE)
    }

    /// Announce that the daemon has cleared stale markers and polls for requests.
    pub fn mark_ready(&self) -> SwatchResult<()> {
        write_atomic(&self.ready_path(), std::process::id().to_string().as_bytes())
    }

    pub fn clear_ready(&self) -> bool {
        remove_with_retry(&self.ready_path(), self.removal)
    }

    pub fn is_ready(&self) -> bool {
        self.ready_path().is_file()
    }

    /// Block until the daemon announced readiness or `timeout` passed.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Overwrite the material params tuple.
    pub fn write_config(&self, params: &MaterialParams) -> SwatchResult<()> {
        let line = params.encode()?;
        write_atomic(&self.config_path(), line.as_bytes())
    }

    /// Read the material params tuple. A missing file is a malformed request.
    pub fn read_config(&self) -> SwatchResult<MaterialParams> {
        let Some(raw) = read_optional(&self.config_path()) else {
            return Err(SwatchError::malformed("material config is missing"));
        };
        MaterialParams::parse(&raw)
    }

    /// Remove a completion marker left by an earlier transaction.
    pub fn clear_done(&self) -> bool {
        remove_with_retry(&self.done_path(), self.removal)
    }

    /// Create the request marker. `id` is echoed back in the completion marker.
    pub fn signal_request(&self, id: Option<RequestId>) -> SwatchResult<()> {
        let content = id.map(|id| id.to_string()).unwrap_or_default();
        write_atomic(&self.command_path(), content.as_bytes())
    }

    /// The pending request marker, if any. Unreadable markers count as absent for this poll.
    pub fn poll_for_signal(&self) -> Option<Signal> {
        read_optional(&self.command_path()).map(|content| Signal {
            id: RequestId::parse_marker(&content),
        })
    }

    /// Consume the request marker after serving `signal`.
    ///
    /// A tagged marker is first claimed by renaming it aside, so a request the editor writes at
    /// the same moment lands in a fresh marker instead of being deleted. If the claimed marker
    /// turns out to carry a newer id it is put back. Untagged signals are removed
    /// unconditionally. Returns whether the served marker is gone.
    pub fn acknowledge(&self, signal: &Signal) -> bool {
        let command = self.command_path();
        let Some(served) = signal.id else {
            return remove_with_retry(&command, self.removal);
        };

        let claim = self.claim_path();
        match fs::rename(&command, &claim) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                tracing::warn!(path = %command.display(), error = %e, "could not claim request marker");
                return false;
            }
        }

        let claimed = read_optional(&claim).and_then(|c| RequestId::parse_marker(&c));
        if claimed == Some(served) {
            return remove_with_retry(&claim, self.removal);
        }
        tracing::debug!(
            served = %served,
            pending = ?claimed,
            "newer request arrived during render; keeping its marker"
        );
        self.restore_claim(&claim, &command);
        false
    }

    /// Put a claimed marker back unless the editor already wrote an even newer one.
    fn restore_claim(&self, claim: &Path, command: &Path) {
        match fs::hard_link(claim, command) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!("claimed marker superseded while it was set aside");
            }
            Err(e) => {
                // No hard links on this file system; a plain rename still restores the marker.
                tracing::debug!(error = %e, "hard link unavailable; restoring by rename");
                if !command.exists() {
                    if let Err(e) = fs::rename(claim, command) {
                        tracing::warn!(path = %command.display(), error = %e, "could not restore request marker");
                    }
                    return;
                }
            }
        }
        remove_with_retry(claim, self.removal);
    }

    fn claim_path(&self) -> PathBuf {
        self.dir.join(format!("{COMMAND_FILE}{CLAIM_SUFFIX}"))
    }

    /// Remove the previous preview image before a new render.
    pub fn clear_result(&self) -> bool {
        remove_with_retry(&self.preview_path(), self.removal)
    }

    /// Create the completion marker for `signal`.
    pub fn signal_done(&self, signal: &Signal) -> SwatchResult<()> {
        let content = signal
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| UNTAGGED_DONE.to_string());
        write_atomic(&self.done_path(), content.as_bytes())
    }

    /// `None` without a completion marker, otherwise the id it carries (if tagged).
    pub fn done_marker(&self) -> Option<Option<RequestId>> {
        read_optional(&self.done_path()).map(|content| RequestId::parse_marker(&content))
    }

    pub fn write_model(&self, model: &PreviewModel) -> SwatchResult<()> {
        write_atomic(&self.model_path(), model.encode().as_bytes())
    }

    /// `Ok(None)` when no descriptor was written.
    pub fn read_model(&self) -> SwatchResult<Option<PreviewModel>> {
        read_optional(&self.model_path())
            .map(|raw| PreviewModel::parse(&raw))
            .transpose()
    }

    pub fn write_camera(&self, camera: &CameraConfig) -> SwatchResult<()> {
        write_atomic(&self.camera_path(), camera.encode().as_bytes())
    }

    /// `Ok(None)` when no camera config was written.
    pub fn read_camera(&self) -> SwatchResult<Option<CameraConfig>> {
        read_optional(&self.camera_path())
            .map(|raw| CameraConfig::parse(&raw))
            .transpose()
    }

    /// Copy a 3D asset next to the model descriptor and return the descriptor naming it.
    pub fn import_model_asset(&self, src: &Path) -> SwatchResult<PreviewModel> {
        let file_name = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SwatchError::validation(format!("'{}' has no usable file name", src.display()))
            })?;
        let model = PreviewModel::parse(file_name)?;
        let dest = self.model_dir().join(file_name);
        fs::copy(src, &dest)
            .with_context(|| format!("copy '{}' -> '{}'", src.display(), dest.display()))?;
        Ok(model)
    }

    /// Remove request/completion markers and temp files a crashed session may have left.
    pub fn clear_stale(&self) {
        for path in [self.command_path(), self.done_path(), self.claim_path()] {
            if path.exists() {
                tracing::info!(path = %path.display(), "clearing stale mailbox marker");
            }
            remove_with_retry(&path, self.removal);
        }
        for name in [CONFIG_FILE, COMMAND_FILE, DONE_FILE, CAMERA_FILE, READY_FILE] {
            let tmp = self.dir.join(format!("{name}{TMP_SUFFIX}"));
            remove_with_retry(&tmp, self.removal);
        }
    }
}

impl EditorEndpoint for Mailbox {
    fn submit(&self, request: &RenderRequest) -> SwatchResult<()> {
        self.write_config(&request.params)?;
        if !self.clear_done() {
            // A leftover tagged marker still reads as Pending for the new id.
            tracing::warn!(id = %request.id, "stale completion marker could not be cleared");
        }
        self.signal_request(Some(request.id))
    }

    fn poll_done(&self, id: RequestId) -> DoneState {
        match self.done_marker() {
            Some(Some(done)) if done == id => DoneState::Ready,
            Some(None) => DoneState::Ready,
            _ => DoneState::Pending,
        }
    }

    fn read_result(&self) -> SwatchResult<Vec<u8>> {
        let path = self.preview_path();
        let bytes = fs::read(&path).with_context(|| format!("read '{}'", path.display()))?;
        Ok(bytes)
    }
}

impl RendererEndpoint for Mailbox {
    fn reset(&self) {
        self.clear_stale();
        if let Err(e) = self.mark_ready() {
            tracing::warn!(error = %e, "could not write readiness marker");
        }
    }

    fn poll_for_signal(&self) -> Option<Signal> {
        Mailbox::poll_for_signal(self)
    }

    fn read_material(&self) -> SwatchResult<MaterialParams> {
        self.read_config()
    }

    fn read_scene(&self) -> SceneSetup {
        let model = self.read_model().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring preview model descriptor");
            None
        });
        let camera = self.read_camera().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring camera config");
            None
        });
        SceneSetup {
            model: model.unwrap_or_default(),
            camera: camera.unwrap_or_default(),
            assets_dir: self.model_dir(),
        }
    }

    fn result_path(&self) -> PathBuf {
        self.preview_path()
    }

    fn discard_result(&self) -> bool {
        self.clear_result()
    }

    fn acknowledge(&self, signal: &Signal) {
        Mailbox::acknowledge(self, signal);
    }

    fn signal_done(&self, signal: &Signal) -> SwatchResult<()> {
        Mailbox::signal_done(self, signal)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ipc/mailbox.rs"]
mod tests;
