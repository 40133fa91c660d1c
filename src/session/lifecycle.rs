use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::Context as _;

use crate::foundation::error::{SwatchError, SwatchResult};

/// How to start the renderer daemon.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Renderer executable; launching fails with a configuration error while unset.
    pub engine_path: Option<PathBuf>,
    /// Arguments with placeholders already substituted.
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// The engine path, checked to be an existing file.
    pub fn validated_engine(&self) -> SwatchResult<&Path> {
        let Some(path) = self.engine_path.as_deref() else {
            return Err(SwatchError::configuration(
                "renderer executable is not configured",
            ));
        };
        if !path.is_file() {
            return Err(SwatchError::configuration(format!(
                "renderer executable '{}' does not exist",
                path.display()
            )));
        }
        Ok(path)
    }
}

/// Owns the renderer daemon process of one open project.
///
/// At most one daemon per project: launching terminates the previous one, including a daemon
/// recorded in the pid file by an earlier editor run. Dropping the session terminates it.
#[derive(Debug)]
pub struct DaemonSession {
    pid_path: PathBuf,
    child: Option<Child>,
}

impl DaemonSession {
    pub fn new(pid_path: impl Into<PathBuf>) -> Self {
        Self {
            pid_path: pid_path.into(),
            child: None,
        }
    }

    pub fn pid_path(&self) -> &Path {
        &self.pid_path
    }

    /// Pid of the daemon started by this session, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Whether the daemon started by this session is still alive.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                tracing::debug!(%status, "renderer daemon has exited");
                false
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "could not query renderer daemon");
                false
            }
            None => false,
        }
    }

    /// Start the daemon described by `spec` and return its pid.
    #[tracing::instrument(level = "info", skip(self, spec), fields(engine = ?spec.engine_path))]
    pub fn launch(&mut self, spec: &LaunchSpec) -> SwatchResult<u32> {
        let engine = spec.validated_engine()?;

        self.terminate();

        let child = Command::new(engine)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn renderer '{}'", engine.display()))?;
        let pid = child.id();
        self.child = Some(child);

        if let Err(e) = fs::write(&self.pid_path, pid.to_string()) {
            tracing::warn!(path = %self.pid_path.display(), error = %e, "could not record daemon pid");
        }
        tracing::info!(pid, "renderer daemon launched");
        Ok(pid)
    }

    /// Force-terminate the daemon and remove the pid file. Safe to call repeatedly.
    pub fn terminate(&mut self) {
        match self.child.take() {
            Some(mut child) => {
                let pid = child.id();
                if let Err(e) = child.kill() {
                    // Already exited; the wait below still reaps it.
                    tracing::debug!(pid, error = %e, "kill on renderer daemon failed");
                }
                match child.wait() {
                    Ok(status) => tracing::info!(pid, %status, "renderer daemon terminated"),
                    Err(e) => tracing::warn!(pid, error = %e, "could not reap renderer daemon"),
                }
                remove_pid_file(&self.pid_path);
            }
            None => terminate_recorded(&self.pid_path),
        }
    }
}

impl Drop for DaemonSession {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.terminate();
        }
    }
}

/// Kill the process recorded in `pid_path` (left by an earlier run) and remove the file.
///
/// Failures are logged only.
pub fn terminate_recorded(pid_path: &Path) {
    let raw = match fs::read_to_string(pid_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(path = %pid_path.display(), error = %e, "unreadable pid file");
            return;
        }
    };
    match raw.trim().parse::<u32>() {
        Ok(pid) => {
            tracing::info!(pid, "terminating renderer daemon from an earlier session");
            kill_pid(pid);
        }
        Err(_) => tracing::warn!(path = %pid_path.display(), "pid file does not hold a pid"),
    }
    remove_pid_file(pid_path);
}

fn remove_pid_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove pid file"),
    }
}

fn kill_pid(pid: u32) {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("taskkill");
        c.args(["/PID", &pid.to_string(), "/F"]);
        c
    } else {
        let mut c = Command::new("kill");
        c.args(["-9", &pid.to_string()]);
        c
    };
    match cmd.stdout(Stdio::null()).stderr(Stdio::null()).status() {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::debug!(pid, %status, "stale daemon was already gone"),
        Err(e) => tracing::warn!(pid, error = %e, "could not run the platform kill command"),
    }
}
