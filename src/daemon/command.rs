use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::daemon::{RenderEngine, RenderJob};
use crate::foundation::error::{SwatchError, SwatchResult};

/// Render by running an external program once per request.
///
/// Arguments are templates; these placeholders are substituted per job:
/// `{config}` (material tuple), `{out}`, `{width}`, `{height}`, `{model}`, `{camera}`, `{assets}`.
#[derive(Clone, Debug)]
pub struct CommandEngine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Concrete argument list for `job`.
    pub fn expand_args(&self, job: &RenderJob, out: &Path) -> SwatchResult<Vec<String>> {
        let config = job.params.encode()?;
        let model = job.scene.model.encode();
        let camera = job.scene.camera.encode();
        let width = job.resolution.width.to_string();
        let height = job.resolution.height.to_string();
        let out = out.display().to_string();
        let assets = job.scene.assets_dir.display().to_string();

        Ok(self
            .args
            .iter()
            .map(|a| {
                a.replace("{config}", &config)
                    .replace("{out}", &out)
                    .replace("{width}", &width)
                    .replace("{height}", &height)
                    .replace("{model}", &model)
                    .replace("{camera}", &camera)
                    .replace("{assets}", &assets)
            })
            .collect())
    }
}

impl RenderEngine for CommandEngine {
    #[tracing::instrument(level = "debug", skip(self, job), fields(program = %self.program.display()))]
    fn render(&mut self, job: &RenderJob, out: &Path) -> SwatchResult<()> {
        let args = self.expand_args(job, out)?;
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                SwatchError::engine(format!(
                    "failed to spawn '{}': {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SwatchError::engine(format!(
                "'{}' exited with status {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        if !out.is_file() {
            return Err(SwatchError::engine(format!(
                "'{}' exited cleanly but wrote no image to '{}'",
                self.program.display(),
                out.display()
            )));
        }
        Ok(())
    }
}
