//! On-disk project: directory layout, persisted settings, material store and export.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{SwatchError, SwatchResult};
use crate::ipc::wire::{CameraConfig, PreviewModel};
use crate::session::coordinator::CoordinatorOpts;
use crate::session::lifecycle::LaunchSpec;

/// Integration snippet export.
pub mod export;
/// Material list persistence.
pub mod store;

pub const MATERIALS_DIR: &str = "materials";
pub const TEXTURES_DIR: &str = "textures";
pub const EXPORTS_DIR: &str = "exports";
pub const MAILBOX_DIR: &str = ".mailbox";
pub const PID_FILE: &str = "daemon_pid.txt";
pub const SETTINGS_FILE: &str = "swatch.json";
pub const STORE_FILE: &str = "materials.csv";
pub const MATERIAL_CONFIG_FILE: &str = "material_config.txt";
pub const MATERIAL_PREVIEW_FILE: &str = "preview.png";

/// Paths of one project directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn materials_dir(&self) -> PathBuf {
        self.root.join(MATERIALS_DIR)
    }

    pub fn material_dir(&self, name: &str) -> PathBuf {
        self.materials_dir().join(name)
    }

    pub fn material_config_path(&self, name: &str) -> PathBuf {
        self.material_dir(name).join(MATERIAL_CONFIG_FILE)
    }

    pub fn material_preview_path(&self, name: &str) -> PathBuf {
        self.material_dir(name).join(MATERIAL_PREVIEW_FILE)
    }

    pub fn material_textures_dir(&self, name: &str) -> PathBuf {
        self.material_dir(name).join(TEXTURES_DIR)
    }

    pub fn textures_dir(&self) -> PathBuf {
        self.root.join(TEXTURES_DIR)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join(EXPORTS_DIR)
    }

    pub fn mailbox_dir(&self) -> PathBuf {
        self.root.join(MAILBOX_DIR)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.join(PID_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    /// Absolute path of a project-relative reference. Absolute references pass through.
    pub fn resolve(&self, reference: &str) -> PathBuf {
        let p = Path::new(reference);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    /// Create the top-level directories of a new project.
    pub fn create_dirs(&self) -> SwatchResult<()> {
        for dir in [
            self.root.clone(),
            self.materials_dir(),
            self.textures_dir(),
            self.exports_dir(),
            self.mailbox_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create project directory '{}'", dir.display()))?;
        }
        Ok(())
    }
}

/// Coordinator timings as persisted in the settings file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub debounce_ms: u64,
    /// How long a freshly launched daemon may take to announce readiness.
    pub startup_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        let opts = CoordinatorOpts::default();
        Self {
            poll_interval_ms: opts.poll_interval.as_millis() as u64,
            timeout_ms: opts.timeout.as_millis() as u64,
            debounce_ms: opts.debounce.as_millis() as u64,
            startup_ms: 3000,
        }
    }
}

impl Timings {
    pub fn coordinator_opts(&self) -> CoordinatorOpts {
        CoordinatorOpts {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            timeout: Duration::from_millis(self.timeout_ms),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }
}

/// Per-project settings stored as JSON in `swatch.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Renderer executable. Unset until configured.
    pub engine_path: Option<PathBuf>,
    /// Argument template; `{mailbox}` and `{project}` are substituted at launch.
    pub engine_args: Vec<String>,
    pub preview_model: PreviewModel,
    pub camera: CameraConfig,
    pub timings: Timings,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            engine_path: None,
            engine_args: vec![
                "daemon".to_string(),
                "--mailbox".to_string(),
                "{mailbox}".to_string(),
            ],
            preview_model: PreviewModel::default(),
            camera: CameraConfig::default(),
            timings: Timings::default(),
        }
    }
}

impl ProjectSettings {
    /// Load settings; a missing file yields defaults.
    pub fn load(layout: &ProjectLayout) -> SwatchResult<Self> {
        let path = layout.settings_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SwatchError::configuration(format!(
                    "read '{}': {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&raw).map_err(|e| {
            SwatchError::configuration(format!("invalid settings '{}': {e}", path.display()))
        })
    }

    pub fn save(&self, layout: &ProjectLayout) -> SwatchResult<()> {
        let path = layout.settings_path();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SwatchError::serde(format!("encode settings: {e}")))?;
        std::fs::write(&path, json).with_context(|| format!("write '{}'", path.display()))?;
        Ok(())
    }

    /// Launch description with placeholders substituted for `layout`.
    pub fn launch_spec(&self, layout: &ProjectLayout) -> LaunchSpec {
        let mailbox = layout.mailbox_dir().display().to_string();
        let project = layout.root().display().to_string();
        LaunchSpec {
            engine_path: self.engine_path.clone(),
            args: self
                .engine_args
                .iter()
                .map(|a| a.replace("{mailbox}", &mailbox).replace("{project}", &project))
                .collect(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/project/settings.rs"]
mod tests;
