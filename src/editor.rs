//! Editor session: one open project with its material store, render coordinator and daemon.
//!
//! Every edit goes through [`EditorSession::apply`], which calls the coordinator explicitly;
//! nothing observes the store implicitly.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::foundation::error::{SwatchError, SwatchResult};
use crate::ipc::mailbox::Mailbox;
use crate::ipc::wire::{CameraConfig, PreviewModel};
use crate::material::{Material, TextureSlot};
use crate::project::export::{ExportReport, export_material};
use crate::project::store::MaterialStore;
use crate::project::{ProjectLayout, ProjectSettings};
use crate::session::coordinator::{RenderCoordinator, RenderEvent, RequestOutcome};
use crate::session::lifecycle::DaemonSession;

/// User intents the editor understands.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorCommand {
    Select(String),
    /// Add a material (default name when `None`) and select it.
    AddMaterial(Option<String>),
    SetAlbedo([f32; 3]),
    SetSmoothness(f32),
    SetMetalness(f32),
    /// Import a texture file into the selected material's folder.
    SetTexture {
        slot: TextureSlot,
        source: PathBuf,
    },
    /// Rename the selected material.
    Rename(String),
    SaveMaterial,
    SaveAll,
    SetPreviewModel(PreviewModel),
    /// Copy a model asset into the mailbox and preview on it.
    ImportPreviewModel(PathBuf),
    SetCamera(CameraConfig),
    RequestRender,
}

/// Per-material result of [`EditorSession::refresh_all`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct EditorSession {
    layout: ProjectLayout,
    settings: ProjectSettings,
    store: MaterialStore,
    mailbox: Mailbox,
    coordinator: RenderCoordinator,
    daemon: DaemonSession,
    selected: Option<String>,
}

impl EditorSession {
    /// Open an existing project directory.
    pub fn open(root: impl Into<PathBuf>) -> SwatchResult<Self> {
        let layout = ProjectLayout::new(root);
        if !layout.root().is_dir() {
            return Err(SwatchError::configuration(format!(
                "project directory '{}' does not exist",
                layout.root().display()
            )));
        }
        Self::with_layout(layout)
    }

    /// Create the project directories (if needed) and open the project.
    pub fn create(root: impl Into<PathBuf>) -> SwatchResult<Self> {
        let layout = ProjectLayout::new(root);
        layout.create_dirs()?;
        let session = Self::with_layout(layout)?;
        if !session.layout.settings_path().exists() {
            session.settings.save(&session.layout)?;
        }
        Ok(session)
    }

    fn with_layout(layout: ProjectLayout) -> SwatchResult<Self> {
        let settings = ProjectSettings::load(&layout)?;
        let store = MaterialStore::open(layout.clone())?;
        let mailbox = Mailbox::open(layout.mailbox_dir())?;
        mailbox.write_model(&settings.preview_model)?;
        mailbox.write_camera(&settings.camera)?;

        let coordinator = RenderCoordinator::new(
            Arc::new(mailbox.clone()),
            layout.clone(),
            settings.timings.coordinator_opts(),
        );
        let daemon = DaemonSession::new(layout.pid_path());
        tracing::info!(project = %layout.root().display(), materials = store.len(), "project opened");

        Ok(Self {
            layout,
            settings,
            store,
            mailbox,
            coordinator,
            daemon,
            selected: None,
        })
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    pub fn store(&self) -> &MaterialStore {
        &self.store
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn coordinator(&self) -> &RenderCoordinator {
        &self.coordinator
    }

    pub fn daemon_mut(&mut self) -> &mut DaemonSession {
        &mut self.daemon
    }

    pub fn selected(&self) -> Option<&Material> {
        self.selected.as_deref().and_then(|n| self.store.get(n))
    }

    /// Persist new engine settings for this project.
    pub fn set_engine(&mut self, path: PathBuf, args: Option<Vec<String>>) -> SwatchResult<()> {
        self.settings.engine_path = Some(path);
        if let Some(args) = args {
            self.settings.engine_args = args;
        }
        self.settings.save(&self.layout)
    }

    /// Launch (or relaunch) the renderer daemon from the project settings.
    ///
    /// Waits (bounded by the startup timing) for the daemon to clear stale markers, so a request
    /// issued right after launching is not wiped by that cleanup. Renderers that never announce
    /// readiness only cost the wait.
    pub fn start_daemon(&mut self) -> SwatchResult<u32> {
        let spec = self.settings.launch_spec(&self.layout);
        self.mailbox.clear_ready();
        let pid = self.daemon.launch(&spec)?;
        if !self.mailbox.wait_ready(self.settings.timings.startup()) {
            tracing::warn!(pid, "renderer daemon did not announce readiness; continuing");
        }
        Ok(pid)
    }

    fn selected_name(&self) -> SwatchResult<String> {
        self.selected
            .clone()
            .ok_or_else(|| SwatchError::validation("no material selected"))
    }

    fn render_selected(&mut self) -> SwatchResult<Option<RequestOutcome>> {
        let Some(name) = self.selected.clone() else {
            return Ok(None);
        };
        let mat = self.store.require(&name)?;
        self.coordinator.request_render(mat).map(Some)
    }

    /// Apply one editor command at time `now`.
    pub fn apply(&mut self, command: EditorCommand, now: Instant) -> SwatchResult<()> {
        tracing::debug!(?command, "editor command");
        match command {
            EditorCommand::Select(name) => {
                self.store.require(&name)?;
                self.store.load_material_config(&name)?;
                self.coordinator.cancel_scheduled();
                self.coordinator.show_stored_preview(&name);
                self.selected = Some(name);
            }
            EditorCommand::AddMaterial(name) => {
                let name = self.store.add(name.as_deref())?;
                self.apply(EditorCommand::Select(name), now)?;
            }
            EditorCommand::SetAlbedo(rgb) => {
                let name = self.selected_name()?;
                self.store.require_mut(&name)?.set_albedo(rgb);
                self.coordinator.schedule_render(now);
            }
            EditorCommand::SetSmoothness(v) => {
                let name = self.selected_name()?;
                self.store.require_mut(&name)?.set_smoothness(v);
                self.coordinator.schedule_render(now);
            }
            EditorCommand::SetMetalness(v) => {
                let name = self.selected_name()?;
                self.store.require_mut(&name)?.set_metalness(v);
                self.coordinator.schedule_render(now);
            }
            EditorCommand::SetTexture { slot, source } => {
                let name = self.selected_name()?;
                self.store.import_texture(&name, slot, &source)?;
                self.store.save_material(&name)?;
                self.render_selected()?;
            }
            EditorCommand::Rename(new) => {
                let old = self.selected_name()?;
                self.store.rename(&old, &new)?;
                self.coordinator.rename_owner(&old, &new);
                self.selected = Some(new);
            }
            EditorCommand::SaveMaterial => {
                let name = self.selected_name()?;
                self.store.save_material(&name)?;
            }
            EditorCommand::SaveAll => self.store.save_all()?,
            EditorCommand::SetPreviewModel(model) => {
                self.mailbox.write_model(&model)?;
                self.settings.preview_model = model;
                self.settings.save(&self.layout)?;
                self.render_selected()?;
            }
            EditorCommand::ImportPreviewModel(src) => {
                let model = self.mailbox.import_model_asset(&src)?;
                self.apply(EditorCommand::SetPreviewModel(model), now)?;
            }
            EditorCommand::SetCamera(camera) => {
                self.mailbox.write_camera(&camera)?;
                self.settings.camera = camera;
                self.settings.save(&self.layout)?;
                self.render_selected()?;
            }
            EditorCommand::RequestRender => {
                self.selected_name()?;
                self.render_selected()?;
            }
        }
        Ok(())
    }

    /// Drive the coordinator with the current selection.
    pub fn tick(&mut self, now: Instant) -> Vec<RenderEvent> {
        let selected = self.selected.as_deref().and_then(|n| self.store.get(n));
        self.coordinator.poll(now, selected)
    }

    /// Block until the coordinator is idle or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> SwatchResult<Vec<RenderEvent>> {
        let selected = self.selected.as_deref().and_then(|n| self.store.get(n));
        self.coordinator
            .wait_until_idle(selected, Instant::now() + timeout)
    }

    /// Render every material in order, waiting for each before the next.
    pub fn refresh_all(&mut self, timeout_per_material: Duration) -> SwatchResult<RefreshReport> {
        let mut report = RefreshReport {
            updated: Vec::new(),
            failed: Vec::new(),
        };
        for name in self.store.names() {
            let result = self
                .apply(EditorCommand::Select(name.clone()), Instant::now())
                .and_then(|()| self.apply(EditorCommand::RequestRender, Instant::now()))
                .and_then(|()| self.wait_idle(timeout_per_material));
            match result {
                Ok(events)
                    if events
                        .iter()
                        .any(|e| matches!(e, RenderEvent::Updated { owner, .. } if *owner == name)) =>
                {
                    report.updated.push(name);
                }
                Ok(events) => {
                    tracing::warn!(material = %name, ?events, "refresh produced no preview");
                    report
                        .failed
                        .push((name, "no preview produced".to_string()));
                }
                Err(e) => {
                    tracing::warn!(material = %name, error = %e, "refresh failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Export the selected material's integration snippet and textures.
    pub fn export_selected(&self) -> SwatchResult<ExportReport> {
        let name = self.selected_name()?;
        export_material(&self.layout, self.store.require(&name)?)
    }

    /// Import a texture file for `name` without selecting it.
    pub fn import_texture(
        &mut self,
        name: &str,
        slot: TextureSlot,
        source: &Path,
    ) -> SwatchResult<String> {
        let rel = self.store.import_texture(name, slot, source)?;
        self.store.save_material(name)?;
        Ok(rel)
    }

    /// Mutable access for batch edits that should not trigger renders.
    pub fn store_mut(&mut self) -> &mut MaterialStore {
        &mut self.store
    }

    /// Save the material list and stop the daemon.
    pub fn close(mut self) -> SwatchResult<()> {
        let saved = self.store.save_csv();
        self.daemon.terminate();
        self.mailbox.clear_ready();
        tracing::info!(project = %self.layout.root().display(), "project closed");
        saved
    }
}

#[cfg(test)]
#[path = "../tests/unit/editor.rs"]
mod tests;
