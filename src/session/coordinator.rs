//! Render request coordination on the editor side.
//!
//! At most one request is in flight. Requests made meanwhile collapse into a single retry that
//! renders whatever is selected once the current render finishes. A background waiter thread
//! polls the endpoint for the in-flight request and hands the outcome back over a channel; the
//! UI thread drains it in [`RenderCoordinator::poll`] and decides whether the result still
//! belongs to the selected material.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::foundation::core::RequestId;
use crate::foundation::error::{SwatchError, SwatchResult};
use crate::ipc::wire::MaterialParams;
use crate::ipc::{DoneState, EditorEndpoint, RenderRequest};
use crate::material::Material;
use crate::project::ProjectLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorOpts {
    /// Delay between completion polls of the waiter thread.
    pub poll_interval: Duration,
    /// Give up on a request after this long.
    pub timeout: Duration,
    /// Quiet period before a scheduled (slider) render fires.
    pub debounce: Duration,
}

impl Default for CoordinatorOpts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            timeout: Duration::from_secs(10),
            debounce: Duration::from_millis(120),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Submitted to the renderer.
    Issued(RequestId),
    /// Folded into the pending retry because a render is in flight.
    Coalesced,
}

/// What happened during one [`RenderCoordinator::poll`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    /// The preview now shows the result of `id`, also stored in the owner's folder.
    Updated { id: RequestId, owner: String },
    /// The result arrived after the selection moved away from `owner`.
    Discarded {
        id: RequestId,
        owner: String,
        selected: Option<String>,
    },
    /// No result within the timeout; the preview is unchanged.
    TimedOut { id: RequestId, owner: String },
    /// The pending retry could not be submitted.
    Failed { owner: String, reason: String },
    /// The pending retry was submitted.
    Retried(RequestId),
    /// A scheduled render fired.
    Debounced(RequestOutcome),
}

/// Counters over the coordinator's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub issued: u64,
    pub coalesced: u64,
    pub updated: u64,
    pub discarded: u64,
    pub timed_out: u64,
}

/// Decoded preview currently on display.
#[derive(Clone, Debug, PartialEq)]
pub struct Preview {
    pub owner: String,
    /// `None` for previews loaded from disk.
    pub id: Option<RequestId>,
    pub image: image::RgbaImage,
}

enum WaiterReport {
    Completed {
        id: RequestId,
        png: Vec<u8>,
        image: image::RgbaImage,
    },
    TimedOut {
        id: RequestId,
    },
}

#[derive(Debug)]
struct InFlight {
    id: RequestId,
    owner: String,
    issued_at: Instant,
}

pub struct RenderCoordinator {
    endpoint: Arc<dyn EditorEndpoint>,
    layout: ProjectLayout,
    opts: CoordinatorOpts,
    next_id: RequestId,
    in_flight: Option<InFlight>,
    retry_pending: bool,
    debounce_deadline: Option<Instant>,
    tx: Sender<WaiterReport>,
    rx: Receiver<WaiterReport>,
    preview: Option<Preview>,
    stats: CoordinatorStats,
}

impl RenderCoordinator {
    pub fn new(
        endpoint: Arc<dyn EditorEndpoint>,
        layout: ProjectLayout,
        opts: CoordinatorOpts,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            endpoint,
            layout,
            opts,
            next_id: RequestId::FIRST,
            in_flight: None,
            retry_pending: false,
            debounce_deadline: None,
            tx,
            rx,
            preview: None,
            stats: CoordinatorStats::default(),
        }
    }

    pub fn opts(&self) -> CoordinatorOpts {
        self.opts
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// Replace the displayed preview, e.g. with a stored one when the selection changes.
    pub fn set_preview(&mut self, preview: Option<Preview>) {
        self.preview = preview;
    }

    /// Load `materials/<name>/preview.png` as the displayed preview, if it exists.
    pub fn show_stored_preview(&mut self, name: &str) -> bool {
        let path = self.layout.material_preview_path(name);
        match image::open(&path) {
            Ok(img) => {
                self.preview = Some(Preview {
                    owner: name.to_string(),
                    id: None,
                    image: img.to_rgba8(),
                });
                true
            }
            Err(e) => {
                if path.exists() {
                    tracing::warn!(path = %path.display(), error = %e, "stored preview unreadable");
                }
                self.preview = None;
                false
            }
        }
    }

    /// Id of the request currently being waited on.
    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    /// Whether a render is in flight, a retry is pending or a scheduled render has not fired.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.retry_pending || self.debounce_deadline.is_some()
    }

    /// Keep an in-flight request attributed to a renamed material.
    pub fn rename_owner(&mut self, old: &str, new: &str) {
        if let Some(f) = self.in_flight.as_mut().filter(|f| f.owner == old) {
            f.owner = new.to_string();
        }
        if let Some(p) = self.preview.as_mut().filter(|p| p.owner == old) {
            p.owner = new.to_string();
        }
    }

    /// Snapshot `material` and ask the renderer for a preview.
    ///
    /// While another render is in flight this only marks a retry as pending.
    #[tracing::instrument(level = "debug", skip(self, material), fields(material = %material.name))]
    pub fn request_render(&mut self, material: &Material) -> SwatchResult<RequestOutcome> {
        if self.in_flight.is_some() {
            self.retry_pending = true;
            self.stats.coalesced += 1;
            tracing::debug!("render in flight; request coalesced");
            return Ok(RequestOutcome::Coalesced);
        }

        let request = RenderRequest {
            id: self.next_id,
            owner: material.name.clone(),
            params: self.snapshot(material),
        };
        self.endpoint.submit(&request)?;
        self.next_id = self.next_id.next();

        let issued_at = Instant::now();
        self.spawn_waiter(request.id, issued_at)?;
        self.in_flight = Some(InFlight {
            id: request.id,
            owner: request.owner,
            issued_at,
        });
        self.stats.issued += 1;
        tracing::info!(id = %request.id, "render requested");
        Ok(RequestOutcome::Issued(request.id))
    }

    /// Request a render once `debounce` has passed without another call.
    pub fn schedule_render(&mut self, now: Instant) {
        self.debounce_deadline = Some(now + self.opts.debounce);
    }

    /// Drop a scheduled render that has not fired yet.
    pub fn cancel_scheduled(&mut self) {
        self.debounce_deadline = None;
    }

    /// Process waiter reports, then a pending retry, then an expired scheduled render.
    ///
    /// `selected` is the material currently shown in the editor; results owned by any other
    /// material are discarded.
    pub fn poll(&mut self, now: Instant, selected: Option<&Material>) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        let selected_name = selected.map(|m| m.name.as_str());

        loop {
            match self.rx.try_recv() {
                Ok(report) => {
                    if let Some(ev) = self.accept(report, selected_name) {
                        events.push(ev);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if self.in_flight.is_none() && self.retry_pending {
            self.retry_pending = false;
            match selected {
                Some(mat) => match self.request_render(mat) {
                    Ok(RequestOutcome::Issued(id)) => events.push(RenderEvent::Retried(id)),
                    Ok(RequestOutcome::Coalesced) => {}
                    Err(e) => {
                        tracing::warn!(material = %mat.name, error = %e, "retry render failed");
                        events.push(RenderEvent::Failed {
                            owner: mat.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                },
                None => tracing::debug!("nothing selected; pending retry dropped"),
            }
        }

        if let Some(deadline) = self.debounce_deadline
            && now >= deadline
        {
            self.debounce_deadline = None;
            if let Some(mat) = selected {
                match self.request_render(mat) {
                    Ok(outcome) => events.push(RenderEvent::Debounced(outcome)),
                    Err(e) => {
                        tracing::warn!(material = %mat.name, error = %e, "scheduled render failed");
                        events.push(RenderEvent::Failed {
                            owner: mat.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        events
    }

    /// Poll until nothing is in flight, pending or scheduled, or fail with `Timeout` at
    /// `deadline`. Returns every event observed on the way.
    pub fn wait_until_idle(
        &mut self,
        selected: Option<&Material>,
        deadline: Instant,
    ) -> SwatchResult<Vec<RenderEvent>> {
        let mut events = Vec::new();
        loop {
            let now = Instant::now();
            events.extend(self.poll(now, selected));
            if !self.is_busy() {
                return Ok(events);
            }
            if now >= deadline {
                return Err(SwatchError::timeout(format!(
                    "render still busy after waiting (in flight: {:?})",
                    self.in_flight()
                )));
            }
            thread::sleep(self.opts.poll_interval.min(Duration::from_millis(20)));
        }
    }

    fn snapshot(&self, material: &Material) -> MaterialParams {
        let map = |reference: &str| (!reference.is_empty()).then(|| self.layout.resolve(reference));
        MaterialParams {
            albedo: material.albedo(),
            smoothness: material.smoothness,
            metalness: material.metalness,
            albedo_map: map(&material.albedo_map),
            metalness_map: map(&material.metalness_map),
        }
    }

    fn spawn_waiter(&self, id: RequestId, issued_at: Instant) -> SwatchResult<()> {
        let endpoint = Arc::clone(&self.endpoint);
        let tx = self.tx.clone();
        let poll_interval = self.opts.poll_interval;
        let deadline = issued_at + self.opts.timeout;

        thread::Builder::new()
            .name(format!("swatch-wait-{id}"))
            .spawn(move || {
                let report = wait_for_result(endpoint.as_ref(), id, poll_interval, deadline);
                // The coordinator may be gone; nothing to report to then.
                let _ = tx.send(report);
            })
            .context("spawn render waiter thread")?;
        Ok(())
    }

    fn accept(&mut self, report: WaiterReport, selected: Option<&str>) -> Option<RenderEvent> {
        let id = match &report {
            WaiterReport::Completed { id, .. } | WaiterReport::TimedOut { id } => *id,
        };
        let in_flight = match self.in_flight.take() {
            Some(f) if f.id == id => f,
            other => {
                self.in_flight = other;
                tracing::debug!(id = %id, "report for a request no longer tracked");
                return None;
            }
        };
        let elapsed = in_flight.issued_at.elapsed();
        let owner = in_flight.owner;

        match report {
            WaiterReport::TimedOut { .. } => {
                self.stats.timed_out += 1;
                tracing::warn!(id = %id, material = %owner, ?elapsed, "render timed out");
                Some(RenderEvent::TimedOut { id, owner })
            }
            WaiterReport::Completed { png, image, .. } => {
                if selected != Some(owner.as_str()) {
                    self.stats.discarded += 1;
                    tracing::debug!(
                        id = %id,
                        material = %owner,
                        selected = ?selected,
                        "selection changed during render; result discarded"
                    );
                    return Some(RenderEvent::Discarded {
                        id,
                        owner,
                        selected: selected.map(str::to_string),
                    });
                }

                if let Err(e) = self.store_preview(&owner, &png) {
                    tracing::error!(material = %owner, error = %e, "could not store preview copy");
                }
                self.preview = Some(Preview {
                    owner: owner.clone(),
                    id: Some(id),
                    image,
                });
                self.stats.updated += 1;
                tracing::info!(id = %id, material = %owner, ?elapsed, "preview updated");
                Some(RenderEvent::Updated { id, owner })
            }
        }
    }

    fn store_preview(&self, owner: &str, png: &[u8]) -> SwatchResult<PathBuf> {
        let dir = self.layout.material_dir(owner);
        fs::create_dir_all(&dir).with_context(|| format!("create '{}'", dir.display()))?;
        let path = self.layout.material_preview_path(owner);
        fs::write(&path, png).with_context(|| format!("write '{}'", path.display()))?;
        Ok(path)
    }
}

fn wait_for_result(
    endpoint: &dyn EditorEndpoint,
    id: RequestId,
    poll_interval: Duration,
    deadline: Instant,
) -> WaiterReport {
    loop {
        if endpoint.poll_done(id) == DoneState::Ready {
            match endpoint.read_result().and_then(|png| {
                let image = image::load_from_memory(&png)
                    .map_err(|e| SwatchError::malformed(format!("preview image: {e}")))?
                    .to_rgba8();
                Ok((png, image))
            }) {
                Ok((png, image)) => return WaiterReport::Completed { id, png, image },
                // Possibly still being replaced by the renderer.
                Err(e) => tracing::debug!(id = %id, error = %e, "result not readable yet"),
            }
        }
        if Instant::now() >= deadline {
            return WaiterReport::TimedOut { id };
        }
        thread::sleep(poll_interval);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/coordinator.rs"]
mod tests;
