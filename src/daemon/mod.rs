//! Renderer daemon: a single-threaded polling loop that serves one mailbox request at a time.
//!
//! ```text
//! Idle --(request marker)--> ApplyingSettings --> Rendering --> SignalingDone --> Idle
//! ```
//!
//! Renders are blocking and not interruptible; a request written while rendering waits in the
//! mailbox until the loop is idle again. Failures abandon the transaction without a completion
//! marker, which the editor observes as a timeout.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::foundation::core::{RequestId, Resolution};
use crate::foundation::error::{SwatchError, SwatchResult};
use crate::ipc::wire::MaterialParams;
use crate::ipc::{RendererEndpoint, SceneSetup, Signal};

/// External-process engine.
pub mod command;
/// Built-in software preview engine.
pub mod cpu;

/// Everything an engine needs for one preview.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderJob {
    pub params: MaterialParams,
    pub scene: SceneSetup,
    pub resolution: Resolution,
}

/// A render engine the daemon drives synchronously.
pub trait RenderEngine {
    /// Render `job` and write the image to `out`. May block for as long as it takes.
    fn render(&mut self, job: &RenderJob, out: &Path) -> SwatchResult<()>;
}

impl<E: RenderEngine + ?Sized> RenderEngine for Box<E> {
    fn render(&mut self, job: &RenderJob, out: &Path) -> SwatchResult<()> {
        (**self).render(job, out)
    }
}

/// Timing and output options of the daemon loop.
#[derive(Clone, Copy, Debug)]
pub struct DaemonOpts {
    /// Sleep between polls while idle.
    pub poll_interval: Duration,
    pub resolution: Resolution,
    /// Attempts at parsing the material config before a transaction is abandoned. Absorbs an
    /// editor that is still replacing the file.
    pub read_attempts: u32,
    pub read_retry_delay: Duration,
}

impl Default for DaemonOpts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            resolution: Resolution::PREVIEW,
            read_attempts: 3,
            read_retry_delay: Duration::from_millis(20),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    ApplyingSettings,
    Rendering,
    SignalingDone,
}

/// Result of one loop iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// No request was pending.
    Idle,
    /// A preview was written and the completion marker published.
    Rendered(Option<RequestId>),
    /// The request was consumed without a result.
    Abandoned {
        id: Option<RequestId>,
        reason: String,
    },
}

pub struct DaemonLoop<C: RendererEndpoint, E: RenderEngine> {
    channel: C,
    engine: E,
    opts: DaemonOpts,
    state: DaemonState,
    started: bool,
    served: u64,
}

impl<C: RendererEndpoint, E: RenderEngine> DaemonLoop<C, E> {
    pub fn new(channel: C, engine: E, opts: DaemonOpts) -> Self {
        Self {
            channel,
            engine,
            opts,
            state: DaemonState::Idle,
            started: false,
            served: 0,
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Number of requests that produced a completion marker.
    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Clear markers left by a previous session. Runs once, before the first poll, so a
    /// leftover marker never produces a result for a request this daemon did not serve.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.channel.reset();
        self.started = true;
        self.state = DaemonState::Idle;
        tracing::info!("renderer daemon ready");
    }

    /// Serve at most one pending request.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn step(&mut self) -> StepOutcome {
        self.start();

        let Some(signal) = self.channel.poll_for_signal() else {
            self.state = DaemonState::Idle;
            return StepOutcome::Idle;
        };

        self.enter(DaemonState::ApplyingSettings, &signal);
        let params = match self.read_params() {
            Ok(p) => p,
            Err(e) => return self.abandon(&signal, e),
        };
        let job = RenderJob {
            params,
            scene: self.channel.read_scene(),
            resolution: self.opts.resolution,
        };

        self.enter(DaemonState::Rendering, &signal);
        let out = self.channel.result_path();
        // The completion marker must only ever vouch for an image written in this transaction.
        if !self.channel.discard_result() {
            let err = SwatchError::engine(format!(
                "previous preview '{}' could not be removed",
                out.display()
            ));
            return self.abandon(&signal, err);
        }
        let engine = &mut self.engine;
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| engine.render(&job, &out)));
        match rendered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return self.abandon(&signal, e),
            Err(_) => return self.abandon(&signal, SwatchError::engine("render engine panicked")),
        }
        if !out.is_file() {
            let err = SwatchError::engine(format!(
                "engine reported success but wrote no image to '{}'",
                out.display()
            ));
            return self.abandon(&signal, err);
        }

        self.enter(DaemonState::SignalingDone, &signal);
        self.channel.acknowledge(&signal);
        if let Err(e) = self.channel.signal_done(&signal) {
            tracing::error!(id = ?signal.id, error = %e, "failed to publish completion marker");
            self.state = DaemonState::Idle;
            return StepOutcome::Abandoned {
                id: signal.id,
                reason: e.to_string(),
            };
        }

        self.state = DaemonState::Idle;
        self.served += 1;
        tracing::info!(id = ?signal.id, out = %out.display(), "preview rendered");
        StepOutcome::Rendered(signal.id)
    }

    /// Poll until `shutdown` is set. Returns the number of served requests.
    pub fn run(&mut self, shutdown: &AtomicBool) -> u64 {
        self.start();
        while !shutdown.load(Ordering::SeqCst) {
            if self.step() == StepOutcome::Idle {
                thread::sleep(self.opts.poll_interval);
            }
        }
        tracing::info!(served = self.served, "renderer daemon stopping");
        self.served
    }

    fn enter(&mut self, state: DaemonState, signal: &Signal) {
        tracing::debug!(from = ?self.state, to = ?state, id = ?signal.id, "daemon transition");
        self.state = state;
    }

    fn read_params(&self) -> SwatchResult<MaterialParams> {
        let attempts = self.opts.read_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.channel.read_material() {
                Ok(p) => return Ok(p),
                Err(e) if attempt < attempts => {
                    tracing::debug!(attempt, error = %e, "material config not ready");
                    attempt += 1;
                    thread::sleep(self.opts.read_retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn abandon(&mut self, signal: &Signal, err: SwatchError) -> StepOutcome {
        tracing::warn!(id = ?signal.id, state = ?self.state, error = %err, "render transaction abandoned");
        self.channel.acknowledge(signal);
        self.state = DaemonState::Idle;
        StepOutcome::Abandoned {
            id: signal.id,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/daemon/loop.rs"]
mod tests;
