#![forbid(unsafe_code)]

pub mod daemon;
pub mod editor;
pub mod foundation;
pub mod ipc;
pub mod material;
pub mod project;
pub mod session;

pub use daemon::command::CommandEngine;
pub use daemon::cpu::CpuPreviewEngine;
pub use daemon::{DaemonLoop, DaemonOpts, DaemonState, RenderEngine, RenderJob, StepOutcome};
pub use editor::{EditorCommand, EditorSession, RefreshReport};
pub use foundation::core::{RequestId, Resolution};
pub use foundation::error::{SwatchError, SwatchResult};
pub use ipc::mailbox::{Mailbox, RemovalPolicy};
pub use ipc::wire::{CameraConfig, MaterialParams, PreviewModel, Primitive};
pub use ipc::{DoneState, EditorEndpoint, RenderRequest, RendererEndpoint, SceneSetup, Signal};
pub use material::{Material, TextureSlot};
pub use project::store::MaterialStore;
pub use project::{ProjectLayout, ProjectSettings};
pub use session::coordinator::{
    CoordinatorOpts, Preview, RenderCoordinator, RenderEvent, RequestOutcome,
};
pub use session::lifecycle::{DaemonSession, LaunchSpec};
