//! Editor ⇄ renderer channel.
//!
//! The editor and the renderer daemon never share memory; they exchange one request at a time
//! through an endpoint pair. [`mailbox::Mailbox`] is the file-based transport; callers only see
//! the [`EditorEndpoint`] and [`RendererEndpoint`] traits so another transport can replace it.

use std::path::PathBuf;

use crate::foundation::core::RequestId;
use crate::foundation::error::SwatchResult;

/// File-system mailbox transport.
pub mod mailbox;
/// Text formats of the mailbox files.
pub mod wire;

use wire::{CameraConfig, MaterialParams, PreviewModel};

/// A render request as captured at the moment it was issued.
///
/// Holds values, not references: later edits to the material cannot change what this request
/// asked for or who it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    pub id: RequestId,
    /// Name of the material selected when the request was issued.
    pub owner: String,
    pub params: MaterialParams,
}

/// Daemon-side view of a pending request marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signal {
    /// `None` when the writer did not tag the marker (legacy editors).
    pub id: Option<RequestId>,
}

/// Completion state of one request, as seen by the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DoneState {
    /// No completion marker, or one that belongs to a different request.
    Pending,
    /// The result for the polled request can be read.
    Ready,
}

/// Scene description the daemon reads next to the material params.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneSetup {
    pub model: PreviewModel,
    pub camera: CameraConfig,
    /// Directory that holds imported model assets.
    pub assets_dir: PathBuf,
}

/// Editor side of the channel.
pub trait EditorEndpoint: Send + Sync {
    /// Publish `request`, replacing any unconsumed one, and signal the renderer.
    ///
    /// Implementations must clear a previous completion before signalling so the new request
    /// never observes an old result.
    fn submit(&self, request: &RenderRequest) -> SwatchResult<()>;

    /// Check whether the result for `id` is available. Must never block for long and must treat
    /// absent or partially written markers as [`DoneState::Pending`].
    fn poll_done(&self, id: RequestId) -> DoneState;

    /// Encoded bytes of the latest rendered preview.
    fn read_result(&self) -> SwatchResult<Vec<u8>>;
}

/// Renderer side of the channel.
pub trait RendererEndpoint {
    /// Drop markers left behind by a previous session.
    fn reset(&self);

    /// A pending request, if one was signalled.
    fn poll_for_signal(&self) -> Option<Signal>;

    /// Params of the pending request.
    fn read_material(&self) -> SwatchResult<MaterialParams>;

    /// Scene descriptors; absent or malformed files fall back to defaults.
    fn read_scene(&self) -> SceneSetup;

    /// Where the engine must write the rendered image.
    fn result_path(&self) -> PathBuf;

    /// Remove the previous image at [`Self::result_path`]. `false` if it is still there.
    fn discard_result(&self) -> bool;

    /// Consume the request marker for `signal`. A newer request that replaced it survives.
    fn acknowledge(&self, signal: &Signal);

    /// Publish the completion marker for `signal`; the image must already be written.
    fn signal_done(&self, signal: &Signal) -> SwatchResult<()>;
}
