//! Editor-side session objects: the daemon process and the render request coordinator.

/// Render request coordination and stale-result rejection.
pub mod coordinator;
/// Renderer daemon process management.
pub mod lifecycle;
