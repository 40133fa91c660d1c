use crate::foundation::error::{SwatchError, SwatchResult};

/// Identity of one render request, unique and increasing within an editor session.
///
/// Written into the command marker by the editor and echoed into the done marker by the daemon,
/// so a completion can be matched against the request that caused it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct RequestId(pub u64);

impl RequestId {
    /// First id handed out by a fresh coordinator.
    pub const FIRST: RequestId = RequestId(1);

    /// The id following `self`.
    pub fn next(self) -> Self {
        RequestId(self.0.saturating_add(1))
    }

    /// Parse marker file content. Empty or non-numeric content yields `None` (untagged marker).
    pub fn parse_marker(content: &str) -> Option<Self> {
        content.trim().parse::<u64>().ok().map(RequestId)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output raster size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Fixed preview resolution produced by the daemon.
    pub const PREVIEW: Resolution = Resolution {
        width: 512,
        height: 512,
    };

    /// Create a validated resolution with non-zero dimensions.
    pub fn new(width: u32, height: u32) -> SwatchResult<Self> {
        if width == 0 || height == 0 {
            return Err(SwatchError::validation(
                "resolution width/height must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::PREVIEW
    }
}

/// Clamp into `[0, 1]`. NaN maps to `0`.
pub fn unit_interval(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
