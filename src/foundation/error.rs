/// Result alias used across the crate.
pub type SwatchResult<T> = Result<T, SwatchError>;

/// Error taxonomy for the editor, the mailbox and the renderer daemon.
///
/// Transient file-lock failures during mailbox cleanup never become a `SwatchError`: they are
/// retried and logged. Stale render results are reported as coordinator events, not errors.
#[derive(thiserror::Error, Debug)]
pub enum SwatchError {
    /// Engine path unset or missing, unreadable project settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A mailbox tuple or marker could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The render engine failed while producing a preview.
    #[error("render engine failure: {0}")]
    RenderEngine(String),

    /// A bounded wait expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Rejected user input (duplicate names, undelimitable paths, unknown materials).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwatchError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::RenderEngine(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<std::io::Error> for SwatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(anyhow::Error::new(err))
    }
}
