/// Convenience result type used across scenestack.
pub type StageResult<T> = Result<T, StageError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    /// Malformed path text or an operation that would build an invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// API misuse: writing to a missing spec, editing an invalid prim, and so on.
    #[error("coding error: {0}")]
    Coding(String),

    /// A composition problem promoted to a hard error by the caller.
    #[error("composition error: {0}")]
    Composition(String),

    /// Invalid user-provided options or layer data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors when serializing or deserializing layer snapshots.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Build a [`StageError::InvalidPath`] value.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Build a [`StageError::Coding`] value.
    pub fn coding(msg: impl Into<String>) -> Self {
        Self::Coding(msg.into())
    }

    /// Build a [`StageError::Composition`] value.
    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition(msg.into())
    }

    /// Build a [`StageError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`StageError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
