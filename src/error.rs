//! Error types for the data model validator

use std::path::PathBuf;

use thiserror::Error;

/// Result type for validator operations
pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Validator errors.
///
/// `Config` and `FileRead` end the whole run. The remaining variants are
/// scoped to one model directory and end up as report entries.
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot read {}: {reason}", path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("Schema {schema} is invalid: {reason}")]
    Compile { schema: String, reason: String },

    #[error("Schema {schema} failed to compile to a validator")]
    CompileIntegrity { schema: String },

    #[error("Remote schema {uri} cannot be loaded: {reason}")]
    RemoteSchema { uri: String, reason: String },

    #[error("Example {example} is invalid: {violations}")]
    Validation { example: String, violations: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ValidatorError {
    /// Whether this error must stop the run instead of a single model.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ValidatorError::Config(_) | ValidatorError::FileRead { .. } | ValidatorError::Io(_)
        )
    }

    pub(crate) fn file_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ValidatorError::FileRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
