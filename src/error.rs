//! Error types for entity-binder

use thiserror::Error;

/// Payload field used for errors that are not tied to a single field
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Error, Debug)]
pub enum BinderError {
    /// Malformed or unknown input, reported against a payload field
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    /// The (author, target, kind) triple is already bound
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Type identifier is not registered
    #[error("Entity type not found: {0}")]
    TypeNotFound(String),

    /// Store-level uniqueness violation
    #[error("Duplicate bind: {author} -> {target} ({kind})")]
    DuplicateBind {
        author: String,
        target: String,
        kind: String,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BinderError {
    /// Build a field-level validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors that describe the request rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Conflict(_)
                | Self::NotFound(_)
                | Self::TypeNotFound(_)
                | Self::DuplicateBind { .. }
                | Self::Unauthorized(_)
                | Self::Json(_)
        )
    }
}
