//! Error kinds surfaced by the draft lifecycle, the event API and the store.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invite for {email} already exists on event {event_id}")]
    DuplicateInvite { event_id: Uuid, email: String },

    #[error("State file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{message}")]
    Validation {
        message: String,
        missing_fields: Vec<String>,
    },

    #[error("{0} not found or expired")]
    NotFoundOrExpired(String),

    #[error("Failed to materialize event: {0}")]
    Materialization(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
            missing_fields: Vec::new(),
        }
    }

    pub fn missing(fields: Vec<String>) -> Self {
        CoreError::Validation {
            message: format!("Missing required fields: {}", fields.join(", ")),
            missing_fields: fields,
        }
    }

    /// Stable identifier used in `error` replies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation_failure",
            CoreError::NotFoundOrExpired(_) => "not_found_or_expired",
            CoreError::Materialization(_) => "materialization_failure",
            CoreError::Storage(_) => "internal",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
