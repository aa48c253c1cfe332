//! Store Error Types

use errors::{ErrorCategory, HapiError, HapiErrorTrait};
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be turned into a domain value
    #[error("Invalid {table} row {key}: {reason}")]
    InvalidRow {
        table: &'static str,
        key: String,
        reason: String,
    },

    /// Inbound sync row does not match the table layout
    #[error("Malformed sync row for {table}: {reason}")]
    MalformedSyncRow { table: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub(crate) fn invalid_row(
        table: &'static str,
        key: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRow {
            table,
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl HapiErrorTrait for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "STORE_DATABASE",
            Self::InvalidRow { .. } => "STORE_INVALID_ROW",
            Self::MalformedSyncRow { .. } => "STORE_MALFORMED_SYNC_ROW",
            Self::Serialization(_) => "STORE_SERIALIZATION",
            Self::NotFound(_) => "STORE_NOT_FOUND",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Database(_) => ErrorCategory::Database,
            Self::InvalidRow { .. } => ErrorCategory::Configuration,
            Self::MalformedSyncRow { .. } | Self::Serialization(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
        }
    }
}

impl From<StoreError> for HapiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(_) => HapiError::persistence(err.to_string()),
            StoreError::InvalidRow { .. } => HapiError::Configuration(err.to_string()),
            StoreError::MalformedSyncRow { .. } => HapiError::Validation(err.to_string()),
            StoreError::Serialization(e) => HapiError::Serialization(e.to_string()),
            StoreError::NotFound(resource) => HapiError::NotFound { resource },
        }
    }
}
