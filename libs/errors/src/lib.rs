//! Unified error handling for HAPI services
//!
//! One error type shared by the store, the device layer, the scheduler and the
//! message router. Variants follow the failure taxonomy of the controller:
//! discovery, command timeouts, configuration, persistence and sync conflicts,
//! plus the plumbing errors that feed into them.

use thiserror::Error;

// ============================================================================
// HapiError - Main error type
// ============================================================================

/// Main error type for all HAPI services
#[derive(Debug, Error)]
pub enum HapiError {
    // ======================================
    // Device Errors
    // ======================================
    #[error("Discovery failed at {address}: {reason}")]
    Discovery { address: String, reason: String },

    #[error("Command '{command}' to {address} timed out after {timeout_ms}ms")]
    CommandTimeout {
        address: String,
        command: String,
        timeout_ms: u64,
    },

    #[error("Connection failed: {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Persistence Errors
    // ======================================
    #[error("Persistence error: {0}")]
    Persistence(String),

    // ======================================
    // Synchronization Errors
    // ======================================
    #[error("Sync conflict on {table}[{key}]: {reason}")]
    SyncConflict {
        table: String,
        key: String,
        reason: String,
    },

    // ======================================
    // Transport Errors
    // ======================================
    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ======================================
    // Validation & Lookup
    // ======================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Service startup failed: {0}")]
    StartupFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using HapiError
pub type HapiResult<T> = Result<T, HapiError>;

impl HapiError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn discovery(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Discovery {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors caused by a device that did not answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }
}

impl From<serde_json::Error> for HapiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::num::ParseIntError> for HapiError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::Validation(format!("Invalid integer: {}", err))
    }
}

impl From<std::num::ParseFloatError> for HapiError {
    fn from(err: std::num::ParseFloatError) -> Self {
        Self::Validation(format!("Invalid float: {}", err))
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::HapiError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::HapiError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::HapiError::Validation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::HapiError::Validation(format!($fmt, $($arg)*))
    };
}

// ============================================================================
// Error classification
// ============================================================================

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Database,
    Network,
    Timeout,
    Device,
    Validation,
    NotFound,
    Conflict,
    Internal,
    Unknown,
}

/// Common capability interface for HAPI error types
///
/// Crates with their own error enum (the store, for instance) implement this
/// so callers can classify failures without matching on foreign variants.
pub trait HapiErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and console output)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the failed operation may be repeated safely.
    ///
    /// Only read-only device queries are ever retried; callers must still
    /// check the command is idempotent.
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout
        )
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Database => Level::ERROR,
            ErrorCategory::Network
            | ErrorCategory::Timeout
            | ErrorCategory::Device
            | ErrorCategory::Conflict => Level::WARN,
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            _ => Level::WARN,
        }
    }
}

impl HapiErrorTrait for HapiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Discovery { .. } => "DISCOVERY_ERROR",
            Self::CommandTimeout { .. } => "COMMAND_TIMEOUT",
            Self::Connection { .. } => "CONNECTION_FAILED",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::SyncConflict { .. } => "SYNC_CONFLICT",
            Self::Mqtt(_) => "MQTT_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::StartupFailed(_) => "STARTUP_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,

            Self::Persistence(_) => ErrorCategory::Database,

            Self::Connection { .. } | Self::Mqtt(_) => ErrorCategory::Network,

            Self::CommandTimeout { .. } => ErrorCategory::Timeout,

            Self::Discovery { .. } | Self::Protocol(_) => ErrorCategory::Device,

            Self::SyncConflict { .. } => ErrorCategory::Conflict,

            Self::Validation(_) | Self::Serialization(_) => ErrorCategory::Validation,

            Self::NotFound { .. } => ErrorCategory::NotFound,

            Self::Io(_) | Self::StartupFailed(_) | Self::Internal(_) => ErrorCategory::Internal,

            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}
