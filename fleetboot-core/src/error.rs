//! Error types for fleetboot
//!
//! Covers store, metadata, configuration and output failures. Losing an
//! election and exhausting discovery are outcomes, not errors, and do not
//! appear here.

use thiserror::Error;

/// Primary error type for all fleetboot operations
#[derive(Debug, Error)]
pub enum FleetError {
    // ========== Store Errors ==========

    /// Store call failed for a reason other than a conditional-check rejection
    #[error("Store unavailable during {operation}: {message}")]
    StoreUnavailable { operation: &'static str, message: String },

    /// Store returned a payload we could not interpret
    #[error("Malformed election record for {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    // ========== Host Errors ==========

    /// Instance metadata lookup failed
    #[error("Instance metadata lookup failed: {message}")]
    Metadata { message: String },

    /// Deployment manifest missing or unreadable
    #[error("Deployment manifest invalid: {reason}")]
    Manifest { reason: String },

    /// Configuration value missing or unparsable
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ========== Output Errors ==========

    /// Writing a generated file failed
    #[error("Failed to render {path}: {reason}")]
    Render { path: String, reason: String },

    /// Supervisor export command exited unsuccessfully
    #[error("Supervisor export exited with {status}")]
    ExportFailed { status: String },

    /// Underlying I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// Shorthand for a store failure on the named operation
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        FleetError::StoreUnavailable {
            operation,
            message: message.into(),
        }
    }

    /// Returns true if a later bootstrap attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FleetError::StoreUnavailable { .. } | FleetError::Metadata { .. }
        )
    }

    /// Process exit status: `EX_TEMPFAIL` (75) when retryable, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.is_retryable() {
            EXIT_TEMPFAIL
        } else {
            1
        }
    }
}

/// sysexits.h temporary failure
pub const EXIT_TEMPFAIL: u8 = 75;

/// Result type alias for fleetboot operations
pub type Result<T> = std::result::Result<T, FleetError>;
