//! Error types for segwal
//!
//! Provides a unified error type for all WAL operations.

use thiserror::Error;

/// Result type alias using WalError
pub type Result<T> = std::result::Result<T, WalError>;

/// Unified error type for segwal operations
#[derive(Debug, Error)]
pub enum WalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Filesystem failures propagate unmodified; the WAL never retries them.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    /// A fully-present frame failed verification
    #[error("WAL corruption detected at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    /// A buffer handed to `decode` is shorter than the frame it declares
    #[error("Truncated record: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("WAL is closed")]
    Closed,

    /// A failed append left bytes behind that could not be removed
    #[error("WAL poisoned: {0}")]
    Poisoned(String),

    #[error("Sync timer error: {0}")]
    Timer(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WalError {
    /// Shorthand for building a corruption error
    pub fn corruption(offset: u64, reason: impl Into<String>) -> Self {
        WalError::Corruption {
            offset,
            reason: reason.into(),
        }
    }

    /// True for checksum or framing damage
    pub fn is_corruption(&self) -> bool {
        matches!(self, WalError::Corruption { .. })
    }
}

impl From<bincode::Error> for WalError {
    fn from(e: bincode::Error) -> Self {
        WalError::Serialization(e.to_string())
    }
}
