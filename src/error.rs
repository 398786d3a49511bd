//! Common error types for scanlens

use thiserror::Error;

/// Common result type for scanlens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the ingest/aggregate/overlay/export core
///
/// Ingest failures are split so callers can show targeted remediation:
/// a record missing its `type` field almost always means the scanner was
/// invoked without file-info collection, while a structural JSON error
/// means the document itself is damaged.
#[derive(Error, Debug)]
pub enum Error {
    /// A scanned record lacks the required file `type` field
    #[error("missing file 'type' information for record '{}'", .path.as_deref().unwrap_or("<unknown>"))]
    MissingFileInfo {
        /// Path of the offending record, when it carried one
        path: Option<String>,
    },

    /// The input document is not valid JSON or violates structural expectations
    #[error("malformed scan document: {detail}")]
    MalformedDocument {
        /// Underlying parse diagnostic
        detail: String,
    },

    /// A path cannot be placed in the tree (absolute, empty, or contains `..`)
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Underlying store read/write failure (wraps sqlx::Error)
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure outside the ingest parse path
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid caller input or request
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the two ingest-abort classes callers show remediation for
    pub fn is_ingest_fault(&self) -> bool {
        matches!(
            self,
            Error::MissingFileInfo { .. } | Error::MalformedDocument { .. }
        )
    }
}
