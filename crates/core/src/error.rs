//! Error types for weaver-core.
//!
//! Uses a hierarchical error enum so callers can pattern-match on
//! the subsystem that failed. Each subsystem also has its own error
//! type internally, which gets converted to `CoreError` at the boundary.
//!
//! Variants map onto the engine's error taxonomy: `Configuration` is fatal
//! at load, `ValidationRejection` is non-fatal and attached as a reason to
//! a scan/watch event, `Io` is per-file and isolated, `Embedding` is
//! per-batch (retried then isolated), `Store` is fatal for the enclosing
//! transaction only, `WatcherOverflow` is non-fatal and triggers a
//! targeted rescan, `Cancelled` is a cooperative stop, and `Schema` is
//! fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

use crate::discovery::ValidationReason;

/// Top-level error type for all weaver-core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration failed to load or failed validation. Fatal at load.
    #[error("configuration error: {details}")]
    Config {
        /// What's wrong with the config.
        details: String,
    },

    /// A path was rejected by the validator. Non-fatal; carried as a reason
    /// alongside the scan/watch event that produced it.
    #[error("validation rejected {path}: {reason:?}")]
    ValidationRejection {
        /// Path that failed validation.
        path: PathBuf,
        /// Why it was rejected.
        reason: ValidationReason,
    },

    /// A single file failed a read/write. Isolated; the rest of the batch continues.
    #[error("I/O error for {path:?}: {source}")]
    Io {
        /// Path involved, if known.
        path: Option<PathBuf>,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A single file failed to parse. The rest of the index is fine.
    #[error("parse error for {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// Embedding inference failed for a batch. Retried with backoff, then
    /// the batch is isolated and keyword search still works.
    #[error("embedding error: {message}")]
    Embedding {
        /// Human-readable error description.
        message: String,
    },

    /// The embedding model is unavailable (not downloaded, failed to load).
    /// System degrades to keyword-only search.
    #[error("embedding model unavailable: {reason}")]
    ModelUnavailable {
        /// Why the model couldn't be loaded.
        reason: String,
    },

    /// The store's enclosing transaction failed. Fatal for that file only;
    /// the batch continues with the file marked failed.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// The watcher's OS-level event queue overflowed. Non-fatal; triggers
    /// a targeted rescan of the affected root.
    #[error("watcher overflow on {root}")]
    WatcherOverflow {
        /// Root whose watch overflowed.
        root: PathBuf,
    },

    /// A cooperative cancellation was requested mid-operation.
    #[error("cancellation requested")]
    Cancelled,

    /// Schema creation or migration failed at startup. Fatal, prevents
    /// service start.
    #[error("schema error: {details}")]
    Schema {
        /// Diagnostic details.
        details: String,
    },

    /// Requested entity was not found in the index.
    #[error("not found: {entity}")]
    NotFound {
        /// Description of what was not found.
        entity: String,
    },

    /// Serialization/deserialization error (config, cache, vectors).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

/// Convenience type alias for Results in weaver-core.
pub type CoreResult<T> = Result<T, CoreError>;
