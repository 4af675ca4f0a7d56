use std::path::PathBuf;

use thiserror::Error;

/// Typed failures surfaced by every nodestore library operation.
///
/// Operators need to tell "never registered" (`NotFound`) from "registered
/// but currently down" (`Unreachable`), so the two are never folded together.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not exist in the KV store.
    #[error("key {key:?} not found")]
    NotFound { key: String },

    /// A directory sits where a leaf was expected (or the reverse), or the
    /// stored bytes are not a valid document.
    #[error("corrupt record at {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Engine client construction or the liveness probe failed.
    #[error("node at {endpoint} is unavailable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// The distributed lock was not obtained within the configured wait.
    #[error("lock {name:?} not acquired within {waited_secs}s")]
    LockTimeout { name: String, waited_secs: u64 },

    /// Non-blocking acquire found the lock held by someone else.
    #[error("lock {name:?} is held by another owner")]
    LockContention { name: String },

    /// Malformed input, e.g. an endpoint without the tcp:// scheme or a
    /// reference to a pod that does not exist.
    #[error("invalid input: {0}")]
    Validation(String),

    /// TLS material sync failed after writing `written` of the three files.
    #[error("TLS material in {} incomplete ({written}/3 files written)", .dir.display())]
    PartialMaterial {
        dir: PathBuf,
        written: usize,
        #[source]
        source: Box<StoreError>,
    },

    /// An engine call other than the liveness probe failed.
    #[error("engine error: {0}")]
    Engine(String),

    /// The KV backend itself reported an error.
    #[error("kv backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn not_found(key: impl Into<String>) -> Self {
        StoreError::NotFound { key: key.into() }
    }

    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn unreachable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Unreachable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn backend(err: impl ToString) -> Self {
        StoreError::Backend(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
