//! Error types for the persistence layer.
//!
//! All errors are propagated via [`StoreError`], which wraps the underlying
//! I/O and [`serde_json`] errors with the key that was being accessed.

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on key {key}: {source}")]
    Io {
        /// The key being accessed.
        key: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A stored value could not be encoded or decoded.
    #[error("serialization error on key {key}: {source}")]
    Serialization {
        /// The key being accessed.
        key: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The in-memory store's lock was poisoned by a panicking writer.
    #[error("memory store lock poisoned")]
    Poisoned,

    /// The world namespace is empty or contains characters that cannot
    /// form a storage key.
    #[error("invalid world namespace: {0:?}")]
    InvalidNamespace(String),
}
