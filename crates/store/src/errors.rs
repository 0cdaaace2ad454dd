//! Error types for the token store.

use thiserror::Error;

/// Result type for token store operations.
pub type TokenStoreResult<T> = Result<T, TokenStoreError>;

/// Errors that can occur during token store operations.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// A single legacy record was not a mapping. Recovered by skipping the
    /// record during migration.
    #[error("malformed legacy record '{id}': {reason}")]
    MalformedLegacyRecord { id: String, reason: String },

    /// The attribute store rejected a write.
    #[error("persistence write failed for key '{key}': {source}")]
    PersistenceWriteFailed {
        key: String,
        #[source]
        source: AttributeStoreError,
    },

    /// The attribute store failed a read. Plain reads convert this into an
    /// empty result; mutations and explicit migration return it.
    #[error("persistence read failed for key '{key}': {source}")]
    PersistenceReadFailed {
        key: String,
        #[source]
        source: AttributeStoreError,
    },

    /// The current key holds data that is not a current-format collection.
    /// Mutations refuse to overwrite it.
    #[error("stored tokens under '{key}' are unreadable: {reason}")]
    UnreadableCollection { key: String, reason: String },

    /// Failed to serialize a token collection, e.g. a non-finite metadata
    /// float.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Attribute store specific errors.
#[derive(Debug, Error)]
pub enum AttributeStoreError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be parsed.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    /// Backend refused the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
