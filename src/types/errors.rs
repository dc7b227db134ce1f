//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the toolhub core.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation errors (empty name, duplicate provider, empty config).
    #[error("validation error: {0}")]
    Validation(String),

    /// Provider or resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration document could not be persisted.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Tool provider connection failed to initialize.
    #[error("connection error: {0}")]
    Connection(String),

    /// Marketplace listing fetch failed.
    #[error("remote fetch error: {0}")]
    RemoteFetch(String),

    /// Internal errors (closed channels, poisoned state).
    #[error("internal error: {0}")]
    Internal(String),

    /// Timeouts (connection establishment, remote calls).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport errors.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn remote_fetch(msg: impl Into<String>) -> Self {
        Self::RemoteFetch(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
