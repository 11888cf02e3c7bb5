//! Error types for the DDNS agent
//!
//! The variants follow the failure taxonomy of the update engine: what a
//! failure means for the cycle is decided by the caller, not by the error.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS agent
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed, incomplete or policy-violating configuration document
    #[error("Configuration invalid: {0}")]
    ConfigInvalid(String),

    /// A sealed token could not be opened (key mismatch or corrupt ciphertext)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Timeout, connection error or unusable reply from a remote endpoint
    #[error("Network failure: {0}")]
    Network(String),

    /// The vendor answered but refused the update
    #[error("Vendor rejected update: {0}")]
    VendorRejected(String),

    /// History or cache persistence failed
    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    /// Key material could not be parsed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// URL template could not be parsed or rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    /// Create a decryption error
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::DecryptionFailed(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a vendor rejection
    pub fn vendor_rejected(msg: impl Into<String>) -> Self {
        Self::VendorRejected(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreWriteFailed(msg.into())
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreWriteFailed(err.to_string())
    }
}
