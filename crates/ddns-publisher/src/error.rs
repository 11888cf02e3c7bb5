//! Error types for the configuration publisher

use thiserror::Error;

/// Result type alias for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;

/// Why a publish did not complete
///
/// Every variant except [`PublishError::Reload`] is raised before anything
/// is written, so the previous document on disk is left untouched.
#[derive(Error, Debug)]
pub enum PublishError {
    /// A target references a secret that does not exist
    #[error("target {target_id} references missing secret {secret_id}")]
    MissingSecret { target_id: u64, secret_id: u64 },

    /// The stored secret could not be opened or resealed
    #[error("re-encryption failed for target {target_id}: {source}")]
    Reencryption {
        target_id: u64,
        #[source]
        source: ddns_core::Error,
    },

    /// A target carries values that cannot be published
    #[error("target {target_id} is invalid: {reason}")]
    InvalidTarget { target_id: u64, reason: String },

    /// The built document failed the agent's own validation
    #[error("built document rejected: {0}")]
    InvalidDocument(#[source] ddns_core::Error),

    /// Key material or other core failure
    #[error(transparent)]
    Core(#[from] ddns_core::Error),

    /// Filesystem errors while writing the document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed administrative export
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document was written but the service reload failed
    #[error("document published but reloading {service} failed: {reason}")]
    Reload { service: String, reason: String },
}

impl PublishError {
    /// Whether the new document reached disk despite the error
    pub fn document_written(&self) -> bool {
        matches!(self, Self::Reload { .. })
    }
}
