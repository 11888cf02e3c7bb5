// # Update Endpoint Trait
//
// Defines the interface for calling a vendor's dynamic DNS update URL.
//
// ## Implementations
//
// - HTTP GET: `ddns-endpoint-http` crate
//
// The endpoint only moves bytes. Whether the reply means "updated" is decided
// by a [`ResponseClassifier`](crate::classify::ResponseClassifier) owned by
// the engine, because success markers are vendor specific.

use async_trait::async_trait;

use crate::template::RenderedUrl;

/// Raw reply from a vendor endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, trimmed
    pub body: String,
}

impl EndpointResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for vendor update endpoints
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Exactly one HTTP request per call, bounded by a timeout
/// - ✅ Return the status and body as-is
///
/// ## Forbidden Capabilities
/// - ❌ Retry logic (the next scheduled cycle is the retry)
/// - ❌ Logging the exposed URL (it contains the plaintext token)
/// - ❌ Access to the history store or cache
/// - ❌ Deciding whether an update is needed
#[async_trait]
pub trait UpdateEndpoint: Send + Sync {
    /// Perform the update call
    ///
    /// # Returns
    ///
    /// - `Ok(EndpointResponse)`: The vendor answered (any status)
    /// - `Err(Error::Network)`: No usable answer (connect error, timeout)
    async fn call(&self, url: &RenderedUrl) -> Result<EndpointResponse, crate::Error>;

    /// Endpoint name (for logging/debugging)
    fn endpoint_name(&self) -> &'static str;
}
