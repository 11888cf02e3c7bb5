// # HTTP Update Endpoint
//
// This crate calls a vendor's dynamic DNS update URL for the DDNS agent.
//
// ## Implementation Status
//
// - ✅ Exactly one HTTP GET per call
// - ✅ Per-call timeout (20 seconds by default)
// - ✅ Status and trimmed body returned as-is for the engine's classifier
// - ❌ NO retry logic (the next scheduled cycle is the retry)
// - ❌ NO response interpretation (owned by the `ResponseClassifier`)
// - ❌ NO background tasks
//
// ## Trust Level: Untrusted
//
// The rendered URL embeds the plaintext token. It is exposed to the HTTP
// client and nowhere else:
//
// - The URL is never logged; only `RenderedUrl`'s redacted form is
// - `reqwest` errors are stripped of their URL before being formatted
// - The Debug implementation carries no URL or token

use async_trait::async_trait;
use ddns_core::RenderedUrl;
use ddns_core::traits::{EndpointResponse, UpdateEndpoint};
use ddns_core::{Error, Result};
use std::time::Duration;

/// Default HTTP timeout for update calls (20 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Vendor update endpoint over plain HTTP GET
#[derive(Clone)]
pub struct HttpUpdateEndpoint {
    /// HTTP client for update requests
    client: reqwest::Client,

    /// Per-call timeout
    timeout: Duration,
}

impl std::fmt::Debug for HttpUpdateEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpdateEndpoint")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpUpdateEndpoint {
    /// Create an endpoint whose calls are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ddns-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Create an endpoint with [`DEFAULT_HTTP_TIMEOUT`]
    pub fn with_default_timeout() -> Result<Self> {
        Self::new(DEFAULT_HTTP_TIMEOUT)
    }

    /// Configured per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl UpdateEndpoint for HttpUpdateEndpoint {
    async fn call(&self, url: &RenderedUrl) -> Result<EndpointResponse> {
        tracing::debug!("Calling update endpoint: {}", url);

        let response = self
            .client
            .get(url.expose())
            .send()
            .await
            .map_err(|e| Error::network(describe(e)))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| Error::network(describe(e)))?;

        tracing::debug!("Update endpoint answered HTTP {}", status);
        Ok(EndpointResponse::new(status, body.trim()))
    }

    fn endpoint_name(&self) -> &'static str {
        "http-get"
    }
}

/// Format a transport error without the URL it was raised for
fn describe(err: reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    format!("{kind}: {}", err.without_url())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::UrlTemplate;
    use ddns_core::template::TemplateValues;
    use secrecy::SecretString;

    fn rendered(template: &str, token: &str) -> RenderedUrl {
        let token = SecretString::new(token.to_string());
        UrlTemplate::parse(template).unwrap().render(&TemplateValues {
            hostname: "www",
            domain: "example.com",
            token: &token,
            ip: "203.0.113.7".parse().unwrap(),
            id: "1:www",
        })
    }

    #[test]
    fn test_endpoint_name() {
        let endpoint = HttpUpdateEndpoint::with_default_timeout().unwrap();
        assert_eq!(endpoint.endpoint_name(), "http-get");
        assert_eq!(endpoint.timeout(), DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn test_debug_has_no_secrets() {
        let endpoint = HttpUpdateEndpoint::new(Duration::from_secs(3)).unwrap();
        let debug_str = format!("{:?}", endpoint);
        assert!(debug_str.contains("HttpUpdateEndpoint"));
        assert!(debug_str.contains("3s"));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_token() {
        let endpoint = HttpUpdateEndpoint::new(Duration::from_secs(2)).unwrap();
        let url = rendered(
            "http://127.0.0.1:9/update?host={hostname}&domain={domain}&password={token}&ip={ip}",
            "secret_token_12345",
        );

        let err = endpoint.call(&url).await.unwrap_err();

        assert!(matches!(err, Error::Network(_)));
        assert!(!err.to_string().contains("secret_token_12345"));
    }
}
