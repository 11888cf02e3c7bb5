// # HTTP IP Source
//
// This crate provides the public-IP check used by the DDNS agent.
//
// ## Purpose
//
// One GET per cycle against the `check_ip_url` named in the configuration
// document. The endpoint is expected to reply with a bare IPv4 or IPv6
// address (e.g. api.ipify.org, ifconfig.me/ip, icanhazip.com).
//
// ## Architecture
//
// Single-shot: no polling, no caching and no retry. A failure of any kind
// aborts the current cycle; the next scheduled cycle is the retry.

use async_trait::async_trait;
use ddns_core::traits::IpSource;
use ddns_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Default HTTP timeout for the IP check (20 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Longest body accepted as an address reply
const MAX_BODY_CHARS: usize = 64;

/// HTTP-based public-IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// HTTP client with the per-call timeout applied
    client: reqwest::Client,

    timeout: Duration,
}

impl HttpIpSource {
    /// Create a source whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ddns-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Configured per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self, check_ip_url: &str) -> Result<IpAddr> {
        tracing::debug!("Checking public IP via {}", check_ip_url);

        let response = self
            .client
            .get(check_ip_url)
            .send()
            .await
            .map_err(|e| Error::network(format!("IP check request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(format!("IP check returned HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("IP check body unreadable: {}", e.without_url())))?;

        let ip = parse_ip_body(&body)?;
        tracing::debug!("Public IP is {}", ip);
        Ok(ip)
    }
}

/// Parse an IP-check reply: surrounding whitespace is ignored, anything else
/// must be exactly one address
pub fn parse_ip_body(body: &str) -> Result<IpAddr> {
    let text = body.trim();
    text.parse::<IpAddr>().map_err(|_| {
        let shown: String = text.chars().take(MAX_BODY_CHARS).collect();
        Error::network(format!("IP check returned no address: {shown:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_with_newline() {
        let ip = parse_ip_body("203.0.113.10\n").unwrap();
        assert_eq!(ip, "203.0.113.10".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_parse_ipv6() {
        let ip = parse_ip_body("  2001:db8::1 ").unwrap();
        assert!(ip.is_ipv6());
    }

    #[test]
    fn test_parse_rejects_html() {
        let err = parse_ip_body("<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_parse_rejects_empty_body() {
        assert!(matches!(parse_ip_body(""), Err(Error::Network(_))));
    }

    #[test]
    fn test_parse_truncates_long_body() {
        let body = "x".repeat(500);
        let msg = parse_ip_body(&body).unwrap_err().to_string();
        assert!(msg.len() < 200);
    }

    #[test]
    fn test_source_creation() {
        let source = HttpIpSource::new(Duration::from_secs(5)).unwrap();
        assert_eq!(source.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Port 9 on the loopback interface is closed on test machines
        let source = HttpIpSource::new(Duration::from_secs(2)).unwrap();
        let err = source.current("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
