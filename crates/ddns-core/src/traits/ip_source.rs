// # IP Source Trait
//
// Defines the interface for discovering the caller's current public IP.
//
// ## Implementations
//
// - HTTP-based: `ddns-ip-http` crate (GET returning a bare address)
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::IpSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     // Fetch once per cycle, shared by every entry
//     let current_ip = source.current("https://api.ipify.org").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for public-IP discovery
///
/// The endpoint URL comes from the configuration document, so it is passed
/// on every call rather than fixed at construction.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ One HTTP request per call, bounded by a timeout
///
/// ## Forbidden Capabilities
/// - ❌ Caching the address between calls (the engine fetches once per cycle)
/// - ❌ Retry loops (a failure aborts the cycle; the next cycle is the retry)
/// - ❌ Spawning tasks
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Fetch the current public IP address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The current IP address
    /// - `Err(Error::Network)`: Transport failure, timeout, non-success
    ///   status or a body that is not an address
    async fn current(&self, check_ip_url: &str) -> Result<IpAddr, crate::Error>;
}
