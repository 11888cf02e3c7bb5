//! Vendor response classification
//!
//! Update endpoints answer in vendor-specific ways: some only use the HTTP
//! status, others return 200 with an error marker in the body. A
//! [`ResponseClassifier`] turns a raw [`EndpointResponse`] into accept or
//! reject; the [`ClassifierRegistry`](crate::registry::ClassifierRegistry)
//! resolves one by name from configuration.

use crate::error::{Error, Result};
use crate::traits::EndpointResponse;

/// Longest response summary kept in history
pub const MAX_SUMMARY_CHARS: usize = 200;

/// Decides whether a vendor reply means the update was applied
pub trait ResponseClassifier: Send + Sync {
    /// `Ok(())` if the vendor accepted the update, `Err(Error::VendorRejected)` otherwise
    fn classify(&self, response: &EndpointResponse) -> Result<()>;

    /// Registry name
    fn name(&self) -> &'static str;
}

/// Any 2xx status is success
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStatusClassifier;

impl ResponseClassifier for HttpStatusClassifier {
    fn classify(&self, response: &EndpointResponse) -> Result<()> {
        require_success_status(response)
    }

    fn name(&self) -> &'static str {
        "http-status"
    }
}

/// Namecheap-style XML replies: 2xx and `<ErrCount>0</ErrCount>`
#[derive(Debug, Clone, Copy, Default)]
pub struct NamecheapClassifier;

impl ResponseClassifier for NamecheapClassifier {
    fn classify(&self, response: &EndpointResponse) -> Result<()> {
        require_success_status(response)?;

        let compact: String = response.body.split_whitespace().collect();
        if compact.contains("<ErrCount>0</ErrCount>") {
            Ok(())
        } else {
            Err(Error::vendor_rejected(summarize(response)))
        }
    }

    fn name(&self) -> &'static str {
        "namecheap"
    }
}

/// dyndns2 protocol: 2xx and a body starting with `good` or `nochg`
#[derive(Debug, Clone, Copy, Default)]
pub struct Dyndns2Classifier;

impl ResponseClassifier for Dyndns2Classifier {
    fn classify(&self, response: &EndpointResponse) -> Result<()> {
        require_success_status(response)?;

        let body = response.body.trim_start();
        if body.starts_with("good") || body.starts_with("nochg") {
            Ok(())
        } else {
            Err(Error::vendor_rejected(summarize(response)))
        }
    }

    fn name(&self) -> &'static str {
        "dyndns2"
    }
}

fn require_success_status(response: &EndpointResponse) -> Result<()> {
    if response.is_success_status() {
        Ok(())
    } else {
        Err(Error::vendor_rejected(summarize(response)))
    }
}

/// One-line summary of a reply for the history feed
pub fn summarize(response: &EndpointResponse) -> String {
    let body: String = response.body.split_whitespace().collect::<Vec<_>>().join(" ");
    if body.is_empty() {
        truncate(&format!("HTTP {}", response.status))
    } else {
        truncate(&format!("HTTP {}: {}", response.status, body))
    }
}

/// Cut a summary to [`MAX_SUMMARY_CHARS`] on a char boundary
pub fn truncate(summary: &str) -> String {
    match summary.char_indices().nth(MAX_SUMMARY_CHARS) {
        Some((idx, _)) => format!("{}...", &summary[..idx]),
        None => summary.to_string(),
    }
}
