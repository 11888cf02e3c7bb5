//! Per-entry update sequence
//!
//! For one entry and the cycle's public IP:
//!
//! 1. Cached IP equals the current IP: record `skipped`, no vendor call
//! 2. Open the sealed token with the agent key
//! 3. Render the update URL and call the vendor
//! 4. Classify the reply: success writes history and cache together,
//!    anything else records `error` and leaves the cache alone
//!
//! Every failure stays local to the entry. Store failures are logged and
//! never abort the cycle.

use secrecy::{ExposeSecret, SecretString};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::classify::{ResponseClassifier, summarize, truncate};
use crate::crypto::AgentKey;
use crate::document::DocumentEntry;
use crate::error::{Error, Result};
use crate::template::{RenderedUrl, TemplateValues};
use crate::traits::{
    EndpointResponse, HistoryStore, NewHistoryRecord, UpdateEndpoint, UpdateStatus,
};

/// What happened to one entry in one cycle
#[derive(Debug)]
pub enum EntryOutcome {
    /// Current IP already accepted by the vendor
    Skipped,
    /// Vendor accepted the update
    Updated,
    /// Decryption, transport or vendor failure
    Failed(Error),
}

impl EntryOutcome {
    /// History status for this outcome
    pub fn status(&self) -> UpdateStatus {
        match self {
            EntryOutcome::Skipped => UpdateStatus::Skipped,
            EntryOutcome::Updated => UpdateStatus::Success,
            EntryOutcome::Failed(_) => UpdateStatus::Error,
        }
    }
}

/// Runs the update sequence for single entries
pub struct TargetUpdater {
    endpoint: Arc<dyn UpdateEndpoint>,
    classifier: Arc<dyn ResponseClassifier>,
    store: Arc<dyn HistoryStore>,
    key: AgentKey,
}

impl TargetUpdater {
    /// Create an updater
    pub fn new(
        endpoint: Arc<dyn UpdateEndpoint>,
        classifier: Arc<dyn ResponseClassifier>,
        store: Arc<dyn HistoryStore>,
        key: AgentKey,
    ) -> Self {
        Self {
            endpoint,
            classifier,
            store,
            key,
        }
    }

    /// Store the updater writes to
    pub fn store(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.store)
    }

    /// Update one entry
    ///
    /// `cached_ip` is the entry's row from the cache snapshot taken at the
    /// start of the cycle.
    pub async fn update_entry(
        &self,
        entry: &DocumentEntry,
        ip: IpAddr,
        cached_ip: Option<IpAddr>,
    ) -> EntryOutcome {
        if cached_ip == Some(ip) {
            debug!("Entry {} already points at {}, skipping", entry.id, ip);
            self.append(NewHistoryRecord::for_entry(
                &entry.id,
                UpdateStatus::Skipped,
                Some(ip),
                format!("IP unchanged ({ip})"),
            ))
            .await;
            return EntryOutcome::Skipped;
        }

        let token = match self.key.open(&entry.encrypted_token) {
            Ok(token) => token,
            Err(e) => return self.fail(entry, ip, e).await,
        };

        let url = match render(entry, &token, ip) {
            Ok(url) => url,
            Err(e) => return self.fail(entry, ip, e).await,
        };

        debug!(
            "Calling {} endpoint for {}: {}",
            self.endpoint.endpoint_name(),
            entry.id,
            url
        );

        let verdict = match self.endpoint.call(&url).await {
            Ok(response) => {
                let response =
                    EndpointResponse::new(response.status, redact(&response.body, &token));
                self.classifier
                    .classify(&response)
                    .map(|()| summarize(&response))
            }
            Err(e) => Err(e),
        };

        match verdict {
            Ok(summary) => {
                info!("Updated {} -> {}", entry.id, ip);
                if let Err(e) = self.store.record_success(&entry.id, ip, &summary).await {
                    error!("Failed to record success for {}: {}", entry.id, e);
                }
                EntryOutcome::Updated
            }
            Err(e) => {
                let e = redact_error(e, &token);
                self.fail(entry, ip, e).await
            }
        }
    }

    async fn fail(&self, entry: &DocumentEntry, ip: IpAddr, err: Error) -> EntryOutcome {
        warn!("Update failed for {}: {}", entry.id, err);
        self.append(NewHistoryRecord::for_entry(
            &entry.id,
            UpdateStatus::Error,
            Some(ip),
            truncate(&err.to_string()),
        ))
        .await;
        EntryOutcome::Failed(err)
    }

    async fn append(&self, record: NewHistoryRecord) {
        let entry_id = record.entry_id.clone().unwrap_or_default();
        if let Err(e) = self.store.append(record).await {
            error!("Failed to append history for {}: {}", entry_id, e);
        }
    }
}

impl std::fmt::Debug for TargetUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetUpdater")
            .field("endpoint", &self.endpoint.endpoint_name())
            .field("classifier", &self.classifier.name())
            .field("key", &self.key)
            .finish()
    }
}

fn render(entry: &DocumentEntry, token: &SecretString, ip: IpAddr) -> Result<RenderedUrl> {
    let template = entry.template()?;
    Ok(template.render(&TemplateValues {
        hostname: &entry.hostname,
        domain: &entry.domain,
        token,
        ip,
        id: &entry.id,
    }))
}

/// Vendors sometimes echo the request back; keep the token out of history
///
/// Both the raw token and the percent-encoded form that appears in the
/// rendered URL are replaced. Runs on the whole text before any truncation.
fn redact(text: &str, token: &SecretString) -> String {
    let secret = token.expose_secret();
    if secret.is_empty() {
        return text.to_string();
    }
    let encoded = urlencoding::encode(secret);
    let text = if encoded.as_ref() != secret.as_str() {
        text.replace(encoded.as_ref(), "<REDACTED>")
    } else {
        text.to_string()
    };
    text.replace(secret.as_str(), "<REDACTED>")
}

fn redact_error(err: Error, token: &SecretString) -> Error {
    match err {
        Error::VendorRejected(msg) => Error::VendorRejected(redact(&msg, token)),
        Error::Network(msg) => Error::Network(redact(&msg, token)),
        other => other,
    }
}
