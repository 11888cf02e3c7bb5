//! Administrative state consumed by the publisher
//!
//! The administrative surface exports its secrets and targets as one JSON
//! object. Secrets arrive sealed under the operator key; the publisher never
//! sees them in any other form until re-encryption.
//!
//! ```json
//! {
//!   "secrets": [ { "id": 1, "name": "namecheap", "encrypted_value": "..." } ],
//!   "targets": [ { "id": 7, "hostnames": "@, www", "domain": "example.com",
//!                  "secret_id": 1, "enabled": true, "interval_minutes": 5 } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::Result;

/// An operator secret, sealed under the operator key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSecret {
    pub id: u64,
    pub name: String,
    /// `hex(nonce || ciphertext || tag)` under the operator key
    pub encrypted_value: String,
}

impl std::fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSecret")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("encrypted_value", &"<SEALED>")
            .finish()
    }
}

/// An update target as the operator manages it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: u64,

    /// Comma separated host labels, `@` for the apex
    #[serde(alias = "host")]
    pub hostnames: String,

    pub domain: String,

    pub secret_id: u64,

    #[serde(default = "default_enabled", alias = "is_enabled")]
    pub enabled: bool,

    pub interval_minutes: u64,
}

fn default_enabled() -> bool {
    true
}

impl Target {
    /// Host labels in order, trimmed, without blanks or repeats
    pub fn hostname_list(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.hostnames
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty() && seen.insert(*h))
            .collect()
    }

    /// Interval written into each materialized entry
    pub fn interval_seconds(&self) -> u64 {
        self.interval_minutes.saturating_mul(60)
    }
}

/// Full administrative export handed to the publisher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminState {
    #[serde(default)]
    pub secrets: Vec<StoredSecret>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl AdminState {
    /// Parse an export
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Look up a secret by id
    pub fn secret(&self, id: u64) -> Option<&StoredSecret> {
        self.secrets.iter().find(|s| s.id == id)
    }

    /// Targets that will be materialized
    pub fn enabled_targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| t.enabled)
    }
}
