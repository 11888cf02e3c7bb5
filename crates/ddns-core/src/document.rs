//! Configuration document exchanged between the publisher and the agent
//!
//! The document is a fixed, versionless JSON contract. Every field is
//! required and unknown fields are rejected, so a document produced by a
//! mismatched publisher fails validation instead of silently defaulting.
//!
//! ```json
//! {
//!   "check_ip_url": "https://api.ipify.org",
//!   "targets": [
//!     {
//!       "id": "7:www",
//!       "hostname": "www",
//!       "domain": "example.com",
//!       "update_url_template": "https://vendor.example/update?host={hostname}&domain={domain}&password={token}&ip={ip}",
//!       "encrypted_token": "9f2c...",
//!       "interval_seconds": 300
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::crypto::SealedToken;
use crate::error::{Error, Result};
use crate::template::UrlTemplate;
use crate::url_policy::UrlPolicy;

/// Lowest interval an entry may declare, in seconds
pub const MIN_INTERVAL_SECS: u64 = 1;

/// The versionless configuration document handed to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    /// Public-IP endpoint returning a bare address
    pub check_ip_url: String,

    /// One entry per materialized hostname
    pub targets: Vec<DocumentEntry>,
}

/// One (hostname, domain, token, interval) unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentEntry {
    /// Entry id, unique within the document (`<target id>:<hostname>`)
    pub id: String,

    /// Host label, `@` for the apex
    pub hostname: String,

    /// Zone the host belongs to
    pub domain: String,

    /// Vendor URL template
    pub update_url_template: String,

    /// Token sealed under the agent key
    pub encrypted_token: SealedToken,

    /// Update interval for this entry
    pub interval_seconds: u64,
}

impl DocumentEntry {
    /// Build the canonical entry id for one hostname of a target
    pub fn entry_id(target_id: impl std::fmt::Display, hostname: &str) -> String {
        format!("{target_id}:{hostname}")
    }

    /// Update interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Parse the entry's URL template
    pub fn template(&self) -> Result<UrlTemplate> {
        UrlTemplate::parse(&self.update_url_template)
    }

    fn validate(&self, policy: &UrlPolicy) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config_invalid("entry id cannot be empty"));
        }
        let context = |msg: String| Error::config_invalid(format!("entry {}: {}", self.id, msg));

        if self.hostname.trim().is_empty() {
            return Err(context("hostname cannot be empty".to_string()));
        }
        if self.domain.trim().is_empty() {
            return Err(context("domain cannot be empty".to_string()));
        }
        if self.encrypted_token.is_empty() {
            return Err(context("encrypted_token cannot be empty".to_string()));
        }
        if self.interval_seconds < MIN_INTERVAL_SECS {
            return Err(context(format!(
                "interval_seconds must be >= {MIN_INTERVAL_SECS}"
            )));
        }

        let template = self.template().map_err(|e| context(e.to_string()))?;
        policy
            .check_template_prefix(template.literal_prefix())
            .map_err(|e| context(e.to_string()))?;
        Ok(())
    }
}

impl ConfigDocument {
    /// Parse and validate a document in one step
    ///
    /// Nothing from a document that fails here may be acted on.
    pub fn from_json(json: &str, policy: &UrlPolicy) -> Result<Self> {
        let document: ConfigDocument = serde_json::from_str(json)
            .map_err(|e| Error::config_invalid(format!("malformed document: {e}")))?;
        document.validate(policy)?;
        Ok(document)
    }

    /// Serialize for publishing
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the whole document
    pub fn validate(&self, policy: &UrlPolicy) -> Result<()> {
        policy
            .check_url(&self.check_ip_url)
            .map_err(|e| Error::config_invalid(format!("check_ip_url: {e}")))?;

        let mut seen = HashSet::new();
        for entry in &self.targets {
            entry.validate(policy)?;
            if !seen.insert(entry.id.as_str()) {
                return Err(Error::config_invalid(format!(
                    "duplicate entry id {}",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    /// Hostnames in document order
    pub fn hostnames(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.hostname.as_str()).collect()
    }

    /// Smallest entry interval, if any entries exist
    pub fn min_interval(&self) -> Option<Duration> {
        self.targets.iter().map(DocumentEntry::interval).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "https://dynamicdns.park-your-domain.com/update?host={hostname}&domain={domain}&password={token}&ip={ip}";

    fn entry(id: &str, hostname: &str) -> DocumentEntry {
        DocumentEntry {
            id: id.to_string(),
            hostname: hostname.to_string(),
            domain: "example.com".to_string(),
            update_url_template: TEMPLATE.to_string(),
            encrypted_token: SealedToken::new("00112233445566778899aabbccddeeff00112233445566778899"),
            interval_seconds: 300,
        }
    }

    fn document(targets: Vec<DocumentEntry>) -> ConfigDocument {
        ConfigDocument {
            check_ip_url: "https://api.ipify.org".to_string(),
            targets,
        }
    }

    #[test]
    fn test_json_roundtrip_keeps_entries() {
        let doc = document(vec![entry("1:@", "@"), entry("1:www", "www")]);
        let json = doc.to_json().unwrap();

        let parsed = ConfigDocument::from_json(&json, &UrlPolicy::new()).unwrap();
        assert_eq!(parsed, doc);
        assert_eq!(parsed.hostnames(), vec!["@", "www"]);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"targets": []}"#;
        let err = ConfigDocument::from_json(json, &UrlPolicy::new()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));

        let mut value = serde_json::to_value(document(vec![entry("1:www", "www")])).unwrap();
        value["targets"][0]
            .as_object_mut()
            .unwrap()
            .remove("interval_seconds");
        let err = ConfigDocument::from_json(&value.to_string(), &UrlPolicy::new()).unwrap_err();
        assert!(err.to_string().contains("interval_seconds"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut value = serde_json::to_value(document(vec![])).unwrap();
        value["version"] = serde_json::json!(2);
        assert!(ConfigDocument::from_json(&value.to_string(), &UrlPolicy::new()).is_err());
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        let json = document(vec![entry("1:www", "www")]).to_json().unwrap();
        let truncated = &json[..json.len() / 2];
        assert!(ConfigDocument::from_json(truncated, &UrlPolicy::new()).is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let mut e = entry("1:www", "www");
        e.interval_seconds = 0;
        let err = document(vec![e]).validate(&UrlPolicy::new()).unwrap_err();
        assert!(err.to_string().contains("interval_seconds"));
    }

    #[test]
    fn test_template_without_token_is_rejected() {
        let mut e = entry("1:www", "www");
        e.update_url_template = "https://vendor.example/update?ip={ip}".to_string();
        let err = document(vec![e]).validate(&UrlPolicy::new()).unwrap_err();
        assert!(err.to_string().contains("{token}"));
    }

    #[test]
    fn test_template_host_is_policy_checked() {
        let mut e = entry("1:www", "www");
        e.update_url_template = "http://vendor.example/?h={hostname}&d={domain}&t={token}&ip={ip}".to_string();
        assert!(document(vec![e]).validate(&UrlPolicy::new()).is_err());

        let mut e = entry("1:www", "www");
        e.update_url_template = "https://{hostname}.{domain}/?t={token}&ip={ip}".to_string();
        assert!(document(vec![e]).validate(&UrlPolicy::new()).is_err());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let doc = document(vec![entry("1:www", "www"), entry("1:www", "www")]);
        let err = doc.validate(&UrlPolicy::new()).unwrap_err();
        assert!(err.to_string().contains("duplicate entry id"));
    }

    #[test]
    fn test_empty_target_list_is_valid() {
        let doc = document(vec![]);
        assert!(doc.validate(&UrlPolicy::new()).is_ok());
        assert_eq!(doc.min_interval(), None);
    }

    #[test]
    fn test_min_interval() {
        let mut a = entry("1:a", "a");
        a.interval_seconds = 600;
        let mut b = entry("1:b", "b");
        b.interval_seconds = 180;
        assert_eq!(
            document(vec![a, b]).min_interval(),
            Some(Duration::from_secs(180))
        );
    }
}
