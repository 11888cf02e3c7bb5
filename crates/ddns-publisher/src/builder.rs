// # Config Document Builder
//
// Turns the administrative state into one `ConfigDocument` and replaces the
// published file atomically.
//
// ## Publish Sequence
//
// 1. Build: every enabled target is expanded into one entry per hostname,
//    each with its secret resealed under the agent key
// 2. Validate with the same validator the agent applies on load
// 3. Write a sibling temp file, fsync, restrict to 0600, rename over the
//    document
// 4. Optionally ask the service manager to reload the agent
//
// Any failure in steps 1-3 leaves the previous document untouched. A reload
// failure is reported after the new document is already in place.

use ddns_core::{ConfigDocument, DocumentEntry, UrlPolicy};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{PublishError, Result};
use crate::models::AdminState;
use crate::reencrypt::Reencryptor;

/// Default public-IP endpoint written into the document
pub const DEFAULT_CHECK_IP_URL: &str = "https://api.ipify.org";

/// Default vendor template (Namecheap dynamic DNS)
pub const DEFAULT_UPDATE_URL_TEMPLATE: &str = "https://dynamicdns.park-your-domain.com/update?host={hostname}&domain={domain}&password={token}&ip={ip}";

/// Default published document location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ddns-agent/config.enc.json";

/// Assembles configuration documents
#[derive(Debug)]
pub struct DocumentBuilder {
    reencryptor: Reencryptor,
    check_ip_url: String,
    update_url_template: String,
    policy: UrlPolicy,
}

impl DocumentBuilder {
    pub fn new(
        reencryptor: Reencryptor,
        check_ip_url: impl Into<String>,
        update_url_template: impl Into<String>,
    ) -> Self {
        Self {
            reencryptor,
            check_ip_url: check_ip_url.into(),
            update_url_template: update_url_template.into(),
            policy: UrlPolicy::new(),
        }
    }

    /// Validate against a restricted URL policy
    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build and validate the document for the current state
    pub fn build(&self, state: &AdminState) -> Result<ConfigDocument> {
        let mut entries = Vec::new();

        for target in state.enabled_targets() {
            if target.interval_minutes == 0 {
                return Err(PublishError::InvalidTarget {
                    target_id: target.id,
                    reason: "interval_minutes must be a positive integer".to_string(),
                });
            }

            let hostnames = target.hostname_list();
            if hostnames.is_empty() {
                tracing::warn!("Target {} has no hostnames, nothing to publish", target.id);
                continue;
            }

            let secret = state
                .secret(target.secret_id)
                .ok_or(PublishError::MissingSecret {
                    target_id: target.id,
                    secret_id: target.secret_id,
                })?;

            for hostname in hostnames {
                // Fresh nonce per entry, so siblings never share ciphertext
                let encrypted_token = self
                    .reencryptor
                    .reencrypt(&secret.encrypted_value)
                    .map_err(|source| PublishError::Reencryption {
                        target_id: target.id,
                        source,
                    })?;

                entries.push(DocumentEntry {
                    id: DocumentEntry::entry_id(target.id, hostname),
                    hostname: hostname.to_string(),
                    domain: target.domain.trim().to_string(),
                    update_url_template: self.update_url_template.clone(),
                    encrypted_token,
                    interval_seconds: target.interval_seconds(),
                });
            }
        }

        let document = ConfigDocument {
            check_ip_url: self.check_ip_url.clone(),
            targets: entries,
        };
        document
            .validate(&self.policy)
            .map_err(PublishError::InvalidDocument)?;

        tracing::debug!(
            "Built document with {} entries from {} targets",
            document.targets.len(),
            state.targets.len()
        );
        Ok(document)
    }
}

/// Service manager reload issued after a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReload {
    /// Program invoked as `<program> reload <service>`
    pub program: String,
    pub service: String,
}

impl ServiceReload {
    /// `systemctl reload <service>`
    pub fn systemctl(service: impl Into<String>) -> Self {
        Self {
            program: "systemctl".to_string(),
            service: service.into(),
        }
    }

    async fn run(&self) -> Result<()> {
        let output = tokio::process::Command::new(&self.program)
            .arg("reload")
            .arg(&self.service)
            .output()
            .await
            .map_err(|e| self.failure(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(self.failure(format!("{}: {}", output.status, stderr.trim())))
        }
    }

    fn failure(&self, reason: String) -> PublishError {
        PublishError::Reload {
            service: self.service.clone(),
            reason,
        }
    }
}

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub path: PathBuf,
    pub entries: usize,
    pub reloaded: bool,
}

/// Builds, writes and announces configuration documents
#[derive(Debug)]
pub struct Publisher {
    builder: DocumentBuilder,
    path: PathBuf,
    reload: Option<ServiceReload>,
}

impl Publisher {
    pub fn new(builder: DocumentBuilder, path: impl Into<PathBuf>) -> Self {
        Self {
            builder,
            path: path.into(),
            reload: None,
        }
    }

    /// Reload a service after each successful write
    pub fn with_reload(mut self, reload: ServiceReload) -> Self {
        self.reload = Some(reload);
        self
    }

    /// Published document location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish the document for `state`
    pub async fn publish(&self, state: &AdminState) -> Result<PublishReport> {
        let document = self.builder.build(state)?;
        let payload = document.to_json()?;

        write_atomic(&self.path, payload.as_bytes()).await?;
        tracing::info!(
            "Published {} entries to {}",
            document.targets.len(),
            self.path.display()
        );

        let reloaded = match &self.reload {
            Some(reload) => {
                reload.run().await?;
                tracing::info!("Reloaded {}", reload.service);
                true
            }
            None => false,
        };

        Ok(PublishReport {
            path: self.path.clone(),
            entries: document.targets.len(),
            reloaded,
        })
    }
}

/// Replace `path` so that readers see either the old or the new contents
///
/// Each call writes to its own uniquely named temp file in the target
/// directory, so concurrent publishes never share an inode.
async fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let target = path.to_path_buf();
    let payload = payload.to_vec();
    let dir = parent.clone();
    tokio::task::spawn_blocking(move || persist_temp(&dir, &target, &payload))
        .await
        .map_err(std::io::Error::other)??;

    // Persist the rename itself
    #[cfg(unix)]
    {
        if let Ok(dir) = tokio::fs::File::open(&parent).await {
            if let Err(e) = dir.sync_all().await {
                tracing::debug!("Directory sync failed for {}: {}", parent.display(), e);
            }
        }
    }

    Ok(())
}

fn persist_temp(dir: &Path, target: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    temp.write_all(payload)?;
    temp.as_file().sync_all()?;
    // A temp file that fails to persist is removed on drop
    temp.persist(target)?;
    Ok(())
}
