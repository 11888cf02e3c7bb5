// # Config Loader / Watcher
//
// Reads the configuration document from disk and tells the engine when it
// should be read again.
//
// ## Change Detection
//
// - `changed()`: the file's modification time differs from the one seen at
//   the last load attempt (successful or not)
// - `ReloadHandle::request_reload()`: explicit trigger, safe from any task
//   or signal handler
//
// The modification time is sampled before the file is read. A write that
// lands while the file is being read leaves a newer mtime behind, so it is
// picked up on the next check instead of being lost.
//
// A document that fails to load still has its mtime remembered: a corrupt
// file produces one rejection, not one per cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tokio::sync::Notify;
use tracing::debug;

use crate::document::ConfigDocument;
use crate::error::{Error, Result};
use crate::url_policy::UrlPolicy;

/// Cloneable handle for requesting a configuration reload
///
/// Multiple requests before the engine looks at the flag collapse into one
/// reload.
#[derive(Debug, Clone, Default)]
pub struct ReloadHandle {
    pending: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ReloadHandle {
    /// Create a handle with no pending request
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a reload and wake the engine if it is idle
    pub fn request_reload(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether a request is pending, without consuming it
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Consume the pending request, if any
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    /// Wait until a reload is requested
    ///
    /// Returns at once if a request is already pending. A wakeup left over
    /// from a request that was consumed in the meantime is ignored.
    pub async fn notified(&self) {
        while !self.is_pending() {
            self.notify.notified().await;
        }
    }
}

/// Loads and validates the configuration document
#[derive(Debug)]
pub struct ConfigLoader {
    path: PathBuf,
    policy: UrlPolicy,
    last_modified: Option<SystemTime>,
    attempted: bool,
    reload: ReloadHandle,
}

impl ConfigLoader {
    /// Create a loader for the document at `path`
    pub fn new(path: impl Into<PathBuf>, policy: UrlPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            last_modified: None,
            attempted: false,
            reload: ReloadHandle::new(),
        }
    }

    /// Document path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URL policy applied during validation
    pub fn policy(&self) -> &UrlPolicy {
        &self.policy
    }

    /// Handle for triggering reloads from outside the engine
    pub fn reload_handle(&self) -> ReloadHandle {
        self.reload.clone()
    }

    /// Whether `load` has been called at least once
    pub fn has_attempted(&self) -> bool {
        self.attempted
    }

    /// Whether the file changed since the last load attempt
    ///
    /// A missing or unreadable file reports no change.
    pub async fn changed(&self) -> bool {
        match modified(&self.path).await {
            Ok(mtime) => self.last_modified != Some(mtime),
            Err(_) => false,
        }
    }

    /// Read, parse and validate the document
    ///
    /// # Returns
    ///
    /// - `Ok(ConfigDocument)`: A fully validated document
    /// - `Err(Error::ConfigInvalid)`: The file is missing, unreadable,
    ///   malformed or violates validation; nothing from it may be used
    pub async fn load(&mut self) -> Result<ConfigDocument> {
        let shown = self.path.display().to_string();
        self.attempted = true;

        let mtime = modified(&self.path)
            .await
            .map_err(|e| Error::config_invalid(format!("cannot stat {shown}: {e}")))?;
        self.last_modified = Some(mtime);

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::config_invalid(format!("cannot read {shown}: {e}")))?;

        let document = ConfigDocument::from_json(&raw, &self.policy)?;
        debug!(
            "Loaded {} with {} entries",
            shown,
            document.targets.len()
        );
        Ok(document)
    }
}

async fn modified(path: &Path) -> std::io::Result<SystemTime> {
    tokio::fs::metadata(path).await?.modified()
}
