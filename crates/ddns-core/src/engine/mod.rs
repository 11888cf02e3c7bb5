//! Update scheduler
//!
//! The UpdateEngine is responsible for:
//! - Loading the configuration document (at startup, on change, on request)
//! - Fetching the public IP once per cycle
//! - Deciding which entries are due and handing them to the TargetUpdater
//! - Sleeping between cycles, interruptible by reload and shutdown
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐   ┌─────────────┐
//!  │ ConfigLoader │   │  IpSource   │
//!  └──────────────┘   └─────────────┘
//!          │                 │
//!          └────────┬────────┘
//!                   ▼
//!           ┌──────────────┐
//!           │ UpdateEngine │──── EngineEvent ───▶ (monitoring)
//!           └──────────────┘
//!                   │ due entries
//!                   ▼
//!          ┌───────────────┐       ┌──────────────┐
//!          │ TargetUpdater │──────▶│ HistoryStore │
//!          └───────────────┘       └──────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Reload if requested or if the file changed; a rejected document is
//!    recorded once and the cycle ends with the previous document in place
//! 2. Fetch the public IP; a failure is recorded and ends the cycle
//! 3. Read the cache snapshot
//! 4. Update every due entry, checking for shutdown between entries
//! 5. Optionally trim history
//!
//! An entry is due if it has not been attempted since the last load, or
//! its interval has elapsed since its last attempt.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::document::ConfigDocument;
use crate::error::Result;
use crate::loader::{ConfigLoader, ReloadHandle};
use crate::traits::{HistoryStore, IpSource, NewHistoryRecord};
use crate::updater::{EntryOutcome, TargetUpdater};

/// Events emitted by the UpdateEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started,

    /// A new document replaced the active one
    ConfigReloaded { entries: usize },

    /// A document failed to load; the previous one stays active
    ConfigRejected { error: String },

    /// Cycle began with the given public IP
    CycleStarted { ip: IpAddr },

    /// Cycle ended before any entry was processed
    CycleAborted { reason: String },

    /// Entry skipped, IP already accepted
    EntrySkipped { entry_id: String, ip: IpAddr },

    /// Vendor accepted the update
    EntryUpdated { entry_id: String, ip: IpAddr },

    /// Entry failed; retried on its next due cycle
    EntryFailed { entry_id: String, error: String },

    /// Cycle completed
    CycleFinished {
        updated: usize,
        skipped: usize,
        failed: usize,
    },

    /// Engine stopped
    Stopped { reason: String },
}

/// Why a cycle ended without processing entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAbort {
    /// No document has been loaded yet
    NoDocument,
    /// The document on disk was rejected this cycle
    ConfigRejected(String),
    /// The public IP could not be determined
    IpCheckFailed(String),
}

/// Result of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the cycle ended early
    pub aborted: Option<CycleAbort>,
    /// Shutdown arrived before every due entry was processed
    pub interrupted: bool,
}

impl CycleReport {
    fn aborted(reason: CycleAbort) -> Self {
        Self {
            aborted: Some(reason),
            ..Self::default()
        }
    }

    /// Entries that reached the updater
    pub fn processed(&self) -> usize {
        self.updated + self.skipped + self.failed
    }
}

/// Shutdown receiver that can be checked without blocking
///
/// Remembers completion so the oneshot is never polled again afterwards.
struct Shutdown {
    rx: oneshot::Receiver<()>,
    received: bool,
}

impl Shutdown {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self {
            rx,
            received: false,
        }
    }

    /// Non-blocking check; a dropped sender counts as shutdown
    fn requested(&mut self) -> bool {
        if !self.received {
            self.received = !matches!(
                self.rx.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            );
        }
        self.received
    }

    async fn wait(&mut self) {
        if !self.received {
            let _ = (&mut self.rx).await;
            self.received = true;
        }
    }
}

/// Core update engine
///
/// Runs a single loop: no two cycles ever overlap. The active document and
/// attempt bookkeeping are owned by the loop; the only state shared with the
/// outside is the [`ReloadHandle`] flag.
///
/// ## Lifecycle
///
/// 1. Create with [`UpdateEngine::new()`]
/// 2. Run with [`UpdateEngine::run()`], passing a shutdown receiver
/// 3. Send on the shutdown channel to stop; the store is flushed before
///    `run` returns
pub struct UpdateEngine {
    /// Document source
    loader: ConfigLoader,

    /// Public IP discovery
    ip_source: Box<dyn IpSource>,

    /// Per-entry update sequence
    updater: TargetUpdater,

    /// History and cache
    store: Arc<dyn HistoryStore>,

    /// Active document (last successfully loaded)
    document: Option<ConfigDocument>,

    /// Start of the cycle in which each entry was last attempted
    last_attempts: HashMap<String, Instant>,

    /// Tunables
    config: EngineConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl UpdateEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        loader: ConfigLoader,
        ip_source: Box<dyn IpSource>,
        updater: TargetUpdater,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let store = updater.store();

        let engine = Self {
            loader,
            ip_source,
            updater,
            store,
            document: None,
            last_attempts: HashMap::new(),
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Handle for requesting a reload (e.g. from a SIGHUP handler)
    pub fn reload_handle(&self) -> ReloadHandle {
        self.loader.reload_handle()
    }

    /// Currently active document
    pub fn document(&self) -> Option<&ConfigDocument> {
        self.document.as_ref()
    }

    /// Sleep before the next cycle
    ///
    /// The smallest entry interval, never below the configured floor.
    pub fn sleep_duration(&self) -> Duration {
        let min_interval = self.document.as_ref().and_then(ConfigDocument::min_interval);
        self.config.sleep_interval(min_interval)
    }

    /// Run one cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle(None).await
    }

    /// Run the engine until shutdown
    ///
    /// The first cycle starts immediately. Between cycles the engine sleeps
    /// for [`UpdateEngine::sleep_duration`], waking early on a reload request
    /// or shutdown.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The store could not be flushed
    pub async fn run(&mut self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        let mut shutdown = Shutdown::new(shutdown_rx);
        let reload = self.loader.reload_handle();

        self.emit_event(EngineEvent::Started);
        info!("Update engine started ({})", self.loader.path().display());

        loop {
            let report = self.cycle(Some(&mut shutdown)).await;
            debug!("Cycle report: {:?}", report);

            if shutdown.requested() {
                break;
            }

            let sleep = self.sleep_duration();
            debug!("Sleeping {}s", sleep.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}

                _ = reload.notified() => {
                    debug!("Reload requested, starting cycle early");
                }

                _ = shutdown.wait() => {}
            }

            if shutdown.requested() {
                break;
            }
        }

        info!("Shutdown signal received");
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        // Flush state before exiting
        self.store.flush().await?;
        info!("History flushed, engine stopped");

        Ok(())
    }

    async fn cycle(&mut self, mut shutdown: Option<&mut Shutdown>) -> CycleReport {
        if let Err(e) = self.refresh_document().await {
            return CycleReport::aborted(CycleAbort::ConfigRejected(e.to_string()));
        }

        let Some(document) = self.document.clone() else {
            debug!("No configuration loaded, nothing to do");
            return CycleReport::aborted(CycleAbort::NoDocument);
        };

        let ip = match self.ip_source.current(&document.check_ip_url).await {
            Ok(ip) => ip,
            Err(e) => {
                error!("IP check failed, aborting cycle: {}", e);
                self.record_cycle_error(format!("IP check failed: {e}")).await;
                self.emit_event(EngineEvent::CycleAborted {
                    reason: e.to_string(),
                });
                return CycleReport::aborted(CycleAbort::IpCheckFailed(e.to_string()));
            }
        };

        self.emit_event(EngineEvent::CycleStarted { ip });

        let cache = match self.store.cache().await {
            Ok(cache) => cache,
            Err(e) => {
                error!("Failed to read IP cache, treating every entry as uncached: {}", e);
                HashMap::new()
            }
        };

        let started = Instant::now();
        let mut report = CycleReport::default();

        for entry in &document.targets {
            if shutdown.as_deref_mut().is_some_and(Shutdown::requested) {
                info!("Shutdown requested, leaving remaining entries for next start");
                report.interrupted = true;
                break;
            }

            if !self.is_due(&entry.id, entry.interval(), started) {
                debug!("Entry {} not due yet", entry.id);
                continue;
            }

            let cached_ip = cache.get(&entry.id).map(|c| c.last_ip);
            let outcome = self.updater.update_entry(entry, ip, cached_ip).await;
            self.last_attempts.insert(entry.id.clone(), started);

            match outcome {
                EntryOutcome::Skipped => {
                    report.skipped += 1;
                    self.emit_event(EngineEvent::EntrySkipped {
                        entry_id: entry.id.clone(),
                        ip,
                    });
                }
                EntryOutcome::Updated => {
                    report.updated += 1;
                    self.emit_event(EngineEvent::EntryUpdated {
                        entry_id: entry.id.clone(),
                        ip,
                    });
                }
                EntryOutcome::Failed(e) => {
                    report.failed += 1;
                    self.emit_event(EngineEvent::EntryFailed {
                        entry_id: entry.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.emit_event(EngineEvent::CycleFinished {
            updated: report.updated,
            skipped: report.skipped,
            failed: report.failed,
        });

        if let Some(keep) = self.config.history_retention {
            match self.store.trim(keep).await {
                Ok(0) => {}
                Ok(removed) => debug!("Trimmed {} history records", removed),
                Err(e) => error!("Failed to trim history: {}", e),
            }
        }

        report
    }

    /// Load a new document if one is requested or the file changed
    ///
    /// The reload flag is consumed before the file is read, so a request
    /// raised while loading is kept for the next cycle.
    async fn refresh_document(&mut self) -> Result<()> {
        let requested = self.reload_handle().take();
        let first_load = self.document.is_none() && !self.loader.has_attempted();

        if !(requested || first_load || self.loader.changed().await) {
            return Ok(());
        }

        match self.loader.load().await {
            Ok(document) => {
                info!(
                    "Configuration loaded: {} entries, check IP via {}",
                    document.targets.len(),
                    document.check_ip_url
                );
                self.emit_event(EngineEvent::ConfigReloaded {
                    entries: document.targets.len(),
                });
                self.document = Some(document);
                self.last_attempts.clear();
                Ok(())
            }
            Err(e) => {
                error!("Configuration rejected, keeping previous document: {}", e);
                self.record_cycle_error(e.to_string()).await;
                self.emit_event(EngineEvent::ConfigRejected {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn is_due(&self, entry_id: &str, interval: Duration, now: Instant) -> bool {
        self.last_attempts
            .get(entry_id)
            .is_none_or(|last| now.duration_since(*last) >= interval)
    }

    async fn record_cycle_error(&self, summary: String) {
        let record = NewHistoryRecord::cycle_error(None, crate::classify::truncate(&summary));
        if let Err(e) = self.store.append(record).await {
            error!("Failed to record cycle error: {}", e);
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
