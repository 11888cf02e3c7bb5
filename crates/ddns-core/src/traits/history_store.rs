// # History Store Trait
//
// Defines the interface for the durable update history and the last-IP cache.
//
// ## Purpose
//
// - History is the audit trail: append-only, read by the external dashboard.
// - The cache holds one row per entry with the last IP a vendor accepted; the
//   engine reads it once at the start of each cycle to decide skips.
//
// ## Implementations
//
// - SQLite: `SqliteHistoryStore` (durable, shared with the dashboard)
// - In-memory: `MemoryHistoryStore` (tests, ephemeral deployments)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Outcome recorded for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Success,
    Error,
    Skipped,
}

impl UpdateStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UpdateStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            other => Err(Error::store(format!("unknown status {other:?}"))),
        }
    }
}

/// A history record about to be appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryRecord {
    /// Entry the attempt belongs to; `None` for whole-cycle events
    pub entry_id: Option<String>,
    pub status: UpdateStatus,
    pub ip_address: Option<IpAddr>,
    pub response_summary: String,
}

impl NewHistoryRecord {
    /// Record for a single entry
    pub fn for_entry(
        entry_id: impl Into<String>,
        status: UpdateStatus,
        ip_address: Option<IpAddr>,
        response_summary: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Some(entry_id.into()),
            status,
            ip_address,
            response_summary: response_summary.into(),
        }
    }

    /// Whole-cycle error with no entry reference
    pub fn cycle_error(ip_address: Option<IpAddr>, response_summary: impl Into<String>) -> Self {
        Self {
            entry_id: None,
            status: UpdateStatus::Error,
            ip_address,
            response_summary: response_summary.into(),
        }
    }
}

/// A stored history record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Monotonic record id (insertion order)
    pub id: i64,
    pub entry_id: Option<String>,
    pub status: UpdateStatus,
    pub ip_address: Option<IpAddr>,
    pub response_summary: String,
    pub created_at: DateTime<Utc>,
}

/// Last-IP cache row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub last_ip: IpAddr,
    pub last_success_at: DateTime<Utc>,
}

/// History query for the dashboard feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum number of records, newest first
    pub limit: usize,
    /// Only records for this entry
    pub entry_id: Option<String>,
}

impl HistoryQuery {
    /// Newest `limit` records across all entries
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            entry_id: None,
        }
    }

    /// Restrict to one entry
    pub fn for_entry(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }
}

/// Trait for history & cache store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Implementation Guidelines
///
/// - **Durable before return**: a write that returned `Ok` survives a crash
/// - **Atomic success**: [`HistoryStore::record_success`] writes the history
///   record and the cache row together or not at all
/// - **Append-only history**: no update or delete of individual records;
///   [`HistoryStore::trim`] is the only removal path
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one history record
    async fn append(&self, record: NewHistoryRecord) -> Result<()>;

    /// Append a `success` record and upsert the entry's cache row atomically
    async fn record_success(
        &self,
        entry_id: &str,
        ip: IpAddr,
        response_summary: &str,
    ) -> Result<()>;

    /// Read history, newest first
    async fn history(&self, query: HistoryQuery) -> Result<Vec<HistoryRecord>>;

    /// Read the whole last-IP cache
    async fn cache(&self) -> Result<HashMap<String, CacheEntry>>;

    /// Keep only the newest `keep` history records, returning how many were removed
    async fn trim(&self, keep: usize) -> Result<usize>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<()>;
}
