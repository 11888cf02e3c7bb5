// # Memory History Store
//
// In-memory implementation of HistoryStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for deployments where the dashboard is not used.
//
// ## Crash Behavior
//
// - History and cache are lost on restart/crash
// - First cycle after a restart treats every entry as uncached (one vendor
//   call per entry, which is harmless for dynamic DNS endpoints)

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::history_store::{
    CacheEntry, HistoryQuery, HistoryRecord, HistoryStore, NewHistoryRecord, UpdateStatus,
};

/// In-memory history store implementation
///
/// History and cache live behind a single RwLock, so a success record and
/// its cache row are always observed together.
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::MemoryHistoryStore;
/// use ddns_core::traits::{HistoryQuery, HistoryStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryHistoryStore::new();
///
///     store.record_success("1:www", "1.2.3.4".parse()?, "updated").await?;
///
///     let cache = store.cache().await?;
///     assert_eq!(cache["1:www"].last_ip, "1.2.3.4".parse::<std::net::IpAddr>()?);
///     assert_eq!(store.history(HistoryQuery::recent(10)).await?.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    history: Vec<HistoryRecord>,
    cache: HashMap<String, CacheEntry>,
    next_id: i64,
}

impl MemoryState {
    fn push(&mut self, record: NewHistoryRecord) {
        self.next_id += 1;
        self.history.push(HistoryRecord {
            id: self.next_id,
            entry_id: record.entry_id,
            status: record.status,
            ip_address: record.ip_address,
            response_summary: record.response_summary,
            created_at: chrono::Utc::now(),
        });
    }
}

impl MemoryHistoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of history records
    pub async fn len(&self) -> usize {
        self.inner.read().await.history.len()
    }

    /// Check if no history has been recorded
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.history.is_empty()
    }

    /// All history records in insertion order
    pub async fn records(&self) -> Vec<HistoryRecord> {
        self.inner.read().await.history.clone()
    }

    /// Seed the cache for an entry without writing history
    pub async fn seed_cache(&self, entry_id: &str, ip: IpAddr) {
        let mut guard = self.inner.write().await;
        guard.cache.insert(
            entry_id.to_string(),
            CacheEntry {
                last_ip: ip,
                last_success_at: chrono::Utc::now(),
            },
        );
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<(), Error> {
        self.inner.write().await.push(record);
        Ok(())
    }

    async fn record_success(
        &self,
        entry_id: &str,
        ip: IpAddr,
        response_summary: &str,
    ) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.push(NewHistoryRecord::for_entry(
            entry_id,
            UpdateStatus::Success,
            Some(ip),
            response_summary,
        ));
        guard.cache.insert(
            entry_id.to_string(),
            CacheEntry {
                last_ip: ip,
                last_success_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    async fn history(&self, query: HistoryQuery) -> Result<Vec<HistoryRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .history
            .iter()
            .rev()
            .filter(|r| query.entry_id.is_none() || r.entry_id == query.entry_id)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn cache(&self) -> Result<HashMap<String, CacheEntry>, Error> {
        Ok(self.inner.read().await.cache.clone())
    }

    async fn trim(&self, keep: usize) -> Result<usize, Error> {
        let mut guard = self.inner.write().await;
        let excess = guard.history.len().saturating_sub(keep);
        guard.history.drain(..excess);
        Ok(excess)
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryHistoryStore::new();
        assert!(store.is_empty().await);

        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        store.record_success("1:www", ip, "good").await.unwrap();

        assert_eq!(store.len().await, 1);
        let cache = store.cache().await.unwrap();
        assert_eq!(cache.get("1:www").map(|c| c.last_ip), Some(ip));

        let records = store.records().await;
        assert_eq!(records[0].status, UpdateStatus::Success);
        assert_eq!(records[0].ip_address, Some(ip));
    }

    #[tokio::test]
    async fn test_memory_store_history_newest_first_and_filtered() {
        let store = MemoryHistoryStore::new();
        let ip: IpAddr = "1.2.3.4".parse().unwrap();

        store
            .append(NewHistoryRecord::for_entry("1:a", UpdateStatus::Skipped, Some(ip), "a1"))
            .await
            .unwrap();
        store
            .append(NewHistoryRecord::cycle_error(None, "cycle"))
            .await
            .unwrap();
        store
            .append(NewHistoryRecord::for_entry("1:a", UpdateStatus::Error, Some(ip), "a2"))
            .await
            .unwrap();

        let recent = store.history(HistoryQuery::recent(2)).await.unwrap();
        let summaries: Vec<_> = recent.iter().map(|r| r.response_summary.as_str()).collect();
        assert_eq!(summaries, vec!["a2", "cycle"]);

        let only_a = store
            .history(HistoryQuery::recent(10).for_entry("1:a"))
            .await
            .unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a[0].id > only_a[1].id);
    }

    #[tokio::test]
    async fn test_memory_store_cache_last_write_wins() {
        let store = MemoryHistoryStore::new();
        store
            .record_success("1:www", "1.1.1.1".parse().unwrap(), "ok")
            .await
            .unwrap();
        store
            .record_success("1:www", "2.2.2.2".parse().unwrap(), "ok")
            .await
            .unwrap();

        let cache = store.cache().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache["1:www"].last_ip, "2.2.2.2".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_trim() {
        let store = MemoryHistoryStore::new();
        for i in 0..5 {
            store
                .append(NewHistoryRecord::cycle_error(None, format!("e{i}")))
                .await
                .unwrap();
        }

        assert_eq!(store.trim(2).await.unwrap(), 3);
        let left = store.history(HistoryQuery::recent(10)).await.unwrap();
        let summaries: Vec<_> = left.iter().map(|r| r.response_summary.as_str()).collect();
        assert_eq!(summaries, vec!["e4", "e3"]);
        assert_eq!(store.trim(10).await.unwrap(), 0);
    }
}
