//! Test doubles and common utilities for engine contract tests
//!
//! This module provides minimal test doubles for the engine's seams (IP
//! source, vendor endpoint, store) plus a fixture that writes sealed
//! configuration documents to a temporary directory.

#![allow(dead_code)]

use ddns_core::classify::HttpStatusClassifier;
use ddns_core::error::{Error, Result};
use ddns_core::state::MemoryHistoryStore;
use ddns_core::traits::{
    CacheEntry, EndpointResponse, HistoryQuery, HistoryRecord, HistoryStore, IpSource,
    NewHistoryRecord, UpdateEndpoint,
};
use ddns_core::{
    AgentKey, ConfigDocument, ConfigLoader, DocumentEntry, EngineConfig, EngineEvent,
    RenderedUrl, TargetUpdater, UpdateEngine, UrlPolicy,
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const CHECK_IP_URL: &str = "https://api.ipify.org";
pub const TEMPLATE: &str =
    "https://dynamicdns.park-your-domain.com/update?host={hostname}&domain={domain}&password={token}&ip={ip}";

/// An IpSource whose answer is controlled by the test
#[derive(Clone)]
pub struct ControlledIpSource {
    /// Answer for current(); Err holds the failure message
    answer: Arc<Mutex<std::result::Result<IpAddr, String>>>,
    /// Call counter for current()
    call_count: Arc<AtomicUsize>,
    /// URLs passed to current()
    urls: Arc<Mutex<Vec<String>>>,
}

impl ControlledIpSource {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            answer: Arc::new(Mutex::new(Ok(ip))),
            call_count: Arc::new(AtomicUsize::new(0)),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer with a new IP from now on
    pub fn set_ip(&self, ip: IpAddr) {
        *self.answer.lock().unwrap() = Ok(ip);
    }

    /// Fail every call from now on
    pub fn set_failure(&self, msg: &str) {
        *self.answer.lock().unwrap() = Err(msg.to_string());
    }

    /// Get the number of times current() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// URLs the engine asked for
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IpSource for ControlledIpSource {
    async fn current(&self, check_ip_url: &str) -> Result<IpAddr> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(check_ip_url.to_string());
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map_err(Error::network)
    }
}

type CallHook = Box<dyn Fn(&str) + Send + Sync>;

/// A vendor endpoint that records calls and answers as configured
#[derive(Clone)]
pub struct RecordingEndpoint {
    /// Redacted URLs, in call order
    calls: Arc<Mutex<Vec<String>>>,
    /// Reply for every call
    reply: Arc<Mutex<std::result::Result<EndpointResponse, String>>>,
    /// Calls whose redacted URL contains one of these get a 500
    rejected: Arc<Mutex<Vec<String>>>,
    /// Run on every call, with the redacted URL
    hook: Arc<Mutex<Option<CallHook>>>,
}

impl RecordingEndpoint {
    /// Endpoint answering 200 with a Namecheap-style success body
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(Mutex::new(Ok(EndpointResponse::new(
                200,
                "<interface-response><ErrCount>0</ErrCount></interface-response>",
            )))),
            rejected: Arc::new(Mutex::new(Vec::new())),
            hook: Arc::new(Mutex::new(None)),
        }
    }

    /// Answer every call with this status and body
    pub fn reply_with(&self, status: u16, body: &str) {
        *self.reply.lock().unwrap() = Ok(EndpointResponse::new(status, body));
    }

    /// Fail every call at the transport level
    pub fn fail_transport(&self, msg: &str) {
        *self.reply.lock().unwrap() = Err(msg.to_string());
    }

    /// Answer 500 to calls whose URL contains `pattern`
    pub fn reject_when_contains(&self, pattern: &str) {
        self.rejected.lock().unwrap().push(pattern.to_string());
    }

    /// Run `hook` during every call
    pub fn on_call(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Number of calls made
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Redacted URLs of all calls
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls for one hostname
    pub fn calls_for(&self, hostname: &str) -> usize {
        let needle = format!("host={hostname}&");
        self.calls().iter().filter(|url| url.contains(&needle)).count()
    }
}

#[async_trait::async_trait]
impl UpdateEndpoint for RecordingEndpoint {
    async fn call(&self, url: &RenderedUrl) -> Result<EndpointResponse> {
        let redacted = url.redacted().to_string();
        self.calls.lock().unwrap().push(redacted.clone());

        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(&redacted);
        }

        if self
            .rejected
            .lock()
            .unwrap()
            .iter()
            .any(|p| redacted.contains(p.as_str()))
        {
            return Ok(EndpointResponse::new(500, "rejected"));
        }

        self.reply.lock().unwrap().clone().map_err(Error::network)
    }

    fn endpoint_name(&self) -> &'static str {
        "recording"
    }
}

/// A memory store that counts flushes and can refuse writes
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryHistoryStore,
    fail_writes: Arc<AtomicBool>,
    flush_count: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail from now on
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Get the number of times flush() was called
    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }

    /// The wrapped store
    pub fn memory(&self) -> &MemoryHistoryStore {
        &self.inner
    }

    fn check(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::store("disk full"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl HistoryStore for FlakyStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<()> {
        self.check()?;
        self.inner.append(record).await
    }

    async fn record_success(&self, entry_id: &str, ip: IpAddr, summary: &str) -> Result<()> {
        self.check()?;
        self.inner.record_success(entry_id, ip, summary).await
    }

    async fn history(&self, query: HistoryQuery) -> Result<Vec<HistoryRecord>> {
        self.inner.history(query).await
    }

    async fn cache(&self) -> Result<HashMap<String, CacheEntry>> {
        self.inner.cache().await
    }

    async fn trim(&self, keep: usize) -> Result<usize> {
        self.check()?;
        self.inner.trim(keep).await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A configuration document on disk plus the agent key that opens it
pub struct Fixture {
    pub dir: TempDir,
    pub path: PathBuf,
    pub key: AgentKey,
    /// Bumped on every write so each write has a distinct mtime
    generation: AtomicU64,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.enc.json");
        Self {
            dir,
            path,
            key: AgentKey::generate(),
            generation: AtomicU64::new(0),
        }
    }

    /// Entry whose token is sealed under the fixture key
    pub fn entry(&self, target_id: u32, hostname: &str, interval_seconds: u64) -> DocumentEntry {
        let token = SecretString::new(format!("token-{target_id}-{hostname}"));
        DocumentEntry {
            id: DocumentEntry::entry_id(target_id, hostname),
            hostname: hostname.to_string(),
            domain: "example.com".to_string(),
            update_url_template: TEMPLATE.to_string(),
            encrypted_token: self.key.seal(&token).unwrap(),
            interval_seconds,
        }
    }

    /// Document with the given entries
    pub fn document(&self, targets: Vec<DocumentEntry>) -> ConfigDocument {
        ConfigDocument {
            check_ip_url: CHECK_IP_URL.to_string(),
            targets,
        }
    }

    /// Write a document with the given entries
    pub fn write(&self, targets: Vec<DocumentEntry>) {
        self.write_raw(&self.document(targets).to_json().unwrap());
    }

    /// Write arbitrary contents, with a fresh mtime
    pub fn write_raw(&self, contents: &str) {
        std::fs::write(&self.path, contents).unwrap();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + generation);
        std::fs::File::options()
            .write(true)
            .open(&self.path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    /// Replace the contents but put the previous mtime back
    ///
    /// Models an edit that mtime-based change detection cannot see.
    pub fn write_preserving_mtime(&self, targets: Vec<DocumentEntry>) {
        let previous = std::fs::metadata(&self.path).unwrap().modified().unwrap();
        std::fs::write(&self.path, self.document(targets).to_json().unwrap()).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&self.path)
            .unwrap()
            .set_modified(previous)
            .unwrap();
    }

    pub fn loader(&self) -> ConfigLoader {
        ConfigLoader::new(&self.path, UrlPolicy::new())
    }

    /// Engine over the fixture document with default tunables
    pub fn engine(
        &self,
        ip_source: &ControlledIpSource,
        endpoint: &RecordingEndpoint,
        store: Arc<dyn HistoryStore>,
    ) -> (UpdateEngine, mpsc::Receiver<EngineEvent>) {
        self.engine_with_config(ip_source, endpoint, store, EngineConfig::default())
    }

    pub fn engine_with_config(
        &self,
        ip_source: &ControlledIpSource,
        endpoint: &RecordingEndpoint,
        store: Arc<dyn HistoryStore>,
        config: EngineConfig,
    ) -> (UpdateEngine, mpsc::Receiver<EngineEvent>) {
        let updater = TargetUpdater::new(
            Arc::new(endpoint.clone()),
            Arc::new(HttpStatusClassifier),
            store,
            self.key.clone(),
        );
        UpdateEngine::new(self.loader(), Box::new(ip_source.clone()), updater, config)
            .expect("engine construction succeeds")
    }
}

pub fn ip(raw: &str) -> IpAddr {
    raw.parse().unwrap()
}

/// Drain every event currently queued
pub fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
