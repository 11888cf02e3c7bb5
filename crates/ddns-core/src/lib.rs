// # ddns-core
//
// Core library for the DDNS update agent and its configuration exchange.
//
// ## Architecture Overview
//
// This library provides everything between the published configuration
// document and the history feed:
// - **ConfigDocument**: The versionless document handed from publisher to agent
// - **AgentKey**: Opens the tokens sealed into the document
// - **ConfigLoader**: Loads the document, detects changes, accepts reload requests
// - **UpdateEngine**: Scheduler loop deciding which entries are due
// - **TargetUpdater**: Skip / decrypt / call / classify for a single entry
// - **HistoryStore**: Durable history and last-IP cache (SQLite or memory)
// - **ClassifierRegistry**: Named vendor response classifiers
//
// ## Design Principles
//
// 1. **Fail Closed**: A document is validated as a whole before anything in it is used
// 2. **Entry Isolation**: One entry's failure never affects another
// 3. **Auditable**: Every attempt leaves exactly one history record
// 4. **Library-First**: Network clients and binaries live in their own crates

pub mod classify;
pub mod config;
pub mod crypto;
pub mod document;
pub mod engine;
pub mod error;
pub mod loader;
pub mod registry;
pub mod state;
pub mod template;
pub mod traits;
pub mod updater;
pub mod url_policy;

// Re-export core types for convenience
pub use classify::ResponseClassifier;
pub use config::{EngineConfig, StoreConfig};
pub use crypto::{AgentKey, SealedToken, SymmetricKey};
pub use document::{ConfigDocument, DocumentEntry};
pub use engine::{CycleAbort, CycleReport, EngineEvent, UpdateEngine};
pub use error::{Error, Result};
pub use loader::{ConfigLoader, ReloadHandle};
pub use registry::ClassifierRegistry;
pub use state::{MemoryHistoryStore, SqliteHistoryStore};
pub use template::{RenderedUrl, UrlTemplate};
pub use traits::{HistoryStore, IpSource, UpdateEndpoint};
pub use updater::{EntryOutcome, TargetUpdater};
pub use url_policy::UrlPolicy;
