//! Core traits for the DDNS agent
//!
//! - [`IpSource`]: Discover the current public IP
//! - [`UpdateEndpoint`]: Call a vendor update URL
//! - [`HistoryStore`]: Durable history and last-IP cache

pub mod history_store;
pub mod ip_source;
pub mod update_endpoint;

pub use history_store::{
    CacheEntry, HistoryQuery, HistoryRecord, HistoryStore, NewHistoryRecord, UpdateStatus,
};
pub use ip_source::IpSource;
pub use update_endpoint::{EndpointResponse, UpdateEndpoint};
