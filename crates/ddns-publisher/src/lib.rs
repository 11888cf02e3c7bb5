// # ddns-publisher
//
// Administrative side of the configuration exchange.
//
// ## Architecture Overview
//
// - **OperatorKey**: Protects secrets at rest on the administrative side
// - **Reencryptor**: Opens an operator-sealed secret and reseals it for the agent
// - **DocumentBuilder**: Expands targets into document entries and validates the result
// - **Publisher**: Atomic write of the document plus an optional service reload
//
// The agent never links this crate, so the operator key cannot reach it.

pub mod builder;
pub mod error;
pub mod models;
pub mod reencrypt;

pub use builder::{
    DEFAULT_CHECK_IP_URL, DEFAULT_CONFIG_PATH, DEFAULT_UPDATE_URL_TEMPLATE, DocumentBuilder,
    PublishReport, Publisher, ServiceReload,
};
pub use error::{PublishError, Result};
pub use models::{AdminState, StoredSecret, Target};
pub use reencrypt::{OperatorKey, Reencryptor};
