//! Plugin-based classifier registry
//!
//! The registry maps classifier names to implementations, so the vendor
//! success rule is picked from configuration instead of a hardcoded
//! if-else chain.
//!
//! ## Usage
//!
//! ```rust
//! use ddns_core::registry::ClassifierRegistry;
//!
//! let registry = ClassifierRegistry::with_builtin();
//! let classifier = registry.get("namecheap").unwrap();
//! assert_eq!(classifier.name(), "namecheap");
//! ```
//!
//! ## Registration
//!
//! Vendor-specific crates can add their own rules during initialization:
//!
//! ```rust,ignore
//! pub fn register(registry: &ClassifierRegistry) {
//!     registry.register("myvendor", Arc::new(MyVendorClassifier));
//! }
//! ```

use crate::classify::{
    Dyndns2Classifier, HttpStatusClassifier, NamecheapClassifier, ResponseClassifier,
};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Name of the classifier used when none is configured
pub const DEFAULT_CLASSIFIER: &str = "http-status";

/// Registry of named response classifiers
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ClassifierRegistry {
    classifiers: RwLock<HashMap<String, Arc<dyn ResponseClassifier>>>,
}

impl ClassifierRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in classifiers
    ///
    /// `http-status`, `namecheap` and `dyndns2`.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(HttpStatusClassifier.name(), Arc::new(HttpStatusClassifier));
        registry.register(NamecheapClassifier.name(), Arc::new(NamecheapClassifier));
        registry.register(Dyndns2Classifier.name(), Arc::new(Dyndns2Classifier));
        registry
    }

    /// Register a classifier, replacing any previous one with the same name
    pub fn register(&self, name: impl Into<String>, classifier: Arc<dyn ResponseClassifier>) {
        let mut classifiers = self
            .classifiers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        classifiers.insert(name.into(), classifier);
    }

    /// Look up a classifier by name
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn ResponseClassifier>)`: The registered classifier
    /// - `Err(Error::ConfigInvalid)`: If no classifier has that name
    pub fn get(&self, name: &str) -> Result<Arc<dyn ResponseClassifier>> {
        let classifiers = self
            .classifiers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        classifiers.get(name).cloned().ok_or_else(|| {
            let mut known: Vec<_> = classifiers.keys().cloned().collect();
            known.sort();
            Error::config_invalid(format!(
                "Unknown response classifier: {} (known: {})",
                name,
                known.join(", ")
            ))
        })
    }

    /// List all registered classifier names, sorted
    pub fn list(&self) -> Vec<String> {
        let classifiers = self
            .classifiers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = classifiers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a classifier name is registered
    pub fn has(&self, name: &str) -> bool {
        let classifiers = self
            .classifiers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        classifiers.contains_key(name)
    }
}
