//! Plugin-based backend registry
//!
//! The registry allows zone backends to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rrdns_core::registry::BackendRegistry;
//! use rrdns_core::config::BackendConfig;
//!
//! // Built-in memory and file backends are pre-registered
//! let registry = BackendRegistry::with_builtin();
//!
//! // Register additional backends
//! rrdns_provider_cloudflare::register(&registry);
//!
//! // Create backend from config
//! let config = BackendConfig::File { path: "zones.json".into() };
//! let backend = registry.create_backend(&config)?;
//! ```
//!
//! ## Registration
//!
//! Backend crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &BackendRegistry) {
//!     registry.register_backend("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::backend::{FileZoneBackendFactory, MemoryZoneBackendFactory};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::traits::{ZoneBackend, ZoneBackendFactory};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type FactoryMap = HashMap<String, Box<dyn ZoneBackendFactory>>;

/// Backend registry for plugin-based zone backend creation
///
/// The registry maintains a map of backend type names to factory objects,
/// allowing dynamic instantiation of backends based on configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<FactoryMap>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` backends registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_backend("memory", Box::new(MemoryZoneBackendFactory));
        registry.register_backend("file", Box::new(FileZoneBackendFactory));
        registry
    }

    // Poisoning is ignored: every write is a single insert.
    fn read(&self) -> RwLockReadGuard<'_, FactoryMap> {
        self.backends.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, FactoryMap> {
        self.backends.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a zone backend factory
    ///
    /// # Parameters
    ///
    /// - `name`: Backend type name (e.g., "cloudflare", "file")
    /// - `factory`: Factory object for creating backend instances
    pub fn register_backend(&self, name: impl Into<String>, factory: Box<dyn ZoneBackendFactory>) {
        self.write().insert(name.into(), factory);
    }

    /// Create a zone backend from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ZoneBackend>)`: Created backend instance
    /// - `Err(Error)`: If the configuration is invalid, the backend type is
    ///   not registered, or creation fails
    pub fn create_backend(&self, config: &BackendConfig) -> Result<Box<dyn ZoneBackend>> {
        config.validate()?;

        let backend_type = config.type_name();
        let backends = self.read();

        let factory = backends.get(backend_type).ok_or_else(|| {
            Error::config(format!("Unknown backend type: {}", backend_type))
        })?;

        factory.create(config)
    }

    /// List all registered backend types, sorted
    pub fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend type is registered
    pub fn has_backend(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }
}
