//! Storage backend registry.
//!
//! Maps file extensions to storage factories. A process-wide instance is
//! set up with [`initialize_global`] and torn down with [`shutdown_global`].

use crate::core::error::{StorageError, StorageResult};
use crate::io::png::PngStorage;
use crate::io::raw::RawFileStorage;
use crate::io::storage::RasterStorage;
use indexmap::IndexMap;
use log::debug;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Factory function for creating a storage bound to a path.
pub type StorageFactory = Arc<dyn Fn(&Path) -> StorageResult<Box<dyn RasterStorage>> + Send + Sync>;

/// Registry of storage backends, keyed by lower-case extension.
#[derive(Clone, Default)]
pub struct StorageRegistry {
    factories: IndexMap<String, StorageFactory>,
}

impl StorageRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the raw and PNG backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for extension in ["raw", "bin"] {
            registry.register(extension, |path| {
                Ok(Box::new(RawFileStorage::new(path)) as Box<dyn RasterStorage>)
            });
        }
        registry.register("png", |path| {
            Ok(Box::new(PngStorage::new(path)) as Box<dyn RasterStorage>)
        });
        registry
    }

    /// Register a backend. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, extension: &str, factory: F)
    where
        F: Fn(&Path) -> StorageResult<Box<dyn RasterStorage>> + Send + Sync + 'static,
    {
        self.factories
            .insert(extension.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.factories.contains_key(&extension.to_ascii_lowercase())
    }

    /// Registered extensions, in registration order.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create the storage registered for the extension of `path`.
    pub fn create(&self, path: &Path) -> StorageResult<Box<dyn RasterStorage>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let factory = self
            .factories
            .get(&extension)
            .ok_or_else(|| StorageError::NoBackend {
                extension: extension.clone(),
            })?;
        debug!("Creating {} storage for {}", extension, path.display());
        factory(path)
    }
}

static GLOBAL: RwLock<Option<StorageRegistry>> = parking_lot::const_rwlock(None);

/// Install the process-wide registry. Re-initializing replaces it.
pub fn initialize_global(registry: StorageRegistry) {
    *GLOBAL.write() = Some(registry);
}

/// Drop the process-wide registry.
pub fn shutdown_global() {
    GLOBAL.write().take();
}

pub fn is_initialized() -> bool {
    GLOBAL.read().is_some()
}

/// Create a storage through the process-wide registry.
pub fn create_storage(path: impl AsRef<Path>) -> StorageResult<Box<dyn RasterStorage>> {
    GLOBAL
        .read()
        .as_ref()
        .ok_or(StorageError::RegistryNotInitialized)?
        .create(path.as_ref())
}
