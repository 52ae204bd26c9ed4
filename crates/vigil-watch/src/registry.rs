//! Backend registry and monitor factory.
//!
//! The registry decouples monitor construction from concrete backend
//! implementations: each backend is registered once under a unique name
//! (paired with a [`MonitorType`] tag) together with a constructor closure,
//! and callers ask the factory for a monitor by name or tag without naming a
//! backend type anywhere in their code.
//!
//! A process-wide instance holds the built-in backends. It is initialized
//! explicitly and deterministically inside its lazy constructor rather than
//! by load-time side effects, and is read-mostly afterwards: runtime
//! registration of additional backends goes through a write lock.

use crate::backends;
use crate::error::{Error, Result};
use crate::monitor::{Backend, EventCallback, Monitor};
use crate::MonitorType;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Constructor closure producing a fresh backend instance.
pub type BackendConstructor = Box<dyn Fn() -> Box<dyn Backend> + Send + Sync>;

struct RegistryEntry {
    type_tag: MonitorType,
    constructor: BackendConstructor,
}

/// A name- and type-keyed table of backend constructors.
///
/// Most callers use the process-wide instance through the free functions of
/// this module; an owned registry is useful for tests and embedders that
/// want full control over the available backends.
#[derive(Default)]
pub struct BackendRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (name, type_tag, constructor) in backends::builtin_backends() {
            // Built-in names are unique by construction.
            registry.entries.insert(
                name.to_string(),
                RegistryEntry {
                    type_tag,
                    constructor,
                },
            );
        }
        registry
    }

    /// Register a backend constructor under a unique name.
    ///
    /// Registering a name twice is a logic error surfaced as
    /// [`Error::DuplicateBackend`]; the existing registration is kept.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        type_tag: MonitorType,
        constructor: BackendConstructor,
    ) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::DuplicateBackend(name));
        }
        debug!(name = %name, "registered monitor backend");
        self.entries.insert(
            name,
            RegistryEntry {
                type_tag,
                constructor,
            },
        );
        Ok(())
    }

    /// Whether a backend is registered under the given name.
    pub fn exists_type(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of all registered backends, sorted.
    pub fn get_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a backend by name.
    pub fn create_backend(&self, name: &str) -> Result<Box<dyn Backend>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::UnknownMonitorType(name.to_string()))?;
        Ok((entry.constructor)())
    }

    /// Construct a backend by type tag.
    ///
    /// Returns the first registered backend carrying the tag; built-in tags
    /// are unique, and externally registered backends are expected to be
    /// addressed by name.
    pub fn create_backend_of_type(&self, type_tag: MonitorType) -> Result<Box<dyn Backend>> {
        let entry = self
            .entries
            .values()
            .find(|entry| entry.type_tag == type_tag)
            .ok_or_else(|| Error::UnknownMonitorType(type_tag.name().to_string()))?;
        Ok((entry.constructor)())
    }
}

lazy_static! {
    static ref REGISTRY: RwLock<BackendRegistry> = RwLock::new(BackendRegistry::with_defaults());
}

/// Register a backend constructor in the process-wide registry.
///
/// See [`BackendRegistry::register`] for the duplicate-name contract.
pub fn register_creator(
    name: impl Into<String>,
    type_tag: MonitorType,
    constructor: BackendConstructor,
) -> Result<()> {
    REGISTRY.write().register(name, type_tag, constructor)
}

/// Whether a backend is registered under the given name.
pub fn exists_type(name: &str) -> bool {
    REGISTRY.read().exists_type(name)
}

/// Names of all registered backends, sorted.
pub fn get_types() -> Vec<String> {
    REGISTRY.read().get_types()
}

/// Construct a monitor whose backend is looked up by name.
///
/// Fails with [`Error::UnknownMonitorType`] if no backend is registered
/// under `name`; the factory never falls back to a default backend.
pub fn create_monitor<C>(
    name: &str,
    paths: Vec<PathBuf>,
    callback: EventCallback<C>,
    context: C,
) -> Result<Monitor<C>> {
    let backend = REGISTRY.read().create_backend(name)?;
    Monitor::new(backend, paths, callback, context)
}

/// Construct a monitor whose backend is looked up by type tag.
pub fn create_monitor_of_type<C>(
    type_tag: MonitorType,
    paths: Vec<PathBuf>,
    callback: EventCallback<C>,
    context: C,
) -> Result<Monitor<C>> {
    let backend = REGISTRY.read().create_backend_of_type(type_tag)?;
    Monitor::new(backend, paths, callback, context)
}
