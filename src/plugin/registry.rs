//! Plugin Registry
//!
//! This module provides the central registry for backend providers. Built-in
//! providers are registered at compile-time using the `inventory` crate;
//! additional providers can be registered at runtime.
//!
//! # Architecture
//!
//! The registry uses DashMap for concurrent lookup. Primary ids and aliases
//! share one map, lowercased, so lookups are case-insensitive.
//!
//! # Usage
//!
//! ```ignore
//! use v2v_gateway::plugin::global_registry;
//!
//! let backend = global_registry().create_backend("elevenlabs", config)?;
//! ```

use dashmap::{DashMap, DashSet};
use std::sync::{Arc, OnceLock};

use super::isolation::{call_plugin_preserving_error, call_plugin_safely_value};
use super::metadata::ProviderMetadata;
use crate::core::backend::{BackendConfig, BackendError, BackendResult, BaseBackend};

/// Factory function type for backend providers
pub type BackendFactoryFn =
    Arc<dyn Fn(BackendConfig) -> BackendResult<Box<dyn BaseBackend>> + Send + Sync>;

/// Function that produces provider metadata on demand
pub type MetadataFn = fn() -> ProviderMetadata;

/// Factory function pointer type for backend providers (non-Arc version for PluginConstructor)
pub type BackendFactoryPtr = fn(BackendConfig) -> BackendResult<Box<dyn BaseBackend>>;

/// Plugin constructor for inventory-based registration
///
/// Metadata is produced by a function pointer so nothing is allocated
/// until runtime, making it compatible with `inventory::submit!`.
pub struct PluginConstructor {
    /// Backend factory
    pub create_backend: BackendFactoryPtr,

    /// Metadata producer
    pub metadata_fn: MetadataFn,

    /// Primary provider id
    pub provider_id: &'static str,

    /// Alternative ids
    pub aliases: &'static [&'static str],
}

impl PluginConstructor {
    /// Create a new backend plugin constructor
    pub const fn backend(
        provider_id: &'static str,
        metadata_fn: MetadataFn,
        factory: BackendFactoryPtr,
    ) -> Self {
        Self {
            create_backend: factory,
            metadata_fn,
            provider_id,
            aliases: &[],
        }
    }

    /// Add aliases for this provider
    pub const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    /// Get the provider metadata
    pub fn metadata(&self) -> ProviderMetadata {
        (self.metadata_fn)()
    }
}

// Collect all registered plugins at link time
inventory::collect!(PluginConstructor);

/// Central plugin registry
pub struct PluginRegistry {
    /// Backend factories indexed by provider id and alias
    backend_factories: DashMap<String, (BackendFactoryFn, ProviderMetadata)>,

    /// Primary provider ids (aliases excluded)
    primary_ids: DashSet<String>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            backend_factories: DashMap::new(),
            primary_ids: DashSet::new(),
        }
    }

    /// Register a backend provider factory under its id and every alias in `metadata`
    pub fn register_backend(
        &self,
        provider_id: &str,
        factory: BackendFactoryFn,
        metadata: ProviderMetadata,
    ) {
        let id = provider_id.to_lowercase();

        self.backend_factories
            .insert(id.clone(), (factory.clone(), metadata.clone()));

        for alias in &metadata.aliases {
            self.backend_factories
                .insert(alias.to_lowercase(), (factory.clone(), metadata.clone()));
        }

        self.primary_ids.insert(id);

        tracing::debug!(
            provider_id = %provider_id,
            aliases = ?metadata.aliases,
            "Registered backend provider"
        );
    }

    /// Create a backend by provider id or alias
    pub fn create_backend(
        &self,
        provider: &str,
        config: BackendConfig,
    ) -> BackendResult<Box<dyn BaseBackend>> {
        let id = provider.to_lowercase();

        let factory_entry = self.backend_factories.get(&id).ok_or_else(|| {
            BackendError::InvalidConfiguration(format!(
                "Unknown backend provider: '{}'. Available providers: {:?}",
                provider,
                self.get_backend_provider_names()
            ))
        })?;

        let factory = factory_entry.0.clone();
        drop(factory_entry);

        call_plugin_preserving_error(
            std::panic::AssertUnwindSafe(|| factory(config)),
            |panic_msg| BackendError::ProviderError(format!("Plugin panicked: {}", panic_msg)),
        )
    }

    /// Get all registered backend provider names (excluding aliases), sorted
    pub fn get_backend_provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.primary_ids.iter().map(|id| id.clone()).collect();
        names.sort();
        names
    }

    /// Get metadata for a backend provider
    pub fn get_backend_metadata(&self, provider: &str) -> Option<ProviderMetadata> {
        self.backend_factories
            .get(&provider.to_lowercase())
            .map(|entry| entry.1.clone())
    }

    /// Check if a backend provider (or alias) is registered
    pub fn has_backend_provider(&self, provider: &str) -> bool {
        self.backend_factories
            .contains_key(&provider.to_lowercase())
    }

    /// Get the number of registered backend providers
    pub fn backend_provider_count(&self) -> usize {
        self.primary_ids.len()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global registry instance
static GLOBAL_REGISTRY: OnceLock<PluginRegistry> = OnceLock::new();

/// Get the global plugin registry
///
/// The registry is lazily initialized on first access and populated
/// with all plugins registered via `inventory::submit!`.
pub fn global_registry() -> &'static PluginRegistry {
    GLOBAL_REGISTRY.get_or_init(|| {
        let registry = PluginRegistry::new();

        for constructor in inventory::iter::<PluginConstructor> {
            let metadata = match call_plugin_safely_value(constructor.metadata_fn) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::error!(
                        provider_id = %constructor.provider_id,
                        error = %e,
                        "Skipping plugin with broken metadata"
                    );
                    continue;
                }
            };

            let mut aliases = metadata.aliases.clone();
            for alias in constructor.aliases {
                if !aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
                    aliases.push(alias.to_string());
                }
            }
            let metadata = ProviderMetadata { aliases, ..metadata };

            let factory_arc: BackendFactoryFn = Arc::new(constructor.create_backend);
            registry.register_backend(constructor.provider_id, factory_arc, metadata);
        }

        tracing::info!(
            backend_count = registry.backend_provider_count(),
            providers = ?registry.get_backend_provider_names(),
            "Plugin registry initialized"
        );

        registry
    })
}
