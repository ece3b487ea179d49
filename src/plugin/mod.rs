//! Plugin System for the V2V Gateway
//!
//! Backend providers are looked up by string id through a registry instead of
//! being hard-wired into the session code. Adding a vendor means registering
//! a new [`BaseBackend`](crate::core::backend::BaseBackend) implementation.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Plugin Registration                   │
//! │  inventory crate ──▶ DashMap Runtime Registry         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Registering a Built-in Provider
//!
//! ```ignore
//! fn my_metadata() -> ProviderMetadata {
//!     ProviderMetadata::new("my-agent", "My Agent Platform")
//! }
//!
//! fn create_my_backend(config: BackendConfig) -> BackendResult<Box<dyn BaseBackend>> {
//!     Ok(Box::new(MyBackend::new(config)?))
//! }
//!
//! inventory::submit! {
//!     PluginConstructor::backend("my-agent", my_metadata, create_my_backend)
//! }
//! ```

pub mod builtin;
pub mod isolation;
pub mod metadata;
pub mod registry;

pub use isolation::{PluginError, call_plugin_preserving_error};
pub use metadata::ProviderMetadata;
pub use registry::{PluginConstructor, PluginRegistry, global_registry};
