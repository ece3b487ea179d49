pub mod config;
pub mod core;
pub mod handlers;
pub mod plugin;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use plugin::global_registry;
pub use state::AppState;
