//! Plugin Isolation and Panic Safety
//!
//! Provider factories run under `catch_unwind` so a panicking provider turns
//! into an error for one session instead of taking down the gateway.
//!
//! `catch_unwind` only catches panics, not aborts: builds with
//! `panic = "abort"` lose this protection.

use std::any::Any;
use std::panic::{UnwindSafe, catch_unwind};

/// Plugin-specific error type
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin panicked during execution
    #[error("Plugin panicked: {0}")]
    Panic(String),
}

/// Safely call a plugin function, preserving the original error type
///
/// Panics are caught and converted to the caller's error type with
/// `panic_to_error`; ordinary errors pass through unchanged.
pub fn call_plugin_preserving_error<F, T, E, PC>(plugin_fn: F, panic_to_error: PC) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + UnwindSafe,
    PC: FnOnce(String) -> E,
{
    match catch_unwind(plugin_fn) {
        Ok(result) => result,
        Err(panic_info) => {
            let msg = extract_panic_message(&panic_info);
            tracing::error!(message = %msg, "Plugin panicked");
            Err(panic_to_error(msg))
        }
    }
}

/// Safely call a plugin function that returns a value directly (no Result)
pub fn call_plugin_safely_value<F, T>(plugin_fn: F) -> Result<T, PluginError>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(plugin_fn) {
        Ok(result) => Ok(result),
        Err(panic_info) => {
            let msg = extract_panic_message(&panic_info);
            tracing::error!(message = %msg, "Plugin panicked");
            Err(PluginError::Panic(msg))
        }
    }
}

/// Extract a human-readable message from panic info
fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (non-string payload)".to_string()
    }
}
