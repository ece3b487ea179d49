//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Health check and status endpoints
//! - `device` - Device voice-to-voice WebSocket
//! - `providers` - Backend provider discovery

pub mod api;
pub mod device;
pub mod providers;

pub use device::device_handler;
