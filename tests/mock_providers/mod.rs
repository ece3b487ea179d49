//! Mock Agent Backends
//!
//! Local WebSocket servers that speak a provider's conversation protocol so
//! the gateway can be driven end to end without network access.

// Allow dead code in test infrastructure - not every test binary uses every helper
#![allow(dead_code)]

use std::time::Duration;

pub mod elevenlabs_mock;

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
