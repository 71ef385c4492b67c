//! Mock servers for integration tests
//!
//! - `live`: a Gemini-Live style endpoint that acknowledges setup, records
//!   client frames and pushes scripted server frames
//! - `push`: the backend notification channel at `/ws/{client_id}`

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod live;
pub mod push;

use std::time::Duration;

pub use live::{LiveMockConfig, MockLiveServer};
pub use push::MockPushServer;

/// Poll `check` every 10ms until it returns true or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
