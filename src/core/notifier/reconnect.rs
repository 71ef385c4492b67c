//! Reconnection policy for the push channel.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff between push-channel connection attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    /// Reconnect after the channel drops or fails to open.
    /// Default: true
    pub enabled: bool,

    /// Consecutive failed attempts before giving up; 0 retries forever.
    /// Default: 0
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds).
    /// Default: 1000ms
    pub initial_delay_ms: u64,

    /// Cap on the retry delay (milliseconds).
    /// Default: 30000ms
    pub max_delay_ms: u64,

    /// Growth factor per attempt.
    /// Default: 2.0
    pub backoff_multiplier: f32,

    /// Spread retries by up to 25% of the delay.
    /// Default: true
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 0,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64;
        let delay = base * f64::from(self.backoff_multiplier).powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        let delay = if self.jitter {
            (delay + jitter(delay * 0.25)).max(0.0)
        } else {
            delay
        };
        Duration::from_millis(delay as u64)
    }

    /// Whether retry number `attempt` may be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }
}

/// Value in `-range..=range` seeded from the clock.
fn jitter(range: f64) -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // LCG step
    let random = (seed.wrapping_mul(1_103_515_245).wrapping_add(12_345) % (1 << 31)) as f64;
    let unit = random / (1u64 << 31) as f64;
    (unit - 0.5) * 2.0 * range
}
