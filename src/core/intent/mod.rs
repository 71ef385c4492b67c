//! Browser intents issued by the model as tool calls.
//!
//! [`IntentGate`] decides which `browser_action` calls reach the backend
//! and acknowledges every call exactly once.

mod backend;
mod gate;
mod record;

pub use backend::{
    BackendConfig, ConversationSink, DEFAULT_BACKEND_TIMEOUT_SECS, HttpIntentSink, IntentSink,
    QueryRequest, QueryResponse,
};
pub use gate::{
    DEFAULT_ACTION_WINDOW_MS, DEFAULT_LOCK_RELEASE_DELAY_MS, DEFAULT_SIDE_EFFECT_TIMEOUT_MS,
    DEFAULT_TEXT_WINDOW_MS, DEFAULT_THROTTLE_INTERVAL_MS, Decision, DuplicateTracker, GateConfig,
    GateOutcome, IntentGate, SkipReason,
};
pub use record::{BrowserAction, Intent};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntentError {
    /// Transport failure talking to the backend
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend call timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid tool call arguments: {0}")]
    InvalidArguments(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
