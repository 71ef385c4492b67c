//! Base types for the live duplex session.
//!
//! This module defines the error taxonomy, the connection lifecycle, the
//! typed events raised for inbound frames, and the tuning knobs that govern
//! event pacing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::messages::{FunctionCall, Part};
use crate::core::audio::AudioChunk;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the live connection.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The transport could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A send was attempted without an open connection
    #[error("Not connected")]
    NotConnected,

    /// An inbound frame did not match any known shape
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// WebSocket error on an established connection
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for live operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection has been attempted yet
    #[default]
    Idle,
    /// Transport is being established
    Connecting,
    /// Socket open, setup sent, waiting for `setupComplete`
    OpenPendingSetup,
    /// Setup acknowledged
    Ready,
    /// Teardown in progress
    Closing,
    /// Connection is gone
    Closed,
}

impl ConnectionState {
    /// Whether frames may be written in this state.
    pub fn accepts_sends(self) -> bool {
        matches!(self, ConnectionState::OpenPendingSetup | ConnectionState::Ready)
    }

    /// Whether a disconnect would have anything to tear down.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::OpenPendingSetup | ConnectionState::Ready
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::OpenPendingSetup => write!(f, "OpenPendingSetup"),
            ConnectionState::Ready => write!(f, "Ready"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Typed events raised by the live client.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Socket opened; setup frame sent
    Open,
    /// The server acknowledged the setup frame
    SetupComplete,
    /// One audio part of a model turn
    Audio(AudioChunk),
    /// Non-audio parts of a model turn, after repeated-phrase suppression
    Content(Vec<Part>),
    /// The current model turn was abandoned; unplayed audio is stale
    Interrupted,
    /// The model finished its turn
    TurnComplete,
    /// The model requests one or more function invocations
    ToolCall(Vec<FunctionCall>),
    /// The model withdrew earlier function calls
    ToolCallCancellation(Vec<String>),
    /// The connection closed (emitted exactly once per connection)
    Close {
        /// Close reason, if one was given
        reason: Option<String>,
    },
}

impl LiveEvent {
    /// The kind of this event, used for filtered subscriptions.
    pub fn kind(&self) -> LiveEventKind {
        match self {
            LiveEvent::Open => LiveEventKind::Open,
            LiveEvent::SetupComplete => LiveEventKind::SetupComplete,
            LiveEvent::Audio(_) => LiveEventKind::Audio,
            LiveEvent::Content(_) => LiveEventKind::Content,
            LiveEvent::Interrupted => LiveEventKind::Interrupted,
            LiveEvent::TurnComplete => LiveEventKind::TurnComplete,
            LiveEvent::ToolCall(_) => LiveEventKind::ToolCall,
            LiveEvent::ToolCallCancellation(_) => LiveEventKind::ToolCallCancellation,
            LiveEvent::Close { .. } => LiveEventKind::Close,
        }
    }
}

/// Discriminant of [`LiveEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveEventKind {
    Open,
    SetupComplete,
    Audio,
    Content,
    Interrupted,
    TurnComplete,
    ToolCall,
    ToolCallCancellation,
    Close,
}

impl fmt::Display for LiveEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiveEventKind::Open => "open",
            LiveEventKind::SetupComplete => "setupcomplete",
            LiveEventKind::Audio => "audio",
            LiveEventKind::Content => "content",
            LiveEventKind::Interrupted => "interrupted",
            LiveEventKind::TurnComplete => "turncomplete",
            LiveEventKind::ToolCall => "toolcall",
            LiveEventKind::ToolCallCancellation => "toolcallcancellation",
            LiveEventKind::Close => "close",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// Timing Configuration
// =============================================================================

/// Default delay before `TurnComplete` for a normal end of turn (ms).
pub const DEFAULT_TURN_COMPLETE_DELAY_MS: u64 = 500;

/// Default delay before `TurnComplete` after an interruption (ms).
pub const DEFAULT_INTERRUPTION_GRACE_MS: u64 = 700;

/// Default number of audio events emitted back to back.
pub const DEFAULT_AUDIO_BATCH_SIZE: usize = 4;

/// Default pause between audio event groups (ms).
pub const DEFAULT_AUDIO_BATCH_PAUSE_MS: u64 = 5;

/// Default wait for `setupComplete` (ms).
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 10_000;

/// Default token Jaccard similarity above which two phrases are duplicates.
pub const DEFAULT_PHRASE_SIMILARITY: f32 = 0.7;

/// Pacing and grace delays for inbound event emission.
///
/// These values trade clipped audio against double playback and were tuned
/// empirically; every field can be overridden from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveTimings {
    /// Delay between a `turnComplete` frame and the `TurnComplete` event (ms)
    pub turn_complete_delay_ms: u64,
    /// Delay between `Interrupted` and the following `TurnComplete` (ms)
    pub interruption_grace_ms: u64,
    /// Audio events emitted per group
    pub audio_batch_size: usize,
    /// Pause between audio groups (ms)
    pub audio_batch_pause_ms: u64,
    /// How long `connect` waits for `setupComplete` (ms)
    pub setup_timeout_ms: u64,
    /// Jaccard threshold for repeated-phrase suppression (0.0 - 1.0)
    pub phrase_similarity_threshold: f32,
}

impl Default for LiveTimings {
    fn default() -> Self {
        Self {
            turn_complete_delay_ms: DEFAULT_TURN_COMPLETE_DELAY_MS,
            interruption_grace_ms: DEFAULT_INTERRUPTION_GRACE_MS,
            audio_batch_size: DEFAULT_AUDIO_BATCH_SIZE,
            audio_batch_pause_ms: DEFAULT_AUDIO_BATCH_PAUSE_MS,
            setup_timeout_ms: DEFAULT_SETUP_TIMEOUT_MS,
            phrase_similarity_threshold: DEFAULT_PHRASE_SIMILARITY,
        }
    }
}

impl LiveTimings {
    pub fn turn_complete_delay(&self) -> Duration {
        Duration::from_millis(self.turn_complete_delay_ms)
    }

    pub fn interruption_grace(&self) -> Duration {
        Duration::from_millis(self.interruption_grace_ms)
    }

    pub fn audio_batch_pause(&self) -> Duration {
        Duration::from_millis(self.audio_batch_pause_ms)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    /// Check the values for internal consistency.
    pub fn validate(&self) -> LiveResult<()> {
        if self.audio_batch_size == 0 {
            return Err(LiveError::InvalidConfiguration(
                "audio_batch_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.phrase_similarity_threshold) {
            return Err(LiveError::InvalidConfiguration(format!(
                "phrase_similarity_threshold must be within 0.0-1.0, got {}",
                self.phrase_similarity_threshold
            )));
        }
        if self.turn_complete_delay_ms > self.interruption_grace_ms {
            return Err(LiveError::InvalidConfiguration(
                "turn_complete_delay_ms must not exceed interruption_grace_ms".to_string(),
            ));
        }
        Ok(())
    }
}
