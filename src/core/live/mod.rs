//! Live duplex session with a streaming voice model.
//!
//! # Protocol
//!
//! - Endpoint: Gemini-Live `BidiGenerateContent` WebSocket (or a relay)
//! - Framing: one JSON object per frame, keyed by message kind
//! - Audio out: PCM 16-bit, 16kHz, mono, base64 `realtimeInput` chunks
//! - Audio in: PCM 16-bit at the rate given in each part's MIME type
//!
//! # Architecture
//!
//! - [`LiveClient`] owns the socket and exposes the send API
//! - [`FrameDispatcher`] classifies inbound frames into [`LiveEvent`]s
//! - [`EventRegistry`] fans events out to subscribers in order

mod base;
mod client;
mod config;
mod dispatch;
mod events;
pub mod messages;
pub mod phrases;

pub use base::{
    ConnectionState, DEFAULT_AUDIO_BATCH_PAUSE_MS, DEFAULT_AUDIO_BATCH_SIZE,
    DEFAULT_INTERRUPTION_GRACE_MS, DEFAULT_PHRASE_SIMILARITY, DEFAULT_SETUP_TIMEOUT_MS,
    DEFAULT_TURN_COMPLETE_DELAY_MS, LiveError, LiveEvent, LiveEventKind, LiveResult, LiveTimings,
};
pub use client::LiveClient;
pub use config::{
    BROWSER_ACTION_TOOL, DEFAULT_LIVE_MODEL, DEFAULT_LIVE_URL, DEFAULT_VOICE, LiveConfig,
    LiveVoice, browser_action_declaration,
};
pub use dispatch::FrameDispatcher;
pub use events::{EventRegistry, Subscription};
pub use messages::{
    Blob, Content, FunctionCall, FunctionResponse, InboundMessage, OutboundMessage, Part,
    SetupConfig,
};
