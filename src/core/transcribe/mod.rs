//! Transcription collaborator.
//!
//! Finished speech segments are sent to an HTTP service that returns the
//! recognised text, and the text can be classified as a browser query or
//! not.

mod client;
mod messages;

pub use client::{DEFAULT_TRANSCRIBE_TIMEOUT_SECS, HttpTranscriber, TranscribeConfig};
pub use messages::{
    BROWSER_QUERY_LABEL, ClassifyRequest, ClassifyResponse, TranscribeRequest, TranscribeResponse,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::capture::SpeechSegment;

/// Errors from the transcription service.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// Request could not be sent or the response could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// Service answered with a non-success status
    #[error("Transcription service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Segment could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type TranscribeResult<T> = Result<T, TranscribeError>;

/// Classification of a transcribed utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLabel {
    BrowserQuery,
    NotBrowserQuery,
}

impl QueryLabel {
    /// Parse a service label; anything but `BROWSER_QUERY` is not a query.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case(BROWSER_QUERY_LABEL) {
            Self::BrowserQuery
        } else {
            Self::NotBrowserQuery
        }
    }

    pub fn is_browser_query(self) -> bool {
        self == Self::BrowserQuery
    }
}

/// Turns speech segments into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, segment: &SpeechSegment) -> TranscribeResult<String>;

    async fn classify(&self, text: &str) -> TranscribeResult<QueryLabel>;
}
