//! Request and response bodies of the transcription service.

use serde::{Deserialize, Serialize};

/// Label the classifier returns for browser-actionable text.
pub const BROWSER_QUERY_LABEL: &str = "BROWSER_QUERY";

/// `POST /transcribe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeRequest {
    /// Base64-encoded audio file
    pub data: String,
    /// MIME type of `data`
    pub mime_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeResponse {
    #[serde(default)]
    pub text: String,
}

/// `POST /classify`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub label: String,
}
