//! HTTP transcription client.

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::messages::{ClassifyRequest, ClassifyResponse, TranscribeRequest, TranscribeResponse};
use super::{QueryLabel, TranscribeError, TranscribeResult, Transcriber};
use crate::core::capture::SpeechSegment;

/// Default request timeout (seconds).
pub const DEFAULT_TRANSCRIBE_TIMEOUT_SECS: u64 = 30;

/// Transcription service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    /// Service base URL, e.g. `http://localhost:8005`
    pub base_url: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8005".to_string(),
            timeout_secs: DEFAULT_TRANSCRIBE_TIMEOUT_SECS,
        }
    }
}

/// Client for `POST /transcribe` and `POST /classify`.
pub struct HttpTranscriber {
    base_url: Url,
    http_client: Client,
}

impl HttpTranscriber {
    pub fn new(config: &TranscribeConfig) -> TranscribeResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TranscribeError::Configuration(format!("invalid base url: {e}")))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| {
                TranscribeError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> TranscribeResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TranscribeError::Configuration(e.to_string()))
    }

    async fn post<Req: Serialize + ?Sized, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> TranscribeResult<Resp> {
        let response = self
            .http_client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await
            .map_err(|e| TranscribeError::Network(format!("Request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TranscribeError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(TranscribeError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| TranscribeError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, segment: &SpeechSegment) -> TranscribeResult<String> {
        let wav = segment
            .to_wav()
            .map_err(|e| TranscribeError::Encoding(e.to_string()))?;

        let request = TranscribeRequest {
            data: BASE64_STANDARD.encode(&wav),
            mime_type: "audio/wav".to_string(),
        };
        let response: TranscribeResponse = self.post("transcribe", &request).await?;
        let text = response.text.trim().to_string();

        tracing::info!(
            segment = %segment.id,
            chars = text.len(),
            "Transcription complete"
        );
        Ok(text)
    }

    async fn classify(&self, text: &str) -> TranscribeResult<QueryLabel> {
        let request = ClassifyRequest {
            text: text.to_string(),
        };
        let response: ClassifyResponse = self.post("classify", &request).await?;
        tracing::debug!(label = %response.label, "Classified utterance");
        Ok(QueryLabel::from_label(&response.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_base_url() {
        let config = TranscribeConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpTranscriber::new(&config),
            Err(TranscribeError::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_join() {
        let client = HttpTranscriber::new(&TranscribeConfig {
            base_url: "http://localhost:8005/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint("transcribe").unwrap().as_str(),
            "http://localhost:8005/transcribe"
        );
    }
}
