//! Side-effect collaborators of the intent gate.
//!
//! [`IntentSink`] performs the browser action on the backend, and
//! [`ConversationSink`] carries acknowledgements and updates back into the
//! live conversation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{BrowserAction, IntentError};
use crate::core::live::{FunctionResponse, LiveClient, LiveError};

/// Default backend request timeout (seconds). The gate applies its own
/// side-effect timeout on top of this.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// `POST /query` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub action: String,
    pub target: String,
    #[serde(rename = "rawText")]
    pub raw_text: String,
}

impl From<&BrowserAction> for QueryRequest {
    fn from(action: &BrowserAction) -> Self {
        Self {
            action: action.action.clone(),
            target: action.target.clone(),
            raw_text: action.raw_text.clone(),
        }
    }
}

/// `POST /query` response body.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub agent_address: Option<String>,
}

/// Executes accepted browser intents.
#[async_trait]
pub trait IntentSink: Send + Sync {
    async fn submit(&self, request: &QueryRequest) -> Result<QueryResponse, IntentError>;
}

/// Where acknowledgements and spoken updates go.
#[async_trait]
pub trait ConversationSink: Send + Sync {
    async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<(), LiveError>;

    /// Inject an update as a completed user turn.
    async fn send_update(&self, text: &str) -> Result<(), LiveError>;
}

#[async_trait]
impl ConversationSink for LiveClient {
    async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<(), LiveError> {
        LiveClient::send_tool_response(self, responses).await
    }

    async fn send_update(&self, text: &str) -> Result<(), LiveError> {
        self.send_text(text, true).await
    }
}

/// Backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the agent backend, e.g. `http://localhost:8000`
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
        }
    }
}

/// HTTP client for the backend `/query` endpoint.
pub struct HttpIntentSink {
    query_url: Url,
    http_client: Client,
}

impl HttpIntentSink {
    pub fn new(config: &BackendConfig) -> Result<Self, IntentError> {
        let query_url = Url::parse(&config.base_url)
            .and_then(|base| base.join("query"))
            .map_err(|e| IntentError::Configuration(format!("invalid backend url: {e}")))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| IntentError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            query_url,
            http_client,
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }
}

#[async_trait]
impl IntentSink for HttpIntentSink {
    async fn submit(&self, request: &QueryRequest) -> Result<QueryResponse, IntentError> {
        tracing::info!(
            action = %request.action,
            target = %request.target,
            "Submitting browser intent"
        );

        let response = self
            .http_client
            .post(self.query_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| IntentError::Http(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IntentError::Http(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Backend rejected intent");
            return Err(IntentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| IntentError::Http(format!("Invalid response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_wire_names() {
        let request = QueryRequest {
            action: "SEARCH".to_string(),
            target: "pizza".to_string(),
            raw_text: "find pizza".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["rawText"], "find pizza");
        assert!(json.get("raw_text").is_none());
    }

    #[test]
    fn test_query_url() {
        let sink = HttpIntentSink::new(&BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sink.query_url().as_str(), "http://localhost:8000/query");
    }

    #[test]
    fn test_response_without_address() {
        let response: QueryResponse = serde_json::from_str(r#"{"text": "done"}"#).unwrap();
        assert_eq!(response.text, "done");
        assert!(response.agent_address.is_none());
    }
}
