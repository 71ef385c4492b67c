//! Browser-action intents and tool-call argument parsing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::IntentError;

/// Arguments of a `browser_action` tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserAction {
    pub action: String,
    #[serde(default)]
    pub target: String,
    #[serde(rename = "rawText", default)]
    pub raw_text: String,
}

impl BrowserAction {
    /// Parse tool-call arguments. `action` is required and must be non-blank.
    pub fn from_args(args: &Value) -> Result<Self, IntentError> {
        let parsed: BrowserAction = serde_json::from_value(args.clone())
            .map_err(|e| IntentError::InvalidArguments(e.to_string()))?;
        if parsed.action.trim().is_empty() {
            return Err(IntentError::InvalidArguments(
                "action must not be empty".to_string(),
            ));
        }
        Ok(Self {
            action: parsed.action.trim().to_string(),
            target: parsed.target.trim().to_string(),
            raw_text: parsed.raw_text.trim().to_string(),
        })
    }

    /// Key used for action-and-target duplicate checks.
    pub fn key(&self) -> String {
        format!(
            "{}|{}",
            self.action.to_lowercase(),
            self.target.to_lowercase()
        )
    }
}

/// An accepted browser intent. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub id: Uuid,
    pub action: String,
    pub target: String,
    pub raw_text: String,
    /// Unix epoch milliseconds at acceptance
    pub timestamp_ms: u64,
    /// Id of the tool call that produced the intent
    pub call_id: String,
}

impl Intent {
    pub fn new(call_id: &str, action: &BrowserAction) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            action: action.action.clone(),
            target: action.target.clone(),
            raw_text: action.raw_text.clone(),
            timestamp_ms,
            call_id: call_id.to_string(),
        }
    }
}
