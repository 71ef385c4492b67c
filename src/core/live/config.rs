//! Live session configuration.
//!
//! Holds the endpoint, credential and model selection, and builds the
//! `setup` frame (generation config, voice, system instruction and the
//! `browser_action` tool declaration).

use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::base::{LiveError, LiveResult, LiveTimings};
use super::messages::{
    Content, FunctionDeclaration, GenerationConfig, Part, SetupConfig, SpeechConfig, Tool,
};

/// Default bidirectional streaming endpoint.
pub const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Default model resource name.
pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.0-flash-exp";

/// Default prebuilt voice.
pub const DEFAULT_VOICE: &str = "Puck";

/// Name of the function the model calls to request a browser action.
pub const BROWSER_ACTION_TOOL: &str = "browser_action";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a voice assistant that helps the user operate a web browser. \
Keep spoken answers short. When the user asks for something that needs the browser, \
call browser_action exactly once per request with the action, the target and the user's words.";

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices offered by the live models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LiveVoice {
    #[default]
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
}

impl LiveVoice {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "puck" => Self::Puck,
            "charon" => Self::Charon,
            "kore" => Self::Kore,
            "fenrir" => Self::Fenrir,
            "aoede" => Self::Aoede,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for LiveVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Live Configuration
// =============================================================================

/// Connection and model settings for a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint (direct API or a relay)
    pub url: String,
    /// API key appended as `?key=`; omitted for relays that inject their own
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model resource name
    pub model: String,
    /// Prebuilt voice
    pub voice: LiveVoice,
    /// System instruction text
    pub system_instruction: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Declare the `browser_action` function
    pub enable_browser_tool: bool,
    /// Event pacing
    pub timings: LiveTimings,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LIVE_URL.to_string(),
            api_key: None,
            model: DEFAULT_LIVE_MODEL.to_string(),
            voice: LiveVoice::default(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            temperature: None,
            enable_browser_tool: true,
            timings: LiveTimings::default(),
        }
    }
}

impl LiveConfig {
    /// Build the connection URL, appending the API key when one is set.
    pub fn endpoint(&self) -> LiveResult<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| LiveError::InvalidConfiguration(format!("invalid live url: {e}")))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(LiveError::InvalidConfiguration(format!(
                    "live url must use ws or wss, got {other}"
                )));
            }
        }

        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    /// Build the `setup` frame for this configuration.
    pub fn setup(&self) -> SetupConfig {
        SetupConfig {
            model: self.model.clone(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig::prebuilt(self.voice.as_str())),
                temperature: self.temperature,
            }),
            system_instruction: self.system_instruction.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part::text(text.clone())],
            }),
            tools: if self.enable_browser_tool {
                vec![Tool {
                    function_declarations: vec![browser_action_declaration()],
                }]
            } else {
                Vec::new()
            },
        }
    }

    pub fn validate(&self) -> LiveResult<()> {
        if self.model.trim().is_empty() {
            return Err(LiveError::InvalidConfiguration(
                "model is required".to_string(),
            ));
        }
        self.endpoint()?;
        self.timings.validate()
    }
}

/// Declaration of the `browser_action` function.
///
/// The parameters mirror the backend query model: `action`, `target` and
/// `rawText`.
pub fn browser_action_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: BROWSER_ACTION_TOOL.to_string(),
        description: Some(
            "Ask the browser agent to perform an action on behalf of the user.".to_string(),
        ),
        parameters: Some(json!({
            "type": "OBJECT",
            "properties": {
                "action": {
                    "type": "STRING",
                    "description": "Short verb for the operation, e.g. SEARCH, OPEN, CLICK"
                },
                "target": {
                    "type": "STRING",
                    "description": "What the action applies to, e.g. a query or a site"
                },
                "rawText": {
                    "type": "STRING",
                    "description": "The user's words that led to this call"
                }
            },
            "required": ["action", "target", "rawText"]
        })),
    }
}
