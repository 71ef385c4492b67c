use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// Every field is optional; anything left out keeps the value coming from
/// the environment or the built-in default.
///
/// # Example YAML structure
/// ```yaml
/// live:
///   url: "wss://relay.example.com/gemini"
///   api_key: "your-gemini-key"
///   model: "models/gemini-2.0-flash-exp"
///   voice: "Kore"
///   interruption_grace_ms: 700
///
/// capture:
///   start_threshold: 0.05
///   silence_threshold: 0.03
///   silence_timeout_ms: 1500
///
/// playback:
///   chunk_delay_ms: 20
///
/// gate:
///   text_window_ms: 2000
///   action_window_ms: 3500
///
/// backend:
///   url: "http://localhost:8000"
///
/// transcribe:
///   url: "http://localhost:8005"
///
/// notifier:
///   push_url: "ws://localhost:8000"
///   client_id: "1"
///   mode: "model_input"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub live: Option<LiveYaml>,
    pub capture: Option<CaptureYaml>,
    pub playback: Option<PlaybackYaml>,
    pub gate: Option<GateYaml>,
    pub backend: Option<BackendYaml>,
    pub transcribe: Option<TranscribeYaml>,
    pub notifier: Option<NotifierYaml>,
}

/// Live session settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub enable_browser_tool: Option<bool>,
    pub turn_complete_delay_ms: Option<u64>,
    pub interruption_grace_ms: Option<u64>,
    pub audio_batch_size: Option<usize>,
    pub audio_batch_pause_ms: Option<u64>,
    pub setup_timeout_ms: Option<u64>,
    pub phrase_similarity_threshold: Option<f32>,
}

/// Capture and VAD tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CaptureYaml {
    pub block_size: Option<usize>,
    pub start_threshold: Option<f32>,
    pub silence_threshold: Option<f32>,
    pub silence_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlaybackYaml {
    pub max_queued_chunks: Option<usize>,
    pub chunk_delay_ms: Option<u64>,
    pub speaking_timeout_ms: Option<u64>,
}

/// Intent gate windows from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GateYaml {
    pub text_window_ms: Option<u64>,
    pub action_window_ms: Option<u64>,
    pub throttle_interval_ms: Option<u64>,
    pub side_effect_timeout_ms: Option<u64>,
    pub lock_release_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TranscribeYaml {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Push channel settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NotifierYaml {
    pub push_url: Option<String>,
    pub client_id: Option<String>,
    pub mode: Option<String>,
    pub reconnect: Option<bool>,
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML for
    /// this structure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Read(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML config: {e}")))
    }
}
