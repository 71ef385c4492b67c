//! Client configuration
//!
//! Settings come from built-in defaults, environment variables (including a
//! `.env` file loaded at startup) and an optional YAML file.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use voxbridge::config::ClientConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment only
//! let config = ClientConfig::from_env()?;
//!
//! // YAML file on top of the environment
//! let config = ClientConfig::from_file(Path::new("voxbridge.yaml"))?;
//! println!("Live endpoint: {}", config.live.url);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use thiserror::Error;

mod env;
mod merge;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::capture::CaptureConfig;
use crate::core::intent::{BackendConfig, GateConfig};
use crate::core::live::LiveConfig;
use crate::core::notifier::{AnnouncementMode, NotifierConfig, push_endpoint};
use crate::core::playback::PlaybackConfig;
use crate::core::transcribe::TranscribeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Read(String),

    #[error("{0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub live: LiveConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub gate: GateConfig,
    pub backend: BackendConfig,
    /// Transcription service; capture segments are not transcribed without it
    pub transcribe: Option<TranscribeConfig>,
    /// Backend push channel; disabled without it
    pub notifier: Option<NotifierConfig>,
}

impl ClientConfig {
    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file on top of the environment configuration.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        env::apply_env(&mut config)?;
        merge::apply_yaml(&mut config, yaml_config)?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Check every section for values the components would reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.live
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.capture
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.playback.max_queued_chunks == 0 {
            return Err(ConfigError::Invalid(
                "playback.max_queued_chunks must be at least 1".to_string(),
            ));
        }
        if self.gate.side_effect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "gate.side_effect_timeout_ms must be non-zero".to_string(),
            ));
        }
        url::Url::parse(&self.backend.base_url)
            .map_err(|e| ConfigError::Invalid(format!("backend url: {e}")))?;
        if let Some(transcribe) = &self.transcribe {
            url::Url::parse(&transcribe.base_url)
                .map_err(|e| ConfigError::Invalid(format!("transcribe url: {e}")))?;
        }
        if let Some(notifier) = &self.notifier {
            push_endpoint(&notifier.push_url, &notifier.client_id)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// Parse an announcement mode name.
pub(crate) fn parse_mode(value: &str) -> Result<AnnouncementMode, ConfigError> {
    match value.trim().to_lowercase().replace('-', "_").as_str() {
        "speech" => Ok(AnnouncementMode::Speech),
        "model_input" | "model" => Ok(AnnouncementMode::ModelInput),
        other => Err(ConfigError::Invalid(format!(
            "unknown announcement mode {other:?}"
        ))),
    }
}
