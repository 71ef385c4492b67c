//! Environment variable overrides.

use std::str::FromStr;

use super::{ClientConfig, ConfigError};
use crate::core::live::LiveVoice;
use crate::core::notifier::NotifierConfig;
use crate::core::transcribe::TranscribeConfig;

/// Non-empty value of `name`.
fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parsed value of `name`; an unparsable value is an error, not a default.
fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_string(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{name} has invalid value {value:?}"))),
        None => Ok(None),
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Apply every recognised environment variable to `config`.
pub(super) fn apply_env(config: &mut ClientConfig) -> Result<(), ConfigError> {
    let live = &mut config.live;
    if let Some(key) = env_string("GEMINI_API_KEY") {
        live.api_key = Some(key);
    }
    set(&mut live.url, env_string("LIVE_URL"));
    set(&mut live.model, env_string("LIVE_MODEL"));
    set(
        &mut live.voice,
        env_string("LIVE_VOICE").map(|v| LiveVoice::from_str_or_default(&v)),
    );
    if let Some(instruction) = env_string("LIVE_SYSTEM_INSTRUCTION") {
        live.system_instruction = Some(instruction);
    }
    set(
        &mut live.timings.turn_complete_delay_ms,
        env_parse("LIVE_TURN_COMPLETE_DELAY_MS")?,
    );
    set(
        &mut live.timings.interruption_grace_ms,
        env_parse("LIVE_INTERRUPTION_GRACE_MS")?,
    );
    set(
        &mut live.timings.setup_timeout_ms,
        env_parse("LIVE_SETUP_TIMEOUT_MS")?,
    );

    let capture = &mut config.capture;
    set(&mut capture.start_threshold, env_parse("VAD_START_THRESHOLD")?);
    set(
        &mut capture.silence_threshold,
        env_parse("VAD_SILENCE_THRESHOLD")?,
    );
    set(
        &mut capture.silence_timeout_ms,
        env_parse("VAD_SILENCE_TIMEOUT_MS")?,
    );

    set(
        &mut config.playback.chunk_delay_ms,
        env_parse("PLAYBACK_CHUNK_DELAY_MS")?,
    );

    let gate = &mut config.gate;
    set(&mut gate.text_window_ms, env_parse("GATE_TEXT_WINDOW_MS")?);
    set(&mut gate.action_window_ms, env_parse("GATE_ACTION_WINDOW_MS")?);
    set(
        &mut gate.throttle_interval_ms,
        env_parse("GATE_THROTTLE_INTERVAL_MS")?,
    );
    set(
        &mut gate.side_effect_timeout_ms,
        env_parse("GATE_SIDE_EFFECT_TIMEOUT_MS")?,
    );
    set(
        &mut gate.lock_release_delay_ms,
        env_parse("GATE_LOCK_RELEASE_DELAY_MS")?,
    );

    set(&mut config.backend.base_url, env_string("BACKEND_URL"));

    if let Some(url) = env_string("TRANSCRIBE_URL") {
        config
            .transcribe
            .get_or_insert_with(TranscribeConfig::default)
            .base_url = url;
    }

    if let Some(url) = env_string("PUSH_URL") {
        config
            .notifier
            .get_or_insert_with(NotifierConfig::default)
            .push_url = url;
    }
    if let Some(notifier) = config.notifier.as_mut() {
        set(&mut notifier.client_id, env_string("CLIENT_ID"));
        if let Some(mode) = env_string("ANNOUNCEMENT_MODE") {
            notifier.mode = super::parse_mode(&mode)?;
        }
    }

    Ok(())
}
