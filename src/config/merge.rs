//! YAML overrides on top of the environment-derived configuration.

use super::yaml::YamlConfig;
use super::{ClientConfig, ConfigError, parse_mode};
use crate::core::live::LiveVoice;
use crate::core::notifier::NotifierConfig;
use crate::core::transcribe::TranscribeConfig;

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Apply every value present in `yaml`.
pub(super) fn apply_yaml(config: &mut ClientConfig, yaml: YamlConfig) -> Result<(), ConfigError> {
    if let Some(live) = yaml.live {
        let target = &mut config.live;
        set(&mut target.url, live.url);
        if live.api_key.is_some() {
            target.api_key = live.api_key;
        }
        set(&mut target.model, live.model);
        set(
            &mut target.voice,
            live.voice.map(|v| LiveVoice::from_str_or_default(&v)),
        );
        if live.system_instruction.is_some() {
            target.system_instruction = live.system_instruction;
        }
        if live.temperature.is_some() {
            target.temperature = live.temperature;
        }
        set(&mut target.enable_browser_tool, live.enable_browser_tool);

        let timings = &mut target.timings;
        set(&mut timings.turn_complete_delay_ms, live.turn_complete_delay_ms);
        set(&mut timings.interruption_grace_ms, live.interruption_grace_ms);
        set(&mut timings.audio_batch_size, live.audio_batch_size);
        set(&mut timings.audio_batch_pause_ms, live.audio_batch_pause_ms);
        set(&mut timings.setup_timeout_ms, live.setup_timeout_ms);
        set(
            &mut timings.phrase_similarity_threshold,
            live.phrase_similarity_threshold,
        );
    }

    if let Some(capture) = yaml.capture {
        let target = &mut config.capture;
        set(&mut target.block_size, capture.block_size);
        set(&mut target.start_threshold, capture.start_threshold);
        set(&mut target.silence_threshold, capture.silence_threshold);
        set(&mut target.silence_timeout_ms, capture.silence_timeout_ms);
    }

    if let Some(playback) = yaml.playback {
        let target = &mut config.playback;
        set(&mut target.max_queued_chunks, playback.max_queued_chunks);
        set(&mut target.chunk_delay_ms, playback.chunk_delay_ms);
        set(&mut target.speaking_timeout_ms, playback.speaking_timeout_ms);
    }

    if let Some(gate) = yaml.gate {
        let target = &mut config.gate;
        set(&mut target.text_window_ms, gate.text_window_ms);
        set(&mut target.action_window_ms, gate.action_window_ms);
        set(&mut target.throttle_interval_ms, gate.throttle_interval_ms);
        set(&mut target.side_effect_timeout_ms, gate.side_effect_timeout_ms);
        set(&mut target.lock_release_delay_ms, gate.lock_release_delay_ms);
    }

    if let Some(backend) = yaml.backend {
        set(&mut config.backend.base_url, backend.url);
        set(&mut config.backend.timeout_secs, backend.timeout_secs);
    }

    // a section with a url turns the collaborator on
    if let Some(transcribe) = yaml.transcribe
        && (transcribe.url.is_some() || config.transcribe.is_some())
    {
        let target = config
            .transcribe
            .get_or_insert_with(TranscribeConfig::default);
        set(&mut target.base_url, transcribe.url);
        set(&mut target.timeout_secs, transcribe.timeout_secs);
    }

    if let Some(notifier) = yaml.notifier
        && (notifier.push_url.is_some() || config.notifier.is_some())
    {
        let target = config.notifier.get_or_insert_with(NotifierConfig::default);
        set(&mut target.push_url, notifier.push_url);
        set(&mut target.client_id, notifier.client_id);
        if let Some(mode) = notifier.mode {
            target.mode = parse_mode(&mode)?;
        }
        set(&mut target.reconnection.enabled, notifier.reconnect);
        set(&mut target.reconnection.max_attempts, notifier.max_attempts);
        set(
            &mut target.reconnection.initial_delay_ms,
            notifier.initial_delay_ms,
        );
        set(&mut target.reconnection.max_delay_ms, notifier.max_delay_ms);
    }

    Ok(())
}
