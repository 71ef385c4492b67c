//! Inbound frame dispatch.
//!
//! Turns classified server frames into [`LiveEvent`]s: interruption and
//! turn-completion grace timers, batched audio emission, and repeated-phrase
//! suppression for the remaining parts.

use tokio_util::sync::CancellationToken;

use super::base::{LiveEvent, LiveResult, LiveTimings};
use super::events::EventRegistry;
use super::messages::{InboundMessage, Part, ServerContent};
use super::phrases::suppress_repeats;
use crate::core::audio::{AudioChunk, DEFAULT_PLAYBACK_SAMPLE_RATE, sample_rate_from_mime};

/// Dispatches inbound frames for one connection.
///
/// Grace timers are children of `timers`; cancelling it drops every pending
/// delayed `TurnComplete`.
pub struct FrameDispatcher {
    events: EventRegistry,
    timings: LiveTimings,
    timers: CancellationToken,
}

impl FrameDispatcher {
    pub fn new(events: EventRegistry, timings: LiveTimings, timers: CancellationToken) -> Self {
        Self {
            events,
            timings,
            timers,
        }
    }

    /// Parse and handle one text frame. Returns `true` for `setupComplete`.
    ///
    /// Malformed frames are returned as errors and produce no events.
    pub async fn dispatch(&self, text: &str) -> LiveResult<bool> {
        let message = InboundMessage::parse(text)?;
        let setup_complete = matches!(message, InboundMessage::SetupComplete);
        self.handle(message).await;
        Ok(setup_complete)
    }

    /// Handle one classified frame.
    async fn handle(&self, message: InboundMessage) {
        match message {
            InboundMessage::SetupComplete => {
                tracing::info!("Live session setup complete");
                self.events.emit(LiveEvent::SetupComplete);
            }
            InboundMessage::ToolCall(call) => {
                tracing::debug!(count = call.function_calls.len(), "Tool call received");
                self.events.emit(LiveEvent::ToolCall(call.function_calls));
            }
            InboundMessage::ToolCallCancellation(cancellation) => {
                tracing::debug!(ids = ?cancellation.ids, "Tool call cancellation received");
                self.events
                    .emit(LiveEvent::ToolCallCancellation(cancellation.ids));
            }
            InboundMessage::ServerContent(content) => self.handle_server_content(content).await,
        }
    }

    async fn handle_server_content(&self, content: ServerContent) {
        if content.interrupted {
            tracing::debug!("Model turn interrupted");
            self.events.emit(LiveEvent::Interrupted);
            self.schedule_turn_complete(self.timings.interruption_grace());
        } else if content.turn_complete {
            self.schedule_turn_complete(self.timings.turn_complete_delay());
        }

        let Some(turn) = content.model_turn else {
            return;
        };

        let (audio, other): (Vec<Part>, Vec<Part>) =
            turn.parts.into_iter().partition(Part::is_audio);

        self.emit_audio(audio).await;

        let remaining = suppress_repeats(other, self.timings.phrase_similarity_threshold);
        if !remaining.is_empty() {
            self.events.emit(LiveEvent::Content(remaining));
        }
    }

    /// Emit one `Audio` event per part, in groups separated by a short pause.
    async fn emit_audio(&self, parts: Vec<Part>) {
        let batch_size = self.timings.audio_batch_size.max(1);
        let mut emitted = 0usize;

        for blob in parts.into_iter().filter_map(|p| p.inline_data) {
            let bytes = match blob.decode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Dropping audio part: {}", e);
                    continue;
                }
            };

            if emitted > 0 && emitted % batch_size == 0 {
                tokio::time::sleep(self.timings.audio_batch_pause()).await;
            }

            let sample_rate = sample_rate_from_mime(&blob.mime_type, DEFAULT_PLAYBACK_SAMPLE_RATE);
            self.events
                .emit(LiveEvent::Audio(AudioChunk::new(bytes, sample_rate)));
            emitted += 1;
        }
    }

    fn schedule_turn_complete(&self, delay: std::time::Duration) {
        let token = self.timers.child_token();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Pending turn completion cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    events.emit(LiveEvent::TurnComplete);
                }
            }
        });
    }
}
