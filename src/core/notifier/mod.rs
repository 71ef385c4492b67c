//! Backend push channel.
//!
//! The agent backend pushes progress messages over a WebSocket. Each one
//! interrupts playback for as long as it takes to announce it, either as
//! synthesized speech or as input to the live model.

mod client;
mod reconnect;

pub use client::{Notification, Notifier, push_endpoint};
pub use reconnect::ReconnectionConfig;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::intent::ConversationSink;
use crate::core::playback::PlaybackScheduler;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Push channel error: {0}")]
    Connection(String),

    #[error("Invalid notifier configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Announcement failed: {0}")]
    Delivery(String),
}

pub type NotifierResult<T> = Result<T, NotifierError>;

/// How notifications reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementMode {
    /// Spoken through a [`SpeechSynthesizer`]
    Speech,
    /// Injected as a user turn so the model relays it
    #[default]
    ModelInput,
}

/// Push channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Backend base URL; `http(s)` is mapped to `ws(s)`
    pub push_url: String,
    pub client_id: String,
    pub mode: AnnouncementMode,
    pub reconnection: ReconnectionConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            push_url: "ws://localhost:8000".to_string(),
            client_id: "1".to_string(),
            mode: AnnouncementMode::default(),
            reconnection: ReconnectionConfig::default(),
        }
    }
}

/// Speaks text aloud.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> NotifierResult<()>;
}

/// Pause/resume hook on the playback path.
pub trait PlaybackControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

impl PlaybackControl for PlaybackScheduler {
    fn pause(&self) {
        PlaybackScheduler::pause(self);
    }

    fn resume(&self) {
        PlaybackScheduler::resume(self);
    }
}

/// Delivery target for notifications.
#[derive(Clone)]
pub enum Announcer {
    Speech(Arc<dyn SpeechSynthesizer>),
    ModelInput(Arc<dyn ConversationSink>),
}

impl Announcer {
    pub fn mode(&self) -> AnnouncementMode {
        match self {
            Self::Speech(_) => AnnouncementMode::Speech,
            Self::ModelInput(_) => AnnouncementMode::ModelInput,
        }
    }

    pub async fn announce(&self, text: &str) -> NotifierResult<()> {
        match self {
            Self::Speech(synth) => synth.speak(text).await,
            Self::ModelInput(conversation) => conversation
                .send_update(text)
                .await
                .map_err(|e| NotifierError::Delivery(e.to_string())),
        }
    }
}
