//! Push-channel WebSocket client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    AnnouncementMode, Announcer, NotifierConfig, NotifierError, NotifierResult, PlaybackControl,
};

/// A backend push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    /// Backend event type, e.g. `request_processed`
    pub kind: Option<String>,
    pub action: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNotification {
    Message {
        message: String,
    },
    Update {
        text: String,
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        action: Option<String>,
    },
}

impl Notification {
    /// Parse `{message}` or `{text, type, action}`; `None` for anything else
    /// or for blank text.
    pub fn parse(frame: &str) -> Option<Self> {
        let notification = match serde_json::from_str::<RawNotification>(frame).ok()? {
            RawNotification::Message { message } => Self {
                text: message,
                kind: None,
                action: None,
            },
            RawNotification::Update { text, kind, action } => Self { text, kind, action },
        };
        if notification.text.trim().is_empty() {
            return None;
        }
        Some(notification)
    }
}

/// Push-channel endpoint for a client: `{push_url}/ws/{client_id}`.
pub fn push_endpoint(push_url: &str, client_id: &str) -> NotifierResult<Url> {
    let mut url = Url::parse(push_url)
        .map_err(|e| NotifierError::InvalidConfiguration(format!("invalid push url: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(NotifierError::InvalidConfiguration(format!(
                "unsupported push url scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        NotifierError::InvalidConfiguration("cannot set push url scheme".to_string())
    })?;

    if client_id.is_empty() || client_id.contains('/') {
        return Err(NotifierError::InvalidConfiguration(format!(
            "invalid client id: {client_id:?}"
        )));
    }
    url.path_segments_mut()
        .map_err(|_| NotifierError::InvalidConfiguration("push url cannot be a base".to_string()))?
        .pop_if_empty()
        .push("ws")
        .push(client_id);
    Ok(url)
}

/// Background listener on the backend push channel.
pub struct Notifier {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
    delivered: Arc<AtomicU64>,
}

impl Notifier {
    /// Start listening. Every notification pauses playback, is announced,
    /// and resumes playback; it is also forwarded on the returned channel.
    pub fn spawn(
        config: NotifierConfig,
        announcer: Announcer,
        playback: Arc<dyn PlaybackControl>,
        shutdown: CancellationToken,
    ) -> NotifierResult<(Self, mpsc::UnboundedReceiver<Notification>)> {
        let endpoint = push_endpoint(&config.push_url, &config.client_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let delivered = Arc::new(AtomicU64::new(0));

        let worker = NotifierWorker {
            endpoint,
            config,
            announcer,
            playback,
            notifications: tx,
            delivered: delivered.clone(),
        };
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        Ok((
            Self {
                handle,
                shutdown,
                delivered,
            },
            rx,
        ))
    }

    /// Notifications announced so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

struct NotifierWorker {
    endpoint: Url,
    config: NotifierConfig,
    announcer: Announcer,
    playback: Arc<dyn PlaybackControl>,
    notifications: mpsc::UnboundedSender<Notification>,
    delivered: Arc<AtomicU64>,
}

impl NotifierWorker {
    async fn run(self, shutdown: CancellationToken) {
        let mut attempt = 0u32;

        loop {
            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = connect_async(self.endpoint.as_str()) => result,
            };

            match connected {
                Ok((stream, _)) => {
                    tracing::info!(endpoint = %self.endpoint, "Push channel connected");
                    attempt = 0;
                    if let Err(e) = self.listen(stream, &shutdown).await {
                        tracing::warn!("Push channel dropped: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!(endpoint = %self.endpoint, "Push channel connect failed: {}", e);
                }
            }

            if shutdown.is_cancelled() {
                break;
            }
            attempt += 1;
            if !self.config.reconnection.should_retry(attempt) {
                tracing::warn!(attempt, "Giving up on push channel");
                break;
            }
            let delay = self.config.reconnection.delay_for(attempt);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting push channel");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!("Push channel stopped");
    }

    async fn listen<S>(&self, stream: S, shutdown: &CancellationToken) -> NotifierResult<()>
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut write, mut read) = stream.split();

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                message = read.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => self.on_frame(text.as_str()).await,
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.on_frame(text).await,
                    Err(_) => tracing::warn!("Ignoring non-UTF-8 push frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| NotifierError::Connection(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .unwrap_or_default();
                    return Err(NotifierError::Connection(format!("closed by server: {reason}")));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(NotifierError::Connection(e.to_string())),
                None => return Err(NotifierError::Connection("stream ended".to_string())),
            }
        }
    }

    async fn on_frame(&self, frame: &str) {
        let Some(notification) = Notification::parse(frame) else {
            tracing::warn!("Ignoring unrecognised push frame");
            return;
        };
        tracing::info!(
            kind = notification.kind.as_deref().unwrap_or("message"),
            "Push notification received"
        );

        self.playback.pause();
        let result = self.announcer.announce(&notification.text).await;
        self.playback.resume();

        match result {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let mode = match self.announcer.mode() {
                    AnnouncementMode::Speech => "speech",
                    AnnouncementMode::ModelInput => "model input",
                };
                tracing::warn!("Failed to announce notification as {}: {}", mode, e);
            }
        }
        let _ = self.notifications.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_shape() {
        let n = Notification::parse(r#"{"message": "Your order is placed"}"#).unwrap();
        assert_eq!(n.text, "Your order is placed");
        assert!(n.kind.is_none());
    }

    #[test]
    fn test_parse_update_shape() {
        let n = Notification::parse(
            r#"{"text": "Testing responses", "type": "request_processed", "action": "TESTING"}"#,
        )
        .unwrap();
        assert_eq!(n.text, "Testing responses");
        assert_eq!(n.kind.as_deref(), Some("request_processed"));
        assert_eq!(n.action.as_deref(), Some("TESTING"));
    }

    #[test]
    fn test_parse_rejects_other_frames() {
        assert!(Notification::parse("hello").is_none());
        assert!(Notification::parse(r#"{"status": "ok"}"#).is_none());
        assert!(Notification::parse(r#"{"message": "  "}"#).is_none());
    }

    #[test]
    fn test_push_endpoint() {
        assert_eq!(
            push_endpoint("http://localhost:8000", "1").unwrap().as_str(),
            "ws://localhost:8000/ws/1"
        );
        assert_eq!(
            push_endpoint("https://agent.example.com/api/", "abc")
                .unwrap()
                .as_str(),
            "wss://agent.example.com/api/ws/abc"
        );
        assert!(push_endpoint("ftp://host", "1").is_err());
        assert!(push_endpoint("http://host", "").is_err());
    }
}
