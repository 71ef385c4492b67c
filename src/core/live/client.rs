//! Live duplex session client.
//!
//! Owns the WebSocket for one session at a time. Outbound frames go through
//! a bounded channel into the connection task, which also reads inbound
//! frames and hands them to the [`FrameDispatcher`].
//!
//! # Example
//!
//! ```rust,ignore
//! use voxbridge::core::live::{LiveClient, LiveConfig, LiveEvent};
//!
//! let client = LiveClient::new(LiveConfig {
//!     api_key: Some("...".to_string()),
//!     ..Default::default()
//! })?;
//! let mut events = client.subscribe();
//! client.connect().await?;
//! client.send_text("What's on the front page?", true).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let LiveEvent::Audio(chunk) = event {
//!         // hand to playback
//!     }
//! }
//! ```

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::base::{ConnectionState, LiveError, LiveEvent, LiveEventKind, LiveResult};
use super::config::LiveConfig;
use super::dispatch::FrameDispatcher;
use super::events::{EventRegistry, Subscription};
use super::messages::{
    ClientContent, Content, FunctionResponse, OutboundMessage, SetupConfig, ToolResponse,
};
use crate::core::audio::AudioChunk;

/// Channel capacity for outbound frames.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Per-connection bookkeeping, guarded by a single lock so that state
/// transitions and the one-time `Close` emission cannot race.
#[derive(Default)]
struct ConnectionSlot {
    state: ConnectionState,
    /// Incremented on every connect; stale tasks compare against it
    generation: u64,
    sender: Option<mpsc::Sender<OutboundMessage>>,
    timers: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// Client for a Gemini-Live style bidirectional session.
pub struct LiveClient {
    config: LiveConfig,
    slot: Arc<Mutex<ConnectionSlot>>,
    events: EventRegistry,
}

impl LiveClient {
    pub fn new(config: LiveConfig) -> LiveResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            slot: Arc::new(Mutex::new(ConnectionSlot::default())),
            events: EventRegistry::new(),
        })
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.slot.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Subscribe to the given event kinds only.
    pub fn subscribe_to(&self, kinds: &[LiveEventKind]) -> Subscription {
        self.events.subscribe_to(kinds)
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.events.unsubscribe(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect using the setup frame derived from the configuration.
    pub async fn connect(&self) -> LiveResult<()> {
        self.connect_with(self.config.setup()).await
    }

    /// Open the socket, send `setup` as the first frame and wait for
    /// `setupComplete`.
    ///
    /// Returns `ConnectionFailed` if the transport cannot be established and
    /// `Timeout` if the server does not acknowledge the setup in time; in both
    /// cases the connection ends up `Closed`. Connecting while already
    /// connected is a no-op.
    pub async fn connect_with(&self, setup: SetupConfig) -> LiveResult<()> {
        let url = self.config.endpoint()?;
        let setup_timeout = self.config.timings.setup_timeout();
        let model = setup.model.clone();
        let setup_json = OutboundMessage::Setup(setup).to_json()?;

        let generation = {
            let mut slot = self.slot.lock();
            if slot.state.is_live() {
                tracing::debug!(state = %slot.state, "connect called on a live connection");
                return Ok(());
            }
            slot.state = ConnectionState::Connecting;
            slot.generation += 1;
            slot.generation
        };

        tracing::info!(model = %model, "Connecting to live endpoint");

        let ws_stream = match tokio::time::timeout(
            setup_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                self.fail_connect(generation);
                return Err(LiveError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                self.fail_connect(generation);
                return Err(LiveError::ConnectionFailed(
                    "timed out opening socket".to_string(),
                ));
            }
        };

        let (mut ws_sink, ws_stream) = ws_stream.split();

        if let Err(e) = ws_sink.send(Message::Text(setup_json.into())).await {
            self.fail_connect(generation);
            return Err(LiveError::ConnectionFailed(format!(
                "failed to send setup: {e}"
            )));
        }

        let (tx, rx) = mpsc::channel::<OutboundMessage>(WS_CHANNEL_CAPACITY);
        let (setup_tx, setup_rx) = oneshot::channel::<()>();
        let timers = CancellationToken::new();
        let dispatcher =
            FrameDispatcher::new(self.events.clone(), self.config.timings.clone(), timers.clone());

        {
            let mut slot = self.slot.lock();
            if slot.generation != generation || slot.state != ConnectionState::Connecting {
                return Err(LiveError::ConnectionFailed(
                    "connection closed while opening".to_string(),
                ));
            }
            slot.state = ConnectionState::OpenPendingSetup;
            slot.sender = Some(tx);
            slot.timers = Some(timers);
        }

        tracing::info!("Live socket open, setup sent");
        self.events.emit(LiveEvent::Open);

        let task = ConnectionTask {
            generation,
            slot: self.slot.clone(),
            events: self.events.clone(),
            dispatcher,
            setup_tx: Some(setup_tx),
        };
        let handle = tokio::spawn(task.run(ws_sink, ws_stream, rx));
        self.slot.lock().handle = Some(handle);

        match tokio::time::timeout(setup_timeout, setup_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LiveError::ConnectionFailed(
                "connection closed before setup completed".to_string(),
            )),
            Err(_) => {
                tracing::error!("Timed out waiting for setupComplete");
                close_connection(
                    &self.slot,
                    &self.events,
                    generation,
                    Some("setup timeout".to_string()),
                );
                Err(LiveError::Timeout(format!(
                    "no setupComplete within {}ms",
                    setup_timeout.as_millis()
                )))
            }
        }
    }

    fn fail_connect(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if slot.generation == generation {
            slot.state = ConnectionState::Closed;
        }
    }

    /// Close the connection.
    ///
    /// Returns `true` and emits one `Close` event if a connection was live,
    /// `false` otherwise (including after the server already closed it).
    pub fn disconnect(&self) -> bool {
        let generation = self.slot.lock().generation;
        let closed = close_connection(&self.slot, &self.events, generation, None);
        if closed {
            tracing::info!("Disconnected from live endpoint");
        }
        closed
    }

    // =========================================================================
    // Sending
    // =========================================================================

    async fn send_message(&self, message: OutboundMessage) -> LiveResult<()> {
        let sender = {
            let slot = self.slot.lock();
            if !slot.state.accepts_sends() {
                return Err(LiveError::NotConnected);
            }
            slot.sender.clone().ok_or(LiveError::NotConnected)?
        };
        tracing::trace!(kind = message.kind(), "Queueing outbound frame");
        sender
            .send(message)
            .await
            .map_err(|_| LiveError::NotConnected)
    }

    /// Send conversation turns.
    pub async fn send(&self, turns: Vec<Content>, turn_complete: bool) -> LiveResult<()> {
        self.send_message(OutboundMessage::ClientContent(ClientContent {
            turns,
            turn_complete,
        }))
        .await
    }

    /// Send a single user text turn.
    pub async fn send_text(&self, text: &str, turn_complete: bool) -> LiveResult<()> {
        self.send(vec![Content::user_text(text)], turn_complete).await
    }

    /// Stream audio chunks as `realtimeInput`.
    pub async fn send_realtime_input(&self, chunks: &[AudioChunk]) -> LiveResult<()> {
        self.send_message(OutboundMessage::audio(chunks)).await
    }

    /// Acknowledge function calls.
    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> LiveResult<()> {
        self.send_message(OutboundMessage::ToolResponse(ToolResponse {
            function_responses: responses,
        }))
        .await
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if let Some(timers) = slot.timers.take() {
            timers.cancel();
        }
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }
}

/// Transition the given connection to `Closed`, emitting `Close` once.
///
/// Dropping the outbound sender makes the connection task send a close
/// frame and exit.
fn close_connection(
    slot: &Mutex<ConnectionSlot>,
    events: &EventRegistry,
    generation: u64,
    reason: Option<String>,
) -> bool {
    let timers = {
        let mut slot = slot.lock();
        if slot.generation != generation || !slot.state.is_live() {
            return false;
        }
        slot.state = ConnectionState::Closing;
        slot.sender = None;
        slot.handle = None;
        slot.timers.take()
    };

    if let Some(timers) = timers {
        timers.cancel();
    }
    events.emit(LiveEvent::Close { reason });

    let mut slot = slot.lock();
    if slot.generation == generation {
        slot.state = ConnectionState::Closed;
    }
    true
}

// =============================================================================
// Connection Task
// =============================================================================

struct ConnectionTask {
    generation: u64,
    slot: Arc<Mutex<ConnectionSlot>>,
    events: EventRegistry,
    dispatcher: FrameDispatcher,
    setup_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionTask {
    async fn run<S, R>(mut self, mut ws_sink: S, mut ws_stream: R, mut rx: mpsc::Receiver<OutboundMessage>)
    where
        S: futures_util::Sink<Message> + Unpin,
        S::Error: std::fmt::Display,
        R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        let reason = loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(message) => {
                        let json = match message.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("Failed to serialize {} frame: {}", message.kind(), e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            let error = LiveError::WebSocketError(format!("send failed: {e}"));
                            tracing::error!("{}", error);
                            break Some(error.to_string());
                        }
                    }
                    None => {
                        // Local disconnect
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break None;
                    }
                },

                incoming = ws_stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.on_frame(text.as_str()).await,
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => self.on_frame(text).await,
                        Err(_) => tracing::warn!(len = data.len(), "Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            let error = LiveError::WebSocketError(format!("pong failed: {e}"));
                            tracing::error!("{}", error);
                            break Some(error.to_string());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("WebSocket closed by server");
                        break Some(
                            frame
                                .map(|f| f.reason.as_str().to_string())
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "closed by server".to_string()),
                        );
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let error = LiveError::WebSocketError(e.to_string());
                        tracing::error!("{}", error);
                        break Some(error.to_string());
                    }
                    None => break Some("stream ended".to_string()),
                },
            }
        };

        close_connection(&self.slot, &self.events, self.generation, reason);
        tracing::info!("Live connection task ended");
    }

    async fn on_frame(&mut self, text: &str) {
        match self.dispatcher.dispatch(text).await {
            Ok(true) => self.mark_ready(),
            Ok(false) => {}
            Err(e) => tracing::warn!("Dropping inbound frame: {}", e),
        }
    }

    fn mark_ready(&mut self) {
        {
            let mut slot = self.slot.lock();
            if slot.generation == self.generation && slot.state == ConnectionState::OpenPendingSetup
            {
                slot.state = ConnectionState::Ready;
            }
        }
        if let Some(tx) = self.setup_tx.take() {
            let _ = tx.send(());
        }
    }
}
