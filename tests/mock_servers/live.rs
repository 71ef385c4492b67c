//! Live endpoint mock
//!
//! Connections are served one at a time. The first client frame is
//! expected to be `setup`; the server answers with `setupComplete` unless
//! configured not to.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

#[derive(Debug, Clone)]
pub struct LiveMockConfig {
    /// Reply to `setup` with `setupComplete`
    pub ack_setup: bool,
}

impl Default for LiveMockConfig {
    fn default() -> Self {
        Self { ack_setup: true }
    }
}

enum Command {
    Frame(String),
    Close(String),
}

#[derive(Default)]
struct MockState {
    frames: Mutex<Vec<Value>>,
    connections: AtomicU64,
    client_closes: AtomicU64,
}

/// Scriptable live endpoint bound to an ephemeral local port.
pub struct MockLiveServer {
    url: String,
    state: Arc<MockState>,
    commands: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

impl MockLiveServer {
    pub async fn start() -> Self {
        Self::start_with(LiveMockConfig::default()).await
    }

    pub async fn start_with(config: LiveMockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock live server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(MockState::default());
        let (commands, mut rx) = mpsc::unbounded_channel();

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server_state.connections.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = serve(stream, &config, &server_state, &mut rx).await {
                    eprintln!("mock live connection error: {e}");
                }
            }
        });

        Self {
            url: format!("ws://{addr}/live"),
            state,
            commands,
            handle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a raw text frame to the connected client.
    pub fn send_raw(&self, text: impl Into<String>) {
        let _ = self.commands.send(Command::Frame(text.into()));
    }

    pub fn send_json(&self, value: Value) {
        self.send_raw(value.to_string());
    }

    /// Close the current connection with `reason`.
    pub fn close(&self, reason: &str) {
        let _ = self.commands.send(Command::Close(reason.to_string()));
    }

    /// Every frame received from clients, in arrival order.
    pub fn frames(&self) -> Vec<Value> {
        self.state.frames.lock().clone()
    }

    /// Received frames carrying the top-level `key`.
    pub fn frames_with(&self, key: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame.get(key).is_some())
            .collect()
    }

    pub fn connections(&self) -> u64 {
        self.state.connections.load(Ordering::Relaxed)
    }

    /// Close frames received from clients.
    pub fn client_closes(&self) -> u64 {
        self.state.client_closes.load(Ordering::Relaxed)
    }
}

impl Drop for MockLiveServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    stream: TcpStream,
    config: &LiveMockConfig,
    state: &MockState,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Frame(text)) => write.send(Message::Text(text.into())).await?,
                Some(Command::Close(reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: reason.into(),
                    };
                    write.send(Message::Close(Some(frame))).await?;
                    break;
                }
                None => break,
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(text.as_str())?;
                    let is_setup = value.get("setup").is_some();
                    state.frames.lock().push(value);
                    if is_setup && config.ack_setup {
                        let ack = json!({"setupComplete": {}});
                        write.send(Message::Text(ack.to_string().into())).await?;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    state.client_closes.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }
    Ok(())
}

// =============================================================================
// Server frame builders
// =============================================================================

/// `serverContent` carrying one PCM16 audio part per entry.
pub fn audio_frame(chunks: &[&[u8]]) -> Value {
    let parts: Vec<Value> = chunks
        .iter()
        .map(|bytes| {
            json!({"inlineData": {
                "mimeType": "audio/pcm;rate=24000",
                "data": BASE64_STANDARD.encode(bytes),
            }})
        })
        .collect();
    json!({"serverContent": {"modelTurn": {"parts": parts}}})
}

pub fn text_frame(text: &str) -> Value {
    json!({"serverContent": {"modelTurn": {"parts": [{"text": text}]}}})
}

pub fn turn_complete_frame() -> Value {
    json!({"serverContent": {"turnComplete": true}})
}

pub fn interrupted_frame() -> Value {
    json!({"serverContent": {"interrupted": true}})
}

pub fn tool_call_frame(id: &str, args: Value) -> Value {
    json!({"toolCall": {"functionCalls": [
        {"id": id, "name": "browser_action", "args": args}
    ]}})
}

pub fn tool_cancellation_frame(ids: &[&str]) -> Value {
    json!({"toolCallCancellation": {"ids": ids}})
}
