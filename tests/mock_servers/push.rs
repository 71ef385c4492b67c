//! Backend push channel mock
//!
//! Accepts connections on any path, records the request path and pushes
//! queued frames to the most recent connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

enum Command {
    Frame(String),
    /// Drop the connection without a close frame
    Drop,
}

#[derive(Default)]
struct PushState {
    paths: Mutex<Vec<String>>,
    connections: AtomicU64,
}

pub struct MockPushServer {
    base_url: String,
    state: Arc<PushState>,
    commands: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

impl MockPushServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock push server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(PushState::default());
        let (commands, mut rx) = mpsc::unbounded_channel();

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server_state.connections.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = serve(stream, &server_state, &mut rx).await {
                    eprintln!("mock push connection error: {e}");
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            commands,
            handle,
        }
    }

    /// HTTP base URL, as a backend would be configured.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn push(&self, frame: Value) {
        let _ = self.commands.send(Command::Frame(frame.to_string()));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.commands.send(Command::Frame(text.to_string()));
    }

    pub fn drop_connection(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.paths.lock().clone()
    }

    pub fn connections(&self) -> u64 {
        self.state.connections.load(Ordering::Relaxed)
    }
}

impl Drop for MockPushServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    stream: TcpStream,
    state: &PushState,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
        state.paths.lock().push(request.uri().path().to_string());
        Ok(response)
    })
    .await?;
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Frame(text)) => write.send(Message::Text(text.into())).await?,
                Some(Command::Drop) | None => break,
            },
            message = read.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
    Ok(())
}
