//! Voice session orchestration.
//!
//! A [`Session`] owns one live connection and the pipelines around it:
//!
//! ```text
//! source -> CapturePipeline -> OutboundSender -> LiveClient -> network
//! network -> LiveClient -> router -> { IntentGate, SessionEvent, interrupt }
//!                       -> audio router -> PlaybackScheduler
//! push channel -> Notifier -> { pause/resume playback, announce }
//! ```
//!
//! The playback speaking flag is fed back into capture as the mute
//! interlock.
//!
//! Model audio has its own subscription because enqueueing waits while the
//! playback queue is full. Interruptions are claimed by whichever router
//! sees them first, so a saturated queue never delays an interrupt.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::core::capture::{
    AudioSource, CaptureError, CaptureEvent, CapturePipeline, CaptureSummary, OutboundSender,
};
use crate::core::intent::{
    ConversationSink, GateOutcome, HttpIntentSink, IntentError, IntentGate, IntentSink,
};
use crate::core::live::{LiveClient, LiveError, LiveEvent, LiveEventKind, Subscription};
use crate::core::notifier::{
    AnnouncementMode, Announcer, Notification, Notifier, NotifierError, SpeechSynthesizer,
};
use crate::core::playback::{AudioSink, NullSink, PlaybackScheduler, PlaybackStats};
use crate::core::transcribe::{HttpTranscriber, TranscribeError, Transcriber};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Live(#[from] LiveError),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Notifier(#[from] NotifierError),

    #[error("Capture already running")]
    CaptureRunning,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Everything a session reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Model text for the transcript
    Transcript(String),
    Interrupted,
    TurnComplete,
    Capture(CaptureEvent),
    Intent(GateOutcome),
    Notification(Notification),
    /// The live connection closed
    Closed { reason: Option<String> },
}

/// Collaborators for a session; anything left unset is built from the
/// configuration.
pub struct SessionBuilder {
    config: ClientConfig,
    audio_sink: Option<Arc<dyn AudioSink>>,
    intent_sink: Option<Arc<dyn IntentSink>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl SessionBuilder {
    pub fn audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    pub fn intent_sink(mut self, sink: Arc<dyn IntentSink>) -> Self {
        self.intent_sink = Some(sink);
        self
    }

    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Connect and start the inbound pipelines.
    pub async fn start(self) -> SessionResult<(Session, mpsc::UnboundedReceiver<SessionEvent>)> {
        let SessionBuilder {
            config,
            audio_sink,
            intent_sink,
            transcriber,
            synthesizer,
        } = self;

        let client = Arc::new(LiveClient::new(config.live.clone())?);
        let intent_sink: Arc<dyn IntentSink> = match intent_sink {
            Some(sink) => sink,
            None => Arc::new(HttpIntentSink::new(&config.backend)?),
        };
        let transcriber = match (transcriber, &config.transcribe) {
            (Some(transcriber), _) => Some(transcriber),
            (None, Some(transcribe)) => {
                Some(Arc::new(HttpTranscriber::new(transcribe)?) as Arc<dyn Transcriber>)
            }
            (None, None) => None,
        };

        let shutdown = CancellationToken::new();
        let capture_token = shutdown.child_token();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let sink = audio_sink.unwrap_or_else(|| Arc::new(NullSink));
        let playback = Arc::new(PlaybackScheduler::spawn(sink, config.playback.clone()));
        let conversation: Arc<dyn ConversationSink> = client.clone();
        let (gate, outcomes) = IntentGate::new(config.gate.clone(), intent_sink, conversation);

        // subscribe before connecting so no event is missed
        let control = client.subscribe_to(&[
            LiveEventKind::Open,
            LiveEventKind::SetupComplete,
            LiveEventKind::Content,
            LiveEventKind::Interrupted,
            LiveEventKind::TurnComplete,
            LiveEventKind::ToolCall,
            LiveEventKind::ToolCallCancellation,
            LiveEventKind::Close,
        ]);
        let audio = client.subscribe_to(&[
            LiveEventKind::Audio,
            LiveEventKind::Interrupted,
            LiveEventKind::TurnComplete,
        ]);
        let interrupts = Arc::new(InterruptLatch::default());

        let router = tokio::spawn(
            Router {
                playback: playback.clone(),
                gate: gate.clone(),
                events: events_tx.clone(),
                capture_stop: capture_token.clone(),
                interrupts: interrupts.clone(),
                seen: 0,
            }
            .run(control, outcomes, shutdown.clone()),
        );
        let audio_router = tokio::spawn(
            AudioRouter {
                playback: playback.clone(),
                interrupts,
                seen: 0,
            }
            .run(audio, shutdown.clone()),
        );

        let mut session = Session {
            client,
            playback,
            gate,
            transcriber,
            config,
            notifier: None,
            capture: Mutex::new(None),
            forwarders: Mutex::new(Vec::new()),
            routers: Mutex::new(vec![router, audio_router]),
            events: events_tx,
            capture_token,
            shutdown,
        };

        if let Err(e) = session.client.connect().await {
            tracing::error!("Live session failed to start: {}", e);
            session.shutdown().await;
            return Err(e.into());
        }

        if let Some(notifier_config) = session.config.notifier.clone() {
            let announcer = match (notifier_config.mode, synthesizer) {
                (AnnouncementMode::Speech, Some(synth)) => Announcer::Speech(synth),
                (AnnouncementMode::Speech, None) => {
                    tracing::warn!("No speech synthesizer configured, announcing as model input");
                    Announcer::ModelInput(session.client.clone())
                }
                (AnnouncementMode::ModelInput, _) => Announcer::ModelInput(session.client.clone()),
            };
            let spawned = Notifier::spawn(
                notifier_config,
                announcer,
                session.playback.clone(),
                session.shutdown.child_token(),
            );
            let (notifier, mut notifications) = match spawned {
                Ok(spawned) => spawned,
                Err(e) => {
                    session.shutdown().await;
                    return Err(e.into());
                }
            };
            let events = session.events.clone();
            session.forwarders.lock().push(tokio::spawn(async move {
                while let Some(notification) = notifications.recv().await {
                    let _ = events.send(SessionEvent::Notification(notification));
                }
            }));
            session.notifier = Some(notifier);
        }

        tracing::info!("Session started");
        Ok((session, events_rx))
    }
}

/// A running voice session.
pub struct Session {
    client: Arc<LiveClient>,
    playback: Arc<PlaybackScheduler>,
    gate: IntentGate,
    transcriber: Option<Arc<dyn Transcriber>>,
    config: ClientConfig,
    notifier: Option<Notifier>,
    capture: Mutex<Option<CapturePipeline>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    routers: Mutex<Vec<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Cancelled on shutdown or when the connection closes
    capture_token: CancellationToken,
    shutdown: CancellationToken,
}

impl Session {
    pub fn builder(config: ClientConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            audio_sink: None,
            intent_sink: None,
            transcriber: None,
            synthesizer: None,
        }
    }

    pub fn client(&self) -> &Arc<LiveClient> {
        &self.client
    }

    pub fn playback(&self) -> &Arc<PlaybackScheduler> {
        &self.playback
    }

    pub fn gate(&self) -> &IntentGate {
        &self.gate
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start capturing from `source`; audio goes to the live session and
    /// finished segments to the transcriber, if any.
    pub fn start_capture(&self, source: Box<dyn AudioSource>) -> SessionResult<()> {
        let mut capture = self.capture.lock();
        if capture.as_ref().is_some_and(|c| !c.is_finished()) {
            return Err(SessionError::CaptureRunning);
        }

        if self.capture_token.is_cancelled() {
            return Err(SessionError::Live(LiveError::NotConnected));
        }
        let token = self.capture_token.child_token();
        let sender = OutboundSender::spawn(self.client.clone(), token.clone());
        let (pipeline, mut capture_events) = CapturePipeline::spawn(
            source,
            self.config.capture.clone(),
            sender,
            self.transcriber.clone(),
            self.playback.speaking(),
            token,
        )?;

        let events = self.events.clone();
        self.forwarders.lock().push(tokio::spawn(async move {
            while let Some(event) = capture_events.recv().await {
                if matches!(event, CaptureEvent::Level { .. }) {
                    continue;
                }
                let _ = events.send(SessionEvent::Capture(event));
            }
        }));

        *capture = Some(pipeline);
        Ok(())
    }

    /// Wait for the current capture to finish, e.g. at the end of a file.
    pub async fn wait_capture(&self) -> Option<SessionResult<CaptureSummary>> {
        let pipeline = self.capture.lock().take()?;
        Some(pipeline.join().await.map_err(SessionError::from))
    }

    /// Send a completed user text turn.
    pub async fn send_text(&self, text: &str) -> SessionResult<()> {
        self.client.send_text(text, true).await?;
        Ok(())
    }

    /// Wait until remote audio has stayed quiet for `idle`, giving up after
    /// `limit`.
    pub async fn wait_playback_idle(&self, idle: Duration, limit: Duration) {
        let mut speaking = self.playback.speaking();
        let _ = tokio::time::timeout(limit, async {
            loop {
                while *speaking.borrow_and_update() {
                    if speaking.changed().await.is_err() {
                        return;
                    }
                }
                match tokio::time::timeout(idle, speaking.changed()).await {
                    Ok(Ok(())) => continue,
                    _ => return,
                }
            }
        })
        .await;
    }

    /// Tear everything down: capture, playback, notifier, gate and pending
    /// timers are cancelled in one pass, then the connection is closed.
    pub async fn shutdown(&self) -> PlaybackStats {
        self.shutdown.cancel();
        self.gate.shutdown();
        self.playback.shutdown();
        if let Some(notifier) = &self.notifier {
            notifier.stop();
        }
        self.client.disconnect();

        let capture = self.capture.lock().take();
        if let Some(pipeline) = capture {
            let _ = pipeline.join().await;
        }
        self.playback.join().await;

        let routers: Vec<_> = self.routers.lock().drain(..).collect();
        for router in routers {
            let _ = router.await;
        }
        let forwarders: Vec<_> = self.forwarders.lock().drain(..).collect();
        for forwarder in forwarders {
            forwarder.abort();
        }

        let stats = self.playback.stats();
        tracing::info!(
            played = stats.played,
            discarded = stats.discarded,
            intents = self.gate.intents().len(),
            "Session closed"
        );
        stats
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.gate.shutdown();
    }
}

/// Counts interruptions applied to playback. Both routers see every
/// `Interrupted` event; only the first to reach the n-th one applies it.
#[derive(Default)]
struct InterruptLatch {
    applied: AtomicU64,
}

impl InterruptLatch {
    /// Claim interruption number `n` (1-based). True for the first caller.
    fn claim(&self, n: u64) -> bool {
        self.applied.fetch_max(n, Ordering::SeqCst) < n
    }
}

/// Routes control events and gate outcomes. Never waits on playback.
struct Router {
    playback: Arc<PlaybackScheduler>,
    gate: IntentGate,
    events: mpsc::UnboundedSender<SessionEvent>,
    capture_stop: CancellationToken,
    interrupts: Arc<InterruptLatch>,
    seen: u64,
}

impl Router {
    async fn run(
        mut self,
        mut subscription: Subscription,
        mut outcomes: mpsc::UnboundedReceiver<GateOutcome>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(event) => self.route(event).await,
                    None => break,
                },
                Some(outcome) = outcomes.recv() => {
                    let _ = self.events.send(SessionEvent::Intent(outcome));
                }
            }
        }
        tracing::debug!("Session router stopped");
    }

    async fn route(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Open => tracing::debug!("Live socket open"),
            LiveEvent::SetupComplete => tracing::debug!("Live setup complete"),
            LiveEvent::Audio(_) => {}
            LiveEvent::Content(parts) => {
                let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
                if !text.trim().is_empty() {
                    let _ = self.events.send(SessionEvent::Transcript(text));
                }
            }
            LiveEvent::Interrupted => {
                self.seen += 1;
                if self.interrupts.claim(self.seen) {
                    self.playback.interrupt();
                }
                let _ = self.events.send(SessionEvent::Interrupted);
            }
            LiveEvent::TurnComplete => {
                let _ = self.events.send(SessionEvent::TurnComplete);
            }
            LiveEvent::ToolCall(calls) => self.gate.handle_calls(calls).await,
            LiveEvent::ToolCallCancellation(ids) => self.gate.cancel(&ids),
            LiveEvent::Close { reason } => {
                // a dead connection has nowhere to send capture audio
                self.capture_stop.cancel();
                let _ = self.events.send(SessionEvent::Closed { reason });
            }
        }
    }
}

/// Feeds model audio into playback, in stream order with the turn
/// boundaries, so audio from an interrupted turn is never replayed.
struct AudioRouter {
    playback: Arc<PlaybackScheduler>,
    interrupts: Arc<InterruptLatch>,
    seen: u64,
}

impl AudioRouter {
    async fn run(mut self, mut subscription: Subscription, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match event {
                LiveEvent::Audio(chunk) => {
                    let enqueued = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.playback.enqueue(chunk) => result,
                    };
                    if let Err(e) = enqueued {
                        tracing::warn!("Dropping model audio: {}", e);
                    }
                }
                LiveEvent::Interrupted => {
                    self.seen += 1;
                    if self.interrupts.claim(self.seen) {
                        self.playback.interrupt();
                    }
                }
                LiveEvent::TurnComplete => self.playback.turn_complete(),
                _ => {}
            }
        }
        tracing::debug!("Audio router stopped");
    }
}
