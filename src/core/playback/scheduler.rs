//! Paced playback of inbound model audio.
//!
//! Chunks are queued in a bounded channel and drained one at a time by a
//! background task, with a short delay between chunks. Every queued chunk is
//! tagged with the interruption epoch current at enqueue time; an interrupt
//! bumps the epoch so that everything already queued is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::sink::{AudioSink, PlaybackError, PlaybackResult};
use crate::core::audio::AudioChunk;

/// Default bound on queued chunks.
pub const DEFAULT_MAX_QUEUED_CHUNKS: usize = 256;

/// Default pause between consecutive chunks (ms).
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 20;

/// Default time without audio before the speaking flag clears (ms).
pub const DEFAULT_SPEAKING_TIMEOUT_MS: u64 = 500;

/// Playback tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Capacity of the chunk queue; producers wait when it is full
    pub max_queued_chunks: usize,
    /// Delay after each played chunk (ms)
    pub chunk_delay_ms: u64,
    /// Silence after which the remote is no longer considered speaking (ms)
    pub speaking_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_queued_chunks: DEFAULT_MAX_QUEUED_CHUNKS,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            speaking_timeout_ms: DEFAULT_SPEAKING_TIMEOUT_MS,
        }
    }
}

impl PlaybackConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn speaking_timeout(&self) -> Duration {
        Duration::from_millis(self.speaking_timeout_ms)
    }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackStats {
    pub played: u64,
    pub discarded: u64,
}

struct Queued {
    epoch: u64,
    chunk: AudioChunk,
}

struct Shared {
    epoch: AtomicU64,
    /// Set by interrupt, cleared by turn completion
    discarding: AtomicBool,
    interrupt: Notify,
    paused: watch::Sender<bool>,
    speaking: watch::Sender<bool>,
    played: AtomicU64,
    discarded: AtomicU64,
}

impl Shared {
    fn discard(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }
}

/// Handle to the playback drain task.
pub struct PlaybackScheduler {
    tx: mpsc::Sender<Queued>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackScheduler {
    /// Start the drain task for `sink`.
    pub fn spawn(sink: Arc<dyn AudioSink>, config: PlaybackConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.max_queued_chunks.max(1));
        let (paused, _) = watch::channel(false);
        let (speaking, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            epoch: AtomicU64::new(0),
            discarding: AtomicBool::new(false),
            interrupt: Notify::new(),
            paused,
            speaking,
            played: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        });
        let shutdown = CancellationToken::new();

        let drain = Drain {
            sink,
            rx,
            shared: shared.clone(),
            shutdown: shutdown.clone(),
            chunk_delay: config.chunk_delay(),
            speaking_timeout: config.speaking_timeout(),
            seen_epoch: 0,
            last_played: None,
        };
        let handle = tokio::spawn(drain.run());

        Self {
            tx,
            shared,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue a chunk for playback.
    ///
    /// Waits while the queue is full. Returns `Ok(false)` when the chunk was
    /// dropped because an interrupted turn has not completed yet, including
    /// when an interrupt arrives while waiting for room.
    pub async fn enqueue(&self, chunk: AudioChunk) -> PlaybackResult<bool> {
        let interrupted = self.shared.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();

        if self.shared.discarding.load(Ordering::SeqCst) {
            self.shared.discard(1);
            tracing::trace!("Dropping chunk from interrupted turn");
            return Ok(false);
        }

        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        tokio::select! {
            biased;
            _ = &mut interrupted => {
                self.shared.discard(1);
                Ok(false)
            }
            sent = self.tx.send(Queued { epoch, chunk }) => {
                sent.map_err(|_| PlaybackError::Closed)?;
                Ok(true)
            }
        }
    }

    /// Drop queued audio, stop the sink and ignore new chunks until
    /// [`turn_complete`](Self::turn_complete).
    pub fn interrupt(&self) {
        self.shared.discarding.store(true, Ordering::SeqCst);
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.interrupt.notify_waiters();
        tracing::debug!(epoch, "Playback interrupted");
    }

    /// Accept audio again after an interruption.
    pub fn turn_complete(&self) {
        if self.shared.discarding.swap(false, Ordering::SeqCst) {
            tracing::debug!("Playback accepting audio again");
        }
    }

    /// Stop draining without discarding queued chunks.
    pub fn pause(&self) {
        self.shared.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.shared.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// Whether remote audio has been played within the speaking timeout.
    pub fn is_speaking(&self) -> bool {
        *self.shared.speaking.borrow()
    }

    /// Watch the speaking flag.
    pub fn speaking(&self) -> watch::Receiver<bool> {
        self.shared.speaking.subscribe()
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            played: self.shared.played.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }

    /// Stop the drain task. Queued chunks are dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Stop the drain task and wait for it to exit.
    pub async fn join(&self) {
        self.shutdown.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// =============================================================================
// Drain Task
// =============================================================================

enum Wake {
    Shutdown,
    Interrupted,
    Chunk(Queued),
    SpeakingExpired,
}

struct Drain {
    sink: Arc<dyn AudioSink>,
    rx: mpsc::Receiver<Queued>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    chunk_delay: Duration,
    speaking_timeout: Duration,
    seen_epoch: u64,
    last_played: Option<Instant>,
}

impl Drain {
    async fn run(mut self) {
        let initialized = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            result = self.sink.initialize() => result,
        };
        if let Err(e) = initialized {
            tracing::error!("Audio sink failed to initialize: {}", e);
            return;
        }
        tracing::debug!("Playback drain started");

        let shared = self.shared.clone();
        let mut paused = shared.paused.subscribe();

        loop {
            let interrupted = shared.interrupt.notified();
            tokio::pin!(interrupted);

            self.halt_if_interrupted().await;

            let speaking_deadline = self.last_played.map(|t| t + self.speaking_timeout);
            let wake = tokio::select! {
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                _ = &mut interrupted => Wake::Interrupted,
                _ = sleep_until_opt(speaking_deadline) => Wake::SpeakingExpired,
                item = self.rx.recv() => match item {
                    Some(item) => Wake::Chunk(item),
                    None => Wake::Shutdown,
                },
            };

            let item = match wake {
                Wake::Shutdown => break,
                Wake::Interrupted => continue,
                Wake::SpeakingExpired => {
                    self.set_speaking(false);
                    self.last_played = None;
                    continue;
                }
                Wake::Chunk(item) => item,
            };

            // Hold the chunk while paused.
            let mut interrupted_while_paused = false;
            while *paused.borrow_and_update() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = &mut interrupted => {
                        interrupted_while_paused = true;
                        break;
                    }
                    changed = paused.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            if interrupted_while_paused || item.epoch != self.shared.epoch.load(Ordering::SeqCst) {
                self.shared.discard(1);
                continue;
            }

            tokio::select! {
                _ = &mut interrupted => {
                    self.shared.discard(1);
                    continue;
                }
                result = self.sink.play(&item.chunk) => {
                    if let Err(e) = result {
                        tracing::warn!("Failed to play chunk: {}", e);
                        continue;
                    }
                }
            }

            self.shared.played.fetch_add(1, Ordering::Relaxed);
            self.last_played = Some(Instant::now());
            self.set_speaking(true);

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = &mut interrupted => {}
                _ = tokio::time::sleep(self.chunk_delay) => {}
            }
        }

        tracing::debug!("Playback drain stopped");
    }

    /// Halt the sink once per observed interruption. Stale chunks still in
    /// the queue are skipped as they are received.
    async fn halt_if_interrupted(&mut self) {
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        if epoch == self.seen_epoch {
            return;
        }
        self.seen_epoch = epoch;

        self.sink.halt().await;
        self.last_played = None;
        self.set_speaking(false);
        tracing::debug!(epoch, "Playback halted");
    }

    fn set_speaking(&self, speaking: bool) {
        self.shared.speaking.send_if_modified(|current| {
            if *current == speaking {
                false
            } else {
                *current = speaking;
                true
            }
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
