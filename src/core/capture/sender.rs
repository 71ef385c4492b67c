//! Outbound chunk sender.
//!
//! Capture blocks are handed over without waiting and written to the live
//! session, in order, by a dedicated task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::CaptureError;
use crate::core::audio::AudioChunk;
use crate::core::live::{LiveClient, LiveError, LiveResult};

/// Anything that accepts `realtimeInput` audio.
#[async_trait]
pub trait RealtimeInput: Send + Sync {
    async fn send_realtime_input(&self, chunks: &[AudioChunk]) -> LiveResult<()>;
}

#[async_trait]
impl RealtimeInput for LiveClient {
    async fn send_realtime_input(&self, chunks: &[AudioChunk]) -> LiveResult<()> {
        LiveClient::send_realtime_input(self, chunks).await
    }
}

/// Forwards capture blocks to the live session one frame per block.
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<AudioChunk>,
    sent: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl OutboundSender {
    pub fn spawn(transport: Arc<dyn RealtimeInput>, shutdown: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AudioChunk>();
        let sent = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));

        let sent_count = sent.clone();
        let dropped_count = dropped.clone();
        let handle = tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    chunk = rx.recv() => match chunk {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };

                match transport.send_realtime_input(std::slice::from_ref(&chunk)).await {
                    Ok(()) => {
                        sent_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(LiveError::NotConnected) => {
                        dropped_count.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!("Dropping capture block, session not connected");
                    }
                    Err(e) => {
                        dropped_count.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Failed to send capture block: {}", e);
                    }
                }
            }
            tracing::debug!("Outbound sender stopped");
        });

        Self {
            tx,
            sent,
            dropped,
            handle,
        }
    }

    /// Queue a block for transmission. Never waits.
    pub fn forward(&self, chunk: AudioChunk) -> Result<(), CaptureError> {
        self.tx.send(chunk).map_err(|_| CaptureError::SenderClosed)
    }

    /// Blocks written to the session.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Blocks that could not be written.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and wait until queued blocks have been handled.
    pub async fn close(self) -> SenderStats {
        drop(self.tx);
        let _ = self.handle.await;
        SenderStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Final sender counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub sent: u64,
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<Vec<AudioChunk>>>,
        fail: bool,
    }

    #[async_trait]
    impl RealtimeInput for Recorder {
        async fn send_realtime_input(&self, chunks: &[AudioChunk]) -> LiveResult<()> {
            if self.fail {
                return Err(LiveError::NotConnected);
            }
            self.frames.lock().push(chunks.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blocks_sent_in_order_one_per_frame() {
        let recorder = Arc::new(Recorder::default());
        let sender = OutboundSender::spawn(recorder.clone(), CancellationToken::new());

        for value in 0..5i16 {
            sender
                .forward(AudioChunk::from_samples(&[value; 8], 16000))
                .unwrap();
        }
        sender.close().await;

        let frames = recorder.frames.lock();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.len(), 1);
            assert_eq!(frame[0].samples()[0], i as i16);
            assert_eq!(frame[0].mime_type(), "audio/pcm;rate=16000");
        }
    }

    #[tokio::test]
    async fn test_not_connected_blocks_are_counted() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let sender = OutboundSender::spawn(recorder, CancellationToken::new());
        sender.forward(AudioChunk::from_samples(&[1], 16000)).unwrap();

        let stats = sender.close().await;
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.sent, 0);
    }

    #[tokio::test]
    async fn test_forward_after_shutdown_fails() {
        let shutdown = CancellationToken::new();
        let sender = OutboundSender::spawn(Arc::new(Recorder::default()), shutdown.clone());
        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !sender.tx.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(
            sender.forward(AudioChunk::from_samples(&[1], 16000)),
            Err(CaptureError::SenderClosed)
        ));
    }
}
