//! Capture task: source → segmenter → {outbound sender, transcription}.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    AudioSource, CaptureConfig, CaptureError, CaptureSegmenter, OutboundSender, SpeechSegment,
    VadTransition,
};
use crate::core::transcribe::Transcriber;

/// Observable capture activity.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Per-block level and smoothed meter value
    Level { level: f32, meter: f32 },
    SpeechStarted,
    SpeechEnded { segment_id: Uuid, duration: Duration },
    Transcribed {
        segment_id: Uuid,
        text: String,
        browser_query: bool,
    },
    TranscriptionFailed { segment_id: Uuid, error: String },
}

/// Totals reported when the capture task ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub blocks: u64,
    pub segments: u64,
    pub sent: u64,
    pub dropped: u64,
}

/// Running capture task.
pub struct CapturePipeline {
    handle: JoinHandle<Result<CaptureSummary, CaptureError>>,
    shutdown: CancellationToken,
}

impl CapturePipeline {
    /// Start reading `source` until it is exhausted or `shutdown` fires.
    pub fn spawn(
        mut source: Box<dyn AudioSource>,
        config: CaptureConfig,
        sender: OutboundSender,
        transcriber: Option<Arc<dyn Transcriber>>,
        remote_speaking: watch::Receiver<bool>,
        shutdown: CancellationToken,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CaptureEvent>), CaptureError> {
        if source.sample_rate() != config.sample_rate {
            return Err(CaptureError::InvalidConfiguration(format!(
                "source rate {} Hz does not match capture rate {} Hz",
                source.sample_rate(),
                config.sample_rate
            )));
        }
        let segmenter = CaptureSegmenter::new(config)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let worker = CaptureWorker {
                segmenter,
                sender,
                transcriber,
                remote_speaking,
                events: events_tx,
                transcriptions: JoinSet::new(),
                summary: CaptureSummary::default(),
            };
            worker.run(source.as_mut(), token).await
        });

        Ok((Self { handle, shutdown }, events_rx))
    }

    /// Stop capturing; pending transcriptions are abandoned.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the capture task to end.
    pub async fn join(self) -> Result<CaptureSummary, CaptureError> {
        self.handle
            .await
            .map_err(|e| CaptureError::Source(format!("capture task failed: {e}")))?
    }
}

struct CaptureWorker {
    segmenter: CaptureSegmenter,
    sender: OutboundSender,
    transcriber: Option<Arc<dyn Transcriber>>,
    remote_speaking: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<CaptureEvent>,
    transcriptions: JoinSet<()>,
    summary: CaptureSummary,
}

impl CaptureWorker {
    async fn run(
        mut self,
        source: &mut dyn AudioSource,
        shutdown: CancellationToken,
    ) -> Result<CaptureSummary, CaptureError> {
        let block_size = self.segmenter.config().block_size;
        tracing::info!(block_size, "Capture started");

        let result = loop {
            let block = tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                block = source.next_block(block_size) => block,
            };

            match block {
                Ok(Some(samples)) => {
                    if let Err(e) = self.on_block(&samples) {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    if let Some(segment) = self.segmenter.finish() {
                        self.on_segment(segment);
                    }
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        if shutdown.is_cancelled() {
            self.transcriptions.abort_all();
        }
        while self.transcriptions.join_next().await.is_some() {}

        let stats = self.sender.close().await;
        self.summary.sent = stats.sent;
        self.summary.dropped = stats.dropped;

        match result {
            Ok(()) => {
                tracing::info!(
                    blocks = self.summary.blocks,
                    segments = self.summary.segments,
                    sent = self.summary.sent,
                    "Capture finished"
                );
                Ok(self.summary)
            }
            Err(e) => {
                tracing::error!("Capture stopped: {}", e);
                Err(e)
            }
        }
    }

    fn on_block(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        self.summary.blocks += 1;
        let remote_speaking = *self.remote_speaking.borrow();
        let outcome = self
            .segmenter
            .process_block(samples, Instant::now(), remote_speaking);

        self.emit(CaptureEvent::Level {
            level: outcome.level,
            meter: outcome.meter,
        });
        if outcome.transition == Some(VadTransition::SpeechStarted) {
            self.emit(CaptureEvent::SpeechStarted);
        }
        if let Some(chunk) = outcome.forward {
            self.sender.forward(chunk)?;
        }
        if let Some(segment) = outcome.flushed {
            self.on_segment(segment);
        }
        Ok(())
    }

    fn on_segment(&mut self, segment: SpeechSegment) {
        self.summary.segments += 1;
        self.emit(CaptureEvent::SpeechEnded {
            segment_id: segment.id,
            duration: segment.duration(),
        });

        let Some(transcriber) = self.transcriber.clone() else {
            return;
        };
        let events = self.events.clone();
        self.transcriptions.spawn(async move {
            let event = transcribe_segment(transcriber.as_ref(), &segment).await;
            let _ = events.send(event);
        });
    }

    fn emit(&self, event: CaptureEvent) {
        // receiver may be gone; capture keeps running regardless
        let _ = self.events.send(event);
    }
}

async fn transcribe_segment(transcriber: &dyn Transcriber, segment: &SpeechSegment) -> CaptureEvent {
    let segment_id = segment.id;
    let text = match transcriber.transcribe(segment).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(segment = %segment_id, "Transcription failed: {}", e);
            return CaptureEvent::TranscriptionFailed {
                segment_id,
                error: e.to_string(),
            };
        }
    };

    if text.is_empty() {
        return CaptureEvent::Transcribed {
            segment_id,
            text,
            browser_query: false,
        };
    }

    let browser_query = match transcriber.classify(&text).await {
        Ok(label) => label.is_browser_query(),
        Err(e) => {
            tracing::warn!(segment = %segment_id, "Classification failed: {}", e);
            false
        }
    };

    CaptureEvent::Transcribed {
        segment_id,
        text,
        browser_query,
    }
}
