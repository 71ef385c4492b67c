//! Microphone capture: level metering, voice-activity segmentation and the
//! outbound realtime sender.

mod pipeline;
mod segmenter;
mod sender;
mod source;

pub use pipeline::{CaptureEvent, CapturePipeline, CaptureSummary};
pub use segmenter::{
    BlockOutcome, CaptureConfig, CaptureSegmenter, DEFAULT_BLOCK_SIZE, DEFAULT_SILENCE_THRESHOLD,
    DEFAULT_SILENCE_TIMEOUT_MS, DEFAULT_START_THRESHOLD, SpeechSegment, VadState, VadTransition,
    block_level,
};
pub use sender::{OutboundSender, RealtimeInput, SenderStats};
pub use source::{AudioSource, BufferSource, WavFileSource};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Invalid capture configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Audio source error: {0}")]
    Source(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The outbound sender task has stopped
    #[error("Outbound sender closed")]
    SenderClosed,
}
