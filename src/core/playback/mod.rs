//! Inbound audio playback.
//!
//! [`PlaybackScheduler`] paces model audio into an [`AudioSink`], honouring
//! interruptions from the live session and pause requests from the
//! notification side channel.

mod scheduler;
mod sink;

pub use scheduler::{
    DEFAULT_CHUNK_DELAY_MS, DEFAULT_MAX_QUEUED_CHUNKS, DEFAULT_SPEAKING_TIMEOUT_MS, PlaybackConfig,
    PlaybackScheduler, PlaybackStats,
};
pub use sink::{AudioSink, MemorySink, NullSink, PlaybackError, PlaybackResult, WavFileSink};
