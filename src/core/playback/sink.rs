//! Audio output sinks.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::core::audio::AudioChunk;

/// Errors raised by audio sinks.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The output device or file could not be opened
    #[error("Audio sink unavailable: {0}")]
    SinkUnavailable(String),

    /// Writing audio failed
    #[error("Audio write failed: {0}")]
    WriteFailed(String),

    /// The scheduler has been shut down
    #[error("Playback scheduler closed")]
    Closed,
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Destination for inbound model audio.
///
/// `initialize` is awaited once before the first chunk is played. `halt`
/// stops whatever is currently sounding; it is called on interruption.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn initialize(&self) -> PlaybackResult<()>;

    async fn play(&self, chunk: &AudioChunk) -> PlaybackResult<()>;

    async fn halt(&self);
}

/// Discards all audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn initialize(&self) -> PlaybackResult<()> {
        Ok(())
    }

    async fn play(&self, _chunk: &AudioChunk) -> PlaybackResult<()> {
        Ok(())
    }

    async fn halt(&self) {}
}

/// Keeps played chunks in memory. Useful for inspecting what a session
/// would have played.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    played: Arc<Mutex<Vec<AudioChunk>>>,
    halts: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<AudioChunk> {
        self.played.lock().clone()
    }

    pub fn halt_count(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for MemorySink {
    async fn initialize(&self) -> PlaybackResult<()> {
        Ok(())
    }

    async fn play(&self, chunk: &AudioChunk) -> PlaybackResult<()> {
        self.played.lock().push(chunk.clone());
        Ok(())
    }

    async fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Writes played audio to a 16-bit mono WAV file.
pub struct WavFileSink {
    path: PathBuf,
    sample_rate: u32,
    writer: Mutex<Option<hound::WavWriter<BufWriter<File>>>>,
}

impl WavFileSink {
    pub fn new(path: impl AsRef<Path>, sample_rate: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sample_rate,
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the WAV header sizes and close the file.
    pub fn finalize(&self) -> PlaybackResult<()> {
        match self.writer.lock().take() {
            Some(writer) => writer
                .finalize()
                .map_err(|e| PlaybackError::WriteFailed(e.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AudioSink for WavFileSink {
    async fn initialize(&self) -> PlaybackResult<()> {
        let mut writer = self.writer.lock();
        if writer.is_some() {
            return Ok(());
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let created = hound::WavWriter::create(&self.path, spec)
            .map_err(|e| PlaybackError::SinkUnavailable(format!("{}: {e}", self.path.display())))?;
        *writer = Some(created);

        tracing::debug!(
            path = %self.path.display(),
            sample_rate = self.sample_rate,
            "WAV playback sink initialized"
        );
        Ok(())
    }

    async fn play(&self, chunk: &AudioChunk) -> PlaybackResult<()> {
        if chunk.sample_rate != self.sample_rate {
            tracing::warn!(
                expected = self.sample_rate,
                actual = chunk.sample_rate,
                "Chunk sample rate differs from sink rate"
            );
        }

        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| PlaybackError::SinkUnavailable("sink not initialized".to_string()))?;
        for sample in chunk.samples() {
            writer
                .write_sample(sample)
                .map_err(|e| PlaybackError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn halt(&self) {
        if let Some(writer) = self.writer.lock().as_mut()
            && let Err(e) = writer.flush()
        {
            tracing::warn!("Failed to flush WAV sink: {}", e);
        }
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!("Failed to finalize WAV sink: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_wav_sink_writes_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let sink = WavFileSink::new(&path, 24000);

        sink.initialize().await.unwrap();
        sink.play(&AudioChunk::from_samples(&[1, -2, 3], 24000))
            .await
            .unwrap();
        sink.play(&AudioChunk::from_samples(&[4], 24000)).await.unwrap();
        sink.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 24000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -2, 3, 4]);
    }

    #[tokio::test]
    async fn test_play_before_initialize_fails() {
        let dir = tempdir().unwrap();
        let sink = WavFileSink::new(dir.path().join("x.wav"), 24000);
        let result = sink.play(&AudioChunk::from_samples(&[0], 24000)).await;
        assert!(matches!(result, Err(PlaybackError::SinkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_memory_sink_records() {
        let sink = MemorySink::new();
        sink.play(&AudioChunk::from_samples(&[7], 24000)).await.unwrap();
        sink.halt().await;
        assert_eq!(sink.played().len(), 1);
        assert_eq!(sink.halt_count(), 1);
    }
}
