//! Sample sources for the capture pipeline.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::CaptureError;

/// A stream of mono PCM16 samples.
#[async_trait]
pub trait AudioSource: Send {
    /// Sample rate of the stream (Hz).
    fn sample_rate(&self) -> u32;

    /// Next block of up to `block_size` samples; `None` at end of stream.
    async fn next_block(&mut self, block_size: usize) -> Result<Option<Vec<i16>>, CaptureError>;
}

/// In-memory samples, optionally paced in real time.
pub struct BufferSource {
    samples: Vec<i16>,
    position: usize,
    sample_rate: u32,
    pacer: Option<Pacer>,
}

impl BufferSource {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
            pacer: None,
        }
    }

    /// Release blocks no faster than they would be captured.
    pub fn realtime(mut self) -> Self {
        self.pacer = Some(Pacer::new());
        self
    }
}

#[async_trait]
impl AudioSource for BufferSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_block(&mut self, block_size: usize) -> Result<Option<Vec<i16>>, CaptureError> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.position + block_size).min(self.samples.len());
        let block = self.samples[self.position..end].to_vec();
        self.position = end;

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait(block.len(), self.sample_rate).await;
        }
        Ok(Some(block))
    }
}

/// Reads a WAV file as if it were a microphone.
///
/// Multi-channel files are down-mixed to mono; the sample rate must match
/// the capture rate, since no resampling is done.
pub struct WavFileSource {
    inner: BufferSource,
}

impl WavFileSource {
    pub fn open(path: impl AsRef<Path>, expected_rate: u32) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| CaptureError::Source(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();

        if spec.sample_rate != expected_rate {
            return Err(CaptureError::Source(format!(
                "{} is {} Hz, expected {} Hz",
                path.display(),
                spec.sample_rate,
                expected_rate
            )));
        }
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(CaptureError::Source(format!(
                "{} must be 16-bit PCM",
                path.display()
            )));
        }

        let interleaved = reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CaptureError::Source(e.to_string()))?;

        let channels = usize::from(spec.channels.max(1));
        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                    (sum / frame.len() as i32) as i16
                })
                .collect()
        };

        tracing::debug!(
            path = %path.display(),
            samples = samples.len(),
            channels = spec.channels,
            "Opened WAV capture source"
        );

        Ok(Self {
            inner: BufferSource::new(samples, spec.sample_rate),
        })
    }

    pub fn realtime(mut self) -> Self {
        self.inner = self.inner.realtime();
        self
    }
}

#[async_trait]
impl AudioSource for WavFileSource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    async fn next_block(&mut self, block_size: usize) -> Result<Option<Vec<i16>>, CaptureError> {
        self.inner.next_block(block_size).await
    }
}

/// Spaces blocks by their playback duration.
struct Pacer {
    next: Option<Instant>,
}

impl Pacer {
    fn new() -> Self {
        Self { next: None }
    }

    async fn wait(&mut self, samples: usize, sample_rate: u32) {
        let now = Instant::now();
        let due = *self.next.get_or_insert(now);
        if due > now {
            tokio::time::sleep_until(due).await;
        }
        let step = Duration::from_micros(samples as u64 * 1_000_000 / u64::from(sample_rate.max(1)));
        self.next = Some(due.max(now) + step);
    }
}
