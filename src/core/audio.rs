//! Shared audio types.
//!
//! Audio moves through the crate as PCM 16-bit signed little-endian mono.
//! The capture side runs at 16 kHz; the model answers at the rate advertised
//! in the part's MIME type (24 kHz for the native audio models).

use bytes::Bytes;
use std::time::Duration;

/// Sample rate used for microphone capture and outbound audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate assumed for inbound audio when the MIME type carries none.
pub const DEFAULT_PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Bytes per PCM16 sample.
const BYTES_PER_SAMPLE: usize = 2;

/// A chunk of raw PCM16LE mono audio.
///
/// Chunks are cheap to clone (`Bytes` is reference counted) and are never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Raw audio bytes (PCM 16-bit, mono, little-endian)
    pub data: Bytes,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Wrap already-encoded PCM bytes.
    pub fn new(data: impl Into<Bytes>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            sample_rate,
        }
    }

    /// Encode i16 samples into a chunk.
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let mut data = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(data, sample_rate)
    }

    /// Decode the chunk back into i16 samples. A trailing odd byte is ignored.
    pub fn samples(&self) -> Vec<i16> {
        self.data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    /// Number of whole samples in the chunk.
    pub fn sample_count(&self) -> usize {
        self.data.len() / BYTES_PER_SAMPLE
    }

    /// Playback duration of the chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.sample_count() as u64 * 1_000_000 / u64::from(self.sample_rate))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// MIME type used on the wire for this chunk.
    pub fn mime_type(&self) -> String {
        pcm_mime_type(self.sample_rate)
    }
}

/// MIME type for raw PCM at the given rate, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Whether a MIME type denotes audio content.
pub fn is_audio_mime(mime_type: &str) -> bool {
    mime_type.trim_start().to_ascii_lowercase().starts_with("audio/")
}

/// Extract the `rate=` parameter from a MIME type, falling back to `default`.
pub fn sample_rate_from_mime(mime_type: &str, default: u32) -> u32 {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(default)
}
