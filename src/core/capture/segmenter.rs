//! Level metering and voice-activity segmentation.
//!
//! The segmenter is a synchronous state machine driven by fixed-size sample
//! blocks and their capture timestamps. It never sleeps; the silence timeout
//! is measured between block timestamps.

use std::io::Cursor;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::CaptureError;
use crate::core::audio::{AudioChunk, CAPTURE_SAMPLE_RATE};

/// Default samples per block (32ms at 16kHz).
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Default level that starts a speech segment.
pub const DEFAULT_START_THRESHOLD: f32 = 0.05;

/// Default level at or below which a block counts as silence.
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.03;

/// Default silence duration that ends a segment (ms).
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 1500;

/// EMA factor for the UI level meter.
const METER_SMOOTHING: f32 = 0.7;

/// Capture and VAD tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sample rate of the microphone stream (Hz)
    pub sample_rate: u32,
    /// Samples per processed block
    pub block_size: usize,
    /// Level (0.0 - 1.0) above which silence turns into speech
    pub start_threshold: f32,
    /// Level (0.0 - 1.0) at or below which speech counts as silent
    pub silence_threshold: f32,
    /// Continuous silence that ends a segment (ms)
    pub silence_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            start_threshold: DEFAULT_START_THRESHOLD,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            silence_timeout_ms: DEFAULT_SILENCE_TIMEOUT_MS,
        }
    }
}

impl CaptureConfig {
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    /// Playback duration of one block.
    pub fn block_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.block_size as u64 * 1_000_000 / u64::from(self.sample_rate))
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.block_size == 0 || self.sample_rate == 0 {
            return Err(CaptureError::InvalidConfiguration(
                "block_size and sample_rate must be non-zero".to_string(),
            ));
        }
        for (name, value) in [
            ("start_threshold", self.start_threshold),
            ("silence_threshold", self.silence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CaptureError::InvalidConfiguration(format!(
                    "{name} must be within 0.0-1.0, got {value}"
                )));
            }
        }
        if self.silence_threshold > self.start_threshold {
            return Err(CaptureError::InvalidConfiguration(
                "silence_threshold must not exceed start_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// RMS level of a block, normalised to 0.0 - 1.0.
pub fn block_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_squares / samples.len() as f64).sqrt();
    (rms / 32768.0).min(1.0) as f32
}

// =============================================================================
// Speech Segment
// =============================================================================

/// Audio captured between a voice start and the matching voice end.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub id: Uuid,
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl SpeechSegment {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / u64::from(self.sample_rate))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Merged PCM16LE audio.
    pub fn to_chunk(&self) -> AudioChunk {
        AudioChunk::from_samples(&self.samples, self.sample_rate)
    }

    /// Encode as a 16-bit mono WAV file.
    pub fn to_wav(&self) -> Result<Vec<u8>, CaptureError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| CaptureError::Encoding(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        }
        Ok(cursor.into_inner())
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Voice-activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadState {
    #[default]
    Silent,
    Speaking,
}

/// Edge produced by a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    SpeechStarted,
    SpeechEnded,
}

/// Result of processing one block.
#[derive(Debug, Default)]
pub struct BlockOutcome {
    /// Raw block level (0.0 - 1.0)
    pub level: f32,
    /// Smoothed level for metering
    pub meter: f32,
    pub transition: Option<VadTransition>,
    /// Block to transmit right away, if any
    pub forward: Option<AudioChunk>,
    /// Completed segment, if this block ended one
    pub flushed: Option<SpeechSegment>,
}

/// Turns a sample stream into speech segments.
#[derive(Debug)]
pub struct CaptureSegmenter {
    config: CaptureConfig,
    state: VadState,
    meter: f32,
    /// Start of the current quiet run while speaking
    silence_since: Option<Instant>,
    accumulator: Vec<i16>,
    segment_id: Uuid,
    flushed_segments: u64,
}

impl CaptureSegmenter {
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            config,
            state: VadState::Silent,
            meter: 0.0,
            silence_since: None,
            accumulator: Vec::new(),
            segment_id: Uuid::new_v4(),
            flushed_segments: 0,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == VadState::Speaking
    }

    /// Samples accumulated for the current segment.
    pub fn accumulated(&self) -> usize {
        self.accumulator.len()
    }

    pub fn flushed_segments(&self) -> u64 {
        self.flushed_segments
    }

    /// Process one block captured at `now`.
    ///
    /// While `remote_speaking` is set the level is still metered, but the
    /// block is neither accumulated nor forwarded and cannot start a segment.
    pub fn process_block(
        &mut self,
        samples: &[i16],
        now: Instant,
        remote_speaking: bool,
    ) -> BlockOutcome {
        let level = block_level(samples);
        self.meter = METER_SMOOTHING * self.meter + (1.0 - METER_SMOOTHING) * level;

        let mut outcome = BlockOutcome {
            level,
            meter: self.meter,
            ..Default::default()
        };

        match self.state {
            VadState::Silent => {
                if remote_speaking || level <= self.config.start_threshold {
                    return outcome;
                }
                tracing::debug!(level, "Speech started");
                self.state = VadState::Speaking;
                self.silence_since = None;
                outcome.transition = Some(VadTransition::SpeechStarted);
            }
            VadState::Speaking => {
                if level > self.config.silence_threshold {
                    self.silence_since = None;
                } else {
                    let since = *self.silence_since.get_or_insert(now);
                    if now.saturating_duration_since(since) >= self.config.silence_timeout() {
                        outcome.transition = Some(VadTransition::SpeechEnded);
                        outcome.flushed = self.flush();
                        return outcome;
                    }
                }
            }
        }

        if !remote_speaking {
            self.accumulator.extend_from_slice(samples);
            outcome.forward = Some(AudioChunk::from_samples(samples, self.config.sample_rate));
        }
        outcome
    }

    /// End any open segment, e.g. when the source is exhausted.
    pub fn finish(&mut self) -> Option<SpeechSegment> {
        if self.state == VadState::Speaking {
            self.flush()
        } else {
            None
        }
    }

    fn flush(&mut self) -> Option<SpeechSegment> {
        self.state = VadState::Silent;
        self.silence_since = None;
        let samples = std::mem::take(&mut self.accumulator);
        let id = std::mem::replace(&mut self.segment_id, Uuid::new_v4());
        if samples.is_empty() {
            return None;
        }

        self.flushed_segments += 1;
        let segment = SpeechSegment {
            id,
            sample_rate: self.config.sample_rate,
            samples,
        };
        tracing::debug!(
            segment = %segment.id,
            duration_ms = segment.duration().as_millis() as u64,
            "Speech segment flushed"
        );
        Some(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_MS: u64 = 32;

    fn block_at(level: f32) -> Vec<i16> {
        vec![(level * 32768.0) as i16; DEFAULT_BLOCK_SIZE]
    }

    fn segmenter() -> CaptureSegmenter {
        CaptureSegmenter::new(CaptureConfig::default()).unwrap()
    }

    #[test]
    fn test_block_level() {
        assert_eq!(block_level(&[]), 0.0);
        assert_eq!(block_level(&[0; 16]), 0.0);
        let level = block_level(&block_at(0.12));
        assert!((level - 0.12).abs() < 0.001);
        assert!((block_level(&[i16::MIN; 4]) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_speech_then_silence_flushes_once() {
        let mut vad = segmenter();
        let start = Instant::now();
        let mut t = start;
        let mut flushes = Vec::new();

        // 10 loud blocks at 12%
        for i in 0..10 {
            let out = vad.process_block(&block_at(0.12), t, false);
            if i == 0 {
                assert_eq!(out.transition, Some(VadTransition::SpeechStarted));
            }
            assert!(out.forward.is_some());
            t += Duration::from_millis(BLOCK_MS);
        }
        assert!(vad.is_speaking());

        // 2% for well over 1500ms
        for _ in 0..80 {
            let out = vad.process_block(&block_at(0.02), t, false);
            if let Some(segment) = out.flushed {
                assert_eq!(out.transition, Some(VadTransition::SpeechEnded));
                flushes.push((segment, t));
            }
            t += Duration::from_millis(BLOCK_MS);
        }

        assert_eq!(flushes.len(), 1);
        let (segment, flushed_at) = &flushes[0];
        let silence_started = start + Duration::from_millis(10 * BLOCK_MS);
        assert!(*flushed_at - silence_started >= Duration::from_millis(1500));
        assert!(segment.samples.len() >= 10 * DEFAULT_BLOCK_SIZE);
        assert_eq!(vad.accumulated(), 0);
        assert_eq!(vad.state(), VadState::Silent);
    }

    #[test]
    fn test_brief_pause_does_not_flush() {
        let mut vad = segmenter();
        let mut t = Instant::now();

        vad.process_block(&block_at(0.12), t, false);
        for _ in 0..20 {
            t += Duration::from_millis(BLOCK_MS);
            assert!(vad.process_block(&block_at(0.01), t, false).flushed.is_none());
        }
        t += Duration::from_millis(BLOCK_MS);
        vad.process_block(&block_at(0.04), t, false);
        assert!(vad.is_speaking());
        assert_eq!(vad.accumulated(), 22 * DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_level_between_thresholds_does_not_start() {
        let mut vad = segmenter();
        let out = vad.process_block(&block_at(0.04), Instant::now(), false);
        assert!(out.transition.is_none());
        assert!(out.forward.is_none());
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_remote_speaking_blocks_start_and_accumulation() {
        let mut vad = segmenter();
        let mut t = Instant::now();

        let out = vad.process_block(&block_at(0.5), t, true);
        assert!(out.level > 0.4);
        assert!(out.transition.is_none());
        assert!(out.forward.is_none());

        t += Duration::from_millis(BLOCK_MS);
        vad.process_block(&block_at(0.12), t, false);
        assert!(vad.is_speaking());

        t += Duration::from_millis(BLOCK_MS);
        let out = vad.process_block(&block_at(0.12), t, true);
        assert!(out.forward.is_none());
        assert_eq!(vad.accumulated(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_segments_do_not_share_audio() {
        let mut vad = segmenter();
        let mut t = Instant::now();
        let mut segments = Vec::new();

        for value in [0.2f32, 0.3] {
            vad.process_block(&block_at(value), t, false);
            for _ in 0..60 {
                t += Duration::from_millis(BLOCK_MS);
                if let Some(segment) = vad.process_block(&block_at(0.0), t, false).flushed {
                    segments.push(segment);
                }
            }
        }

        assert_eq!(segments.len(), 2);
        assert_ne!(segments[0].id, segments[1].id);
        let loud = (0.3 * 32768.0) as i16;
        assert!(!segments[0].samples.contains(&loud));
        assert_eq!(segments[1].samples[0], loud);
    }

    #[test]
    fn test_meter_is_smoothed() {
        let mut vad = segmenter();
        let out = vad.process_block(&block_at(0.5), Instant::now(), false);
        assert!(out.meter < out.level);
        assert!((out.meter - 0.15).abs() < 0.01);
    }

    #[test]
    fn test_finish_flushes_open_segment() {
        let mut vad = segmenter();
        assert!(vad.finish().is_none());
        vad.process_block(&block_at(0.2), Instant::now(), false);
        let segment = vad.finish().unwrap();
        assert_eq!(segment.samples.len(), DEFAULT_BLOCK_SIZE);
        assert!(vad.finish().is_none());
    }

    #[test]
    fn test_segment_wav_encoding() {
        let segment = SpeechSegment {
            id: Uuid::new_v4(),
            sample_rate: 16000,
            samples: vec![1, 2, 3],
        };
        let wav = segment.to_wav().unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 3);
    }

    #[test]
    fn test_config_validation() {
        assert!(CaptureConfig::default().validate().is_ok());
        let inverted = CaptureConfig {
            start_threshold: 0.02,
            silence_threshold: 0.03,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
        assert_eq!(
            CaptureConfig::default().block_duration(),
            Duration::from_millis(32)
        );
    }
}
