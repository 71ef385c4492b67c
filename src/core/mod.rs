pub mod audio;
pub mod capture;
pub mod intent;
pub mod live;
pub mod notifier;
pub mod playback;
pub mod transcribe;

// Re-export commonly used types for convenience
pub use audio::{AudioChunk, CAPTURE_SAMPLE_RATE, DEFAULT_PLAYBACK_SAMPLE_RATE};

pub use capture::{
    AudioSource, CaptureConfig, CaptureError, CaptureEvent, CapturePipeline, CaptureSegmenter,
    OutboundSender, SpeechSegment, WavFileSource,
};

pub use intent::{
    ConversationSink, GateConfig, GateOutcome, HttpIntentSink, Intent, IntentError, IntentGate,
    IntentSink, SkipReason,
};

pub use live::{
    ConnectionState, LiveClient, LiveConfig, LiveError, LiveEvent, LiveEventKind, LiveResult,
    LiveTimings,
};

pub use notifier::{
    AnnouncementMode, Announcer, Notification, Notifier, NotifierConfig, NotifierError,
    SpeechSynthesizer,
};

pub use playback::{
    AudioSink, NullSink, PlaybackConfig, PlaybackError, PlaybackScheduler, PlaybackStats,
    WavFileSink,
};

pub use transcribe::{HttpTranscriber, QueryLabel, TranscribeConfig, TranscribeError, Transcriber};
