//! Typed error taxonomy for the voice pipeline.
//!
//! Four classes with distinct recovery policies:
//! - capture errors: reported, session returns to idle, no retry
//! - pipeline errors: reported, partial conversation preserved, no retry
//! - speech synthesis errors: bounded automatic retry before surfacing
//! - playback errors: transient channel, playing flag forced false
//!
//! All are non-fatal; the session always settles in a usable state.

use thiserror::Error;

/// Microphone acquisition and capture stream failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("microphone access was denied")]
    PermissionDenied,
    #[error("no microphone found")]
    DeviceNotFound,
    #[error("no supported audio recording format available")]
    UnsupportedFormat,
    #[error("audio capture failed: {0}")]
    Stream(String),
}

/// Failures in the transcribe / translate / follow-up chat pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("transcription returned empty")]
    EmptyTranscription,
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("translation failed: {0}")]
    Translation(String),
    #[error("chat failed: {0}")]
    Chat(String),
}

/// Speech synthesis failures. Transient by nature: the caller retries a
/// bounded number of times before surfacing `Exhausted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    /// The API responded but the response carried no audio payload.
    /// Retried identically to a transport failure.
    #[error("no audio in synthesis response")]
    NoAudioPayload,
    #[error("speech synthesis request failed: {0}")]
    Transport(String),
    #[error("audio not available after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Corrupted or undecodable audio at playback time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("playback failed: {0}")]
pub struct PlaybackError(pub String);

/// Errors surfaced on the session's main error channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Errors surfaced on the dismissible transient audio channel, kept
/// separate from the main error channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioAlert {
    #[error(transparent)]
    Speech(#[from] SpeechError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}
