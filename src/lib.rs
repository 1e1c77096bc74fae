//! Voice-translation chat core.
//!
//! Records speech from the microphone until silence, transcribes it,
//! translates it through a streaming generative API, and speaks the
//! translation aloud. After a translation lands the session stays open for
//! follow-up questions about it.
//!
//! The library surface is `pipeline::VoiceSession`; the `voice-translate`
//! binary wraps it in a line-command loop.

pub mod audio;
pub mod config;
pub mod error;
pub mod gemini;
pub mod pipeline;
pub mod recorder;
pub mod session;
pub mod speech;

pub use gemini::{GeminiClient, LanguageClient};
pub use pipeline::{RecordedAudio, SessionConfig, VoiceSession};
pub use session::{SessionStatus, Turn};
pub use speech::{AudioSink, RodioSink};
