//! Session state: the conversation, the status state machine, the cached
//! speech artifact, and the two error channels.
//!
//! The state is mutated only behind the pipeline's mutex and never across an
//! await point, so every suspension (network, stream chunk, retry sleep) is
//! a point where a clear may interleave.

pub mod conversation;

pub use conversation::{Conversation, ConversationSnapshot, Role, Turn, TurnRef};

use crate::error::{AudioAlert, SessionError};

/// UI status projection. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Recording,
    Transcribing,
    Translating,
    /// Translation delivered; follow-up chat available. Follow-up turns
    /// self-loop here and only toggle the `chat_loading` flag.
    Chatting,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Transcribing => write!(f, "transcribing"),
            Self::Translating => write!(f, "translating"),
            Self::Chatting => write!(f, "chatting"),
        }
    }
}

/// The most recently synthesized speech, valid only while `source_text`
/// equals the latest model turn's text.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSpeech {
    pub source_text: String,
    pub pcm: Vec<u8>,
}

/// Everything the pipeline mutates under one lock.
#[derive(Debug, Default)]
pub struct SessionState {
    pub conversation: Conversation,
    status_value: SessionStatus,
    pub chat_loading: bool,
    pub error: Option<SessionError>,
    pub audio_error: Option<AudioAlert>,
    pub speech_cache: Option<CachedSpeech>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.status_value
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status_value = status;
    }

    /// Cached speech for `text`, if the artifact is still valid.
    pub fn cached_speech_for(&self, text: &str) -> Option<Vec<u8>> {
        self.speech_cache
            .as_ref()
            .filter(|c| c.source_text == text)
            .map(|c| c.pcm.clone())
    }

    /// Reset to idle: empty conversation (invalidating outstanding turn
    /// references), drop the cached artifact, clear both error channels.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.speech_cache = None;
        self.error = None;
        self.audio_error = None;
        self.chat_loading = false;
        self.set_status(SessionStatus::Idle);
    }
}
