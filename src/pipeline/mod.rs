//! The turn pipeline: record → transcribe → translate → follow-up chat,
//! plus speech playback of the latest translation.
//!
//! `VoiceSession` owns all session state behind one mutex that is never held
//! across an await point. Every suspension (network call, stream chunk,
//! retry sleep, analysis tick) is therefore a point where `clear` may
//! interleave; late responses are detected through the conversation's
//! generation stamp and discarded instead of applied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::audio::codec::{self, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::error::{AudioAlert, CaptureError, PipelineError, PlaybackError, SessionError};
use crate::gemini::{DeltaStream, HistoryTurn, LanguageClient, Part};
use crate::recorder::{RecordingSession, SilenceConfig, ANALYSIS_TICK_MS};
use crate::session::{CachedSpeech, SessionState, SessionStatus, Turn, TurnRef};
use crate::speech::{fetch_speech, AudioSink};

/// Fixed instruction sent with the inline audio for transcription.
pub const TRANSCRIBE_INSTRUCTION: &str = "Please transcribe the following audio:";

fn translation_instruction(language: &str) -> String {
    format!(
        "You are a direct translator. Translate the user's text to {language}. \
         Your response should contain ONLY the translated text, without any \
         additional commentary, greetings, or explanations."
    )
}

fn follow_up_instruction(language: &str) -> String {
    format!(
        "You are a helpful and concise language assistant. The user is asking \
         a follow-up question about a previous translation to {language}. The \
         conversation history is provided. Keep your answers brief and to the \
         point."
    )
}

/// Session tuning, read from config at startup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub target_language: String,
    pub voice_name: String,
    pub input_device: Option<String>,
    pub silence: SilenceConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_language: "Spanish".into(),
            voice_name: "Kore".into(),
            input_device: None,
            silence: SilenceConfig::default(),
        }
    }
}

/// Recorded audio handed to the transcription stage: either a raw take from
/// the recorder or an already-encoded payload from a host front end.
#[derive(Debug, Clone)]
pub enum RecordedAudio {
    Pcm { samples: Vec<f32>, sample_rate: u32 },
    Encoded { mime_type: String, base64: String },
}

impl RecordedAudio {
    /// Accept audio shipped as a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> anyhow::Result<Self> {
        let mime_type = codec::data_url_mime(url)
            .ok_or_else(|| anyhow::anyhow!("not a data URL"))?
            .to_string();
        let base64 = codec::data_url_payload(url)?.to_string();
        Ok(Self::Encoded { mime_type, base64 })
    }

    /// Mime type plus base64 payload for the inline-audio request part.
    fn into_parts(self) -> (String, String) {
        match self {
            Self::Pcm {
                samples,
                sample_rate,
            } => (
                "audio/wav".to_string(),
                codec::encode_base64(&codec::encode_wav(&samples, sample_rate)),
            ),
            Self::Encoded { mime_type, base64 } => (mime_type, base64),
        }
    }
}

/// How a delta stream ended.
#[derive(Debug, PartialEq, Eq)]
enum Aggregation {
    /// Stream exhausted with the target turn still live.
    Completed,
    /// The conversation was cleared mid-stream; remaining deltas discarded.
    Stale,
}

/// The voice-translation session. All methods take `&self`; state lives
/// behind an internal mutex.
pub struct VoiceSession {
    state: Mutex<SessionState>,
    client: Arc<dyn LanguageClient>,
    sink: Arc<dyn AudioSink>,
    config: SessionConfig,
    stop_requested: AtomicBool,
    fetching_audio: AtomicBool,
    recording_active: AtomicBool,
}

impl VoiceSession {
    pub fn new(
        client: Arc<dyn LanguageClient>,
        sink: Arc<dyn AudioSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::new()),
            client,
            sink,
            config,
            stop_requested: AtomicBool::new(false),
            fetching_audio: AtomicBool::new(false),
            recording_active: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.state().conversation.turns().to_vec()
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.state().error.clone()
    }

    pub fn audio_alert(&self) -> Option<AudioAlert> {
        self.state().audio_error.clone()
    }

    pub fn is_chat_loading(&self) -> bool {
        self.state().chat_loading
    }

    pub fn is_playing(&self) -> bool {
        self.sink.is_playing()
    }

    /// Forcibly stop recording and playback, release audio resources, and
    /// reset to idle. Valid from any state. Outstanding turn references are
    /// invalidated so late responses can't mutate the new session.
    pub fn clear(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.sink.stop();
        self.state().reset();
        info!("Session cleared");
    }

    /// Request a manual stop of the active recording.
    pub fn stop_recording(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Record from the microphone until silence or a manual stop, then run
    /// the full transcribe/translate pipeline on the take.
    ///
    /// Starting a recording discards the previous conversation, matching the
    /// one-translation-per-take interaction model.
    pub async fn record(&self) -> Result<(), CaptureError> {
        // One capture stream at a time: a second record call must not stand
        // up a session next to the live one.
        if self.recording_active.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::Stream("a recording is already active".into()));
        }

        self.clear();

        let mut recording = match RecordingSession::start(
            self.config.input_device.as_deref(),
            self.config.silence.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not start recording");
                self.recording_active.store(false, Ordering::SeqCst);
                let mut st = self.state();
                st.error = Some(e.clone().into());
                st.set_status(SessionStatus::Idle);
                return Err(e);
            }
        };

        self.stop_requested.store(false, Ordering::SeqCst);
        self.state().set_status(SessionStatus::Recording);

        loop {
            tokio::time::sleep(Duration::from_millis(ANALYSIS_TICK_MS)).await;
            if self.state().status() != SessionStatus::Recording {
                // Cleared mid-recording; tear down and discard the take.
                recording.finish();
                self.recording_active.store(false, Ordering::SeqCst);
                return Ok(());
            }
            if self.stop_requested.swap(false, Ordering::SeqCst) {
                break;
            }
            if recording.tick(Instant::now()) {
                info!("Silence window elapsed, auto-stopping");
                break;
            }
        }

        // Teardown happens here, before any asynchronous processing.
        let captured = recording.finish();
        self.recording_active.store(false, Ordering::SeqCst);
        if captured.is_empty() {
            debug!("Nothing captured, settling to idle");
            self.state().set_status(SessionStatus::Idle);
            return Ok(());
        }

        let _ = self
            .process_recorded_audio(RecordedAudio::Pcm {
                samples: captured.samples,
                sample_rate: captured.sample_rate,
            })
            .await;
        Ok(())
    }

    /// Transcribe the recorded audio, then translate it via a streaming
    /// chat. On success the session lands in `Chatting`; on failure the
    /// conversation rolls back to the user turn (if obtained) or empty and
    /// the session returns to `Idle`.
    pub async fn process_recorded_audio(
        &self,
        recording: RecordedAudio,
    ) -> Result<(), PipelineError> {
        let generation = {
            let mut st = self.state();
            st.set_status(SessionStatus::Transcribing);
            st.error = None;
            st.conversation.generation()
        };

        let (mime_type, payload) = recording.into_parts();
        let parts = vec![
            Part::text(TRANSCRIBE_INSTRUCTION),
            Part::inline_audio(mime_type, payload),
        ];

        let transcript = match self.client.transcribe(parts).await {
            Ok(t) => t.trim().to_string(),
            Err(e) => {
                return self.fail_pipeline(
                    generation,
                    None,
                    PipelineError::Transcription(e.to_string()),
                )
            }
        };
        if transcript.is_empty() {
            return self.fail_pipeline(generation, None, PipelineError::EmptyTranscription);
        }
        info!(chars = transcript.len(), "Transcription complete");

        // The placeholder must exist before any delta can arrive.
        let turn = {
            let mut st = self.state();
            let turn = st.conversation.push_exchange(&transcript);
            st.set_status(SessionStatus::Translating);
            turn
        };

        let system = translation_instruction(&self.config.target_language);
        let stream = match self.client.chat_stream(&system, &[], &transcript).await {
            Ok(s) => s,
            Err(e) => {
                return self.fail_pipeline(
                    generation,
                    Some(turn),
                    PipelineError::Translation(e.to_string()),
                )
            }
        };

        match self.aggregate_stream(turn, stream).await {
            Ok(Aggregation::Completed) => {
                let mut st = self.state();
                if st.conversation.contains(turn) {
                    // Source text changed: drop the cached artifact and any
                    // stale audio error.
                    st.speech_cache = None;
                    st.audio_error = None;
                    st.set_status(SessionStatus::Chatting);
                }
                Ok(())
            }
            Ok(Aggregation::Stale) => Ok(()),
            Err(e) => self.fail_pipeline(
                generation,
                Some(turn),
                PipelineError::Translation(e.to_string()),
            ),
        }
    }

    /// Follow-up chat about the translation. Does not change the session
    /// status; on failure the conversation reverts to its pre-call snapshot
    /// exactly, including removing the just-appended placeholder.
    pub async fn send_message(&self, text: &str) -> Result<(), PipelineError> {
        let message = text.trim().to_string();
        if message.is_empty() {
            return Ok(());
        }

        let (snapshot, history, turn) = {
            let mut st = self.state();
            if st.status() != SessionStatus::Chatting {
                return Err(PipelineError::Chat("no translation to follow up on".into()));
            }
            if st.chat_loading {
                return Err(PipelineError::Chat("a follow-up is already in flight".into()));
            }
            let snapshot = st.conversation.snapshot();
            let history: Vec<HistoryTurn> = st
                .conversation
                .turns()
                .iter()
                .map(|t| HistoryTurn {
                    role: t.role.as_str().to_string(),
                    text: t.text.clone(),
                })
                .collect();
            let turn = st.conversation.push_exchange(&message);
            st.chat_loading = true;
            st.error = None;
            (snapshot, history, turn)
        };

        let system = follow_up_instruction(&self.config.target_language);
        let outcome = match self.client.chat_stream(&system, &history, &message).await {
            Ok(stream) => self.aggregate_stream(turn, stream).await,
            Err(e) => Err(e),
        };

        let mut st = self.state();
        st.chat_loading = false;
        match outcome {
            Ok(Aggregation::Completed) => {
                if st.conversation.contains(turn) {
                    st.speech_cache = None;
                    st.audio_error = None;
                }
                Ok(())
            }
            Ok(Aggregation::Stale) => Ok(()),
            Err(e) => {
                let err = PipelineError::Chat(e.to_string());
                // A failed restore means the conversation was cleared
                // mid-call; the stale failure must not surface on the fresh
                // session.
                if st.conversation.restore(snapshot) {
                    st.error = Some(err.clone().into());
                }
                Err(err)
            }
        }
    }

    /// Consume the delta stream, overwriting the target turn with the full
    /// accumulator on each delta so the visible text is always a complete
    /// prefix. Stops consuming if the target turn went stale.
    async fn aggregate_stream(
        &self,
        turn: TurnRef,
        mut deltas: DeltaStream,
    ) -> anyhow::Result<Aggregation> {
        let mut accumulated = String::new();
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            accumulated.push_str(&delta);
            let mut st = self.state();
            if !st.conversation.set_text(turn, &accumulated) {
                debug!("Discarding stale delta after clear");
                return Ok(Aggregation::Stale);
            }
        }
        Ok(Aggregation::Completed)
    }

    /// Roll back and surface a pipeline error, unless the conversation was
    /// cleared since the pipeline started: a stale failure belongs to a
    /// session that no longer exists and must not touch the fresh one.
    fn fail_pipeline(
        &self,
        generation: u64,
        turn: Option<TurnRef>,
        err: PipelineError,
    ) -> Result<(), PipelineError> {
        let mut st = self.state();
        if st.conversation.generation() != generation {
            debug!(error = %err, "Discarding stale pipeline failure after clear");
            return Err(err);
        }
        warn!(error = %err, "Pipeline failed");
        match turn {
            Some(t) => {
                st.conversation.rollback_to_user(t);
            }
            None => st.conversation.reset_turns(),
        }
        st.error = Some(err.clone().into());
        st.set_status(SessionStatus::Idle);
        Err(err)
    }

    /// Play the most recent non-empty model turn. Toggle semantics: if
    /// something is playing, stop it and return. Fetches (with bounded
    /// retry) on cache miss; plays from cache on exact source-text match.
    pub async fn play_latest(&self) -> Result<(), AudioAlert> {
        if self.sink.is_playing() {
            self.sink.stop();
            return Ok(());
        }
        if self.fetching_audio.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.play_latest_inner().await;
        self.fetching_audio.store(false, Ordering::SeqCst);
        if let Err(e) = &result {
            self.state().audio_error = Some(e.clone());
        }
        result
    }

    async fn play_latest_inner(&self) -> Result<(), AudioAlert> {
        let (text, cached) = {
            let mut st = self.state();
            st.audio_error = None;
            let text = st.conversation.latest_model_text().map(str::to_string);
            let cached = text.as_deref().and_then(|t| st.cached_speech_for(t));
            (text, cached)
        };
        let Some(text) = text else {
            return Ok(());
        };

        let pcm = match cached {
            Some(pcm) => {
                debug!("Playing speech from cache");
                pcm
            }
            None => {
                let fetched =
                    fetch_speech(self.client.as_ref(), &text, &self.config.voice_name).await;
                // The fetch suspended; a clear or a new translation may have
                // replaced the text this audio was synthesized for. A stale
                // result must neither play nor repopulate the cache.
                let mut st = self.state();
                let still_current = st.conversation.latest_model_text() == Some(text.as_str());
                match fetched {
                    Ok(pcm) => {
                        if !still_current {
                            debug!("Discarding stale synthesized speech");
                            return Ok(());
                        }
                        st.speech_cache = Some(CachedSpeech {
                            source_text: text.clone(),
                            pcm: pcm.clone(),
                        });
                        drop(st);
                        pcm
                    }
                    Err(e) => {
                        if !still_current {
                            debug!("Discarding stale synthesis failure");
                            return Ok(());
                        }
                        st.speech_cache = None;
                        return Err(e.into());
                    }
                }
            }
        };

        let buffer = codec::decode_raw_audio(&pcm, SPEECH_SAMPLE_RATE, SPEECH_CHANNELS)
            .map_err(|e| AudioAlert::Playback(PlaybackError(e.to_string())))?;
        let samples = buffer.channels.into_iter().next().unwrap_or_default();
        self.sink
            .play(samples, SPEECH_SAMPLE_RATE)
            .map_err(AudioAlert::Playback)?;
        Ok(())
    }
}
