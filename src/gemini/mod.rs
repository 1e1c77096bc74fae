//! Language-model collaborator: trait seam plus the Gemini REST client.
//!
//! The pipeline consumes the API through exactly three operations:
//! single-shot `transcribe`, streaming `chat_stream`, and single-shot
//! `synthesize`. Tests substitute the trait with scripted mocks.

use std::collections::VecDeque;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tracing::debug;

use crate::error::SpeechError;

/// One piece of a multimodal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Inline audio payload: mime type plus base64 bytes.
    InlineAudio { mime_type: String, data: String },
}

impl Part {
    pub fn text(t: impl Into<String>) -> Self {
        Self::Text(t.into())
    }

    pub fn inline_audio(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::InlineAudio {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// A prior turn in collaborator wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    /// "user" or "model".
    pub role: String,
    pub text: String,
}

/// Finite, non-restartable, ordered sequence of response text deltas.
pub type DeltaStream = BoxStream<'static, anyhow::Result<String>>;

/// The three operations the pipeline needs from the generative API.
pub trait LanguageClient: Send + Sync {
    /// Single-shot, non-streaming content generation. Used for
    /// transcription with a fixed instruction and inline audio.
    fn transcribe(&self, parts: Vec<Part>) -> BoxFuture<'_, anyhow::Result<String>>;

    /// Open a streaming chat scoped to `system_instruction`, seeded with
    /// `history`, sending `message` as the final user turn.
    fn chat_stream(
        &self,
        system_instruction: &str,
        history: &[HistoryTurn],
        message: &str,
    ) -> BoxFuture<'_, anyhow::Result<DeltaStream>>;

    /// Synthesize speech for `text` with the given prebuilt voice. Returns
    /// the base64 PCM payload. A response without audio is
    /// `SpeechError::NoAudioPayload`, retried identically to transport
    /// failures.
    fn synthesize(&self, text: &str, voice: &str) -> BoxFuture<'_, Result<String, SpeechError>>;
}

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini REST client.
pub struct GeminiClient {
    api_key: String,
    chat_model: String,
    tts_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, chat_model: &str, tts_model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            chat_model: chat_model.to_string(),
            tts_model: tts_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, model: &str, method: &str, query: Option<&str>) -> reqwest::RequestBuilder {
        let mut url = format!("{API_BASE}/{model}:{method}");
        if let Some(q) = query {
            url.push('?');
            url.push_str(q);
        }
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
    }
}

fn part_to_json(part: &Part) -> serde_json::Value {
    match part {
        Part::Text(t) => serde_json::json!({ "text": t }),
        Part::InlineAudio { mime_type, data } => serde_json::json!({
            "inlineData": { "mimeType": mime_type, "data": data }
        }),
    }
}

fn contents_json(history: &[HistoryTurn], message: &str) -> serde_json::Value {
    let mut contents: Vec<serde_json::Value> = history
        .iter()
        .map(|turn| {
            serde_json::json!({
                "role": turn.role,
                "parts": [{ "text": turn.text }]
            })
        })
        .collect();
    contents.push(serde_json::json!({
        "role": "user",
        "parts": [{ "text": message }]
    }));
    serde_json::Value::Array(contents)
}

/// Concatenate the text of every part in the first candidate.
fn extract_text(body: &serde_json::Value) -> String {
    let mut out = String::new();
    if let Some(parts) = body["candidates"][0]["content"]["parts"].as_array() {
        for part in parts {
            if let Some(t) = part["text"].as_str() {
                out.push_str(t);
            }
        }
    }
    out
}

/// Parse a server-sent-events body into a stream of text deltas.
///
/// Chunks can split SSE lines arbitrarily, so complete lines are carved out
/// of a carry-over buffer before parsing.
fn sse_delta_stream(response: reqwest::Response) -> DeltaStream {
    let state = (
        response.bytes_stream().boxed(),
        String::new(),
        VecDeque::<String>::new(),
        false,
    );
    futures_util::stream::unfold(state, |(mut body, mut buf, mut pending, mut done)| async move {
        loop {
            if let Some(delta) = pending.pop_front() {
                return Some((Ok(delta), (body, buf, pending, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                None => {
                    done = true;
                }
                Some(Err(e)) => {
                    done = true;
                    return Some((
                        Err(anyhow::anyhow!("response stream failed: {e}")),
                        (body, buf, pending, done),
                    ));
                }
                Some(Ok(chunk)) => {
                    buf.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(pos) = buf.find('\n') {
                        let line: String = buf.drain(..=pos).collect();
                        let line = line.trim_end();
                        if let Some(data) = line.strip_prefix("data: ") {
                            if let Ok(value) =
                                serde_json::from_str::<serde_json::Value>(data)
                            {
                                let text = extract_text(&value);
                                if !text.is_empty() {
                                    pending.push_back(text);
                                }
                            }
                        }
                    }
                }
            }
        }
    })
    .boxed()
}

impl LanguageClient for GeminiClient {
    fn transcribe(&self, parts: Vec<Part>) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "contents": [{
                    "parts": parts.iter().map(part_to_json).collect::<Vec<_>>()
                }]
            });
            debug!(model = %self.chat_model, parts = parts.len(), "Transcription request");

            let resp = self
                .request(&self.chat_model, "generateContent", None)
                .json(&body)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("generateContent error {}: {}", status, text);
            }

            let json: serde_json::Value = resp.json().await?;
            Ok(extract_text(&json))
        })
    }

    fn chat_stream(
        &self,
        system_instruction: &str,
        history: &[HistoryTurn],
        message: &str,
    ) -> BoxFuture<'_, anyhow::Result<DeltaStream>> {
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": contents_json(history, message),
        });
        Box::pin(async move {
            debug!(model = %self.chat_model, "Opening chat stream");

            let resp = self
                .request(&self.chat_model, "streamGenerateContent", Some("alt=sse"))
                .json(&body)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("streamGenerateContent error {}: {}", status, text);
            }

            Ok(sse_delta_stream(resp))
        })
    }

    fn synthesize(&self, text: &str, voice: &str) -> BoxFuture<'_, Result<String, SpeechError>> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice }
                    }
                }
            }
        });
        Box::pin(async move {
            debug!(model = %self.tts_model, "Speech synthesis request");

            let resp = self
                .request(&self.tts_model, "generateContent", None)
                .json(&body)
                .send()
                .await
                .map_err(|e| SpeechError::Transport(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(SpeechError::Transport(format!(
                    "synthesis error {status}: {text}"
                )));
            }

            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| SpeechError::Transport(e.to_string()))?;

            json["candidates"][0]["content"]["parts"][0]["inlineData"]["data"]
                .as_str()
                .map(str::to_string)
                .ok_or(SpeechError::NoAudioPayload)
        })
    }
}
