//! Speech synthesis retrieval with bounded retry.
//!
//! Synthesis failures are transient by nature, so each fetch makes up to
//! three attempts with a fixed 500 ms spacing (no backoff growth) before
//! giving up. A response without an audio payload counts as a failed attempt
//! just like a transport error, and so does an undecodable payload.

pub mod playback;

use std::time::Duration;

use tracing::warn;

use crate::audio::codec;
use crate::error::SpeechError;
use crate::gemini::LanguageClient;

pub use playback::{AudioSink, RodioSink};

/// Maximum synthesis attempts per fetch.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Fetch synthesized speech for `text`, returning raw PCM bytes.
pub async fn fetch_speech(
    client: &dyn LanguageClient,
    text: &str,
    voice: &str,
) -> Result<Vec<u8>, SpeechError> {
    let mut last: Option<SpeechError> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            tokio::time::sleep(RETRY_DELAY).await;
        }
        match client.synthesize(text, voice).await {
            Ok(payload) => match codec::decode_base64(&payload) {
                Ok(pcm) => return Ok(pcm),
                Err(e) => {
                    warn!(attempt, "Synthesis payload undecodable: {e}");
                    last = Some(SpeechError::Transport(e.to_string()));
                }
            },
            Err(e) => {
                warn!(attempt, error = %e, "Speech synthesis attempt failed");
                last = Some(e);
            }
        }
    }

    Err(SpeechError::Exhausted {
        attempts: MAX_ATTEMPTS,
        last: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}
