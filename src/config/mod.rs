//! Configuration reading and config directory paths.

pub mod paths;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::SessionConfig;
use crate::recorder::SilenceConfig;

use paths::get_config_dir;

fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_tts_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_target_language() -> String {
    "Spanish".to_string()
}

fn default_voice_name() -> String {
    "Kore".to_string()
}

fn default_silence_threshold() -> f32 {
    2.0
}

fn default_silence_duration_ms() -> u64 {
    3000
}

/// Top-level config.json shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    #[serde(default)]
    pub input_device: Option<String>,
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: default_chat_model(),
            tts_model: default_tts_model(),
            target_language: default_target_language(),
            voice_name: default_voice_name(),
            input_device: None,
            silence_threshold: default_silence_threshold(),
            silence_duration_ms: default_silence_duration_ms(),
        }
    }
}

impl AppConfig {
    /// API key from config, falling back to the GEMINI_API_KEY environment
    /// variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    /// Project this config onto the session's tuning knobs.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            target_language: self.target_language.clone(),
            voice_name: self.voice_name.clone(),
            input_device: self.input_device.clone(),
            silence: SilenceConfig {
                threshold: self.silence_threshold,
                duration: Duration::from_millis(self.silence_duration_ms),
                ..SilenceConfig::default()
            },
        }
    }
}

/// Read config.json from the config directory, falling back to defaults.
pub fn read_config() -> AppConfig {
    let path = get_config_path();
    read_json_file(&path).unwrap_or_default()
}

/// Path to config.json.
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.chat_model, "gemini-2.5-flash");
        assert_eq!(config.tts_model, "gemini-2.5-flash-preview-tts");
        assert_eq!(config.target_language, "Spanish");
        assert_eq!(config.voice_name, "Kore");
        assert_eq!(config.api_key, None);
        assert_eq!(config.input_device, None);
        assert_eq!(config.silence_threshold, 2.0);
        assert_eq!(config.silence_duration_ms, 3000);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "targetLanguage": "French", "silenceDurationMs": 1500 }"#,
        )
        .unwrap();
        assert_eq!(config.target_language, "French");
        assert_eq!(config.silence_duration_ms, 1500);
        assert_eq!(config.chat_model, "gemini-2.5-flash");
        assert_eq!(config.voice_name, "Kore");
    }

    #[test]
    fn test_session_config_projection() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "targetLanguage": "German", "inputDevice": "USB Mic", "silenceThreshold": 3.5 }"#,
        )
        .unwrap();
        let session = config.session_config();
        assert_eq!(session.target_language, "German");
        assert_eq!(session.input_device.as_deref(), Some("USB Mic"));
        assert_eq!(session.silence.threshold, 3.5);
        assert_eq!(session.silence.duration, Duration::from_millis(3000));
    }
}
