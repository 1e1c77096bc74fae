//! voice-translate — speak, read the translation, ask follow-ups.
//!
//! Line-command front end over the session pipeline. Logs go to stderr so
//! stdout stays clean for conversation output.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_translate_core::audio::capture::list_input_devices;
use voice_translate_core::config::read_config;
use voice_translate_core::{GeminiClient, RodioSink, VoiceSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (respects RUST_LOG env, defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = read_config();
    info!(
        chat_model = %config.chat_model,
        tts_model = %config.tts_model,
        target_language = %config.target_language,
        "Configuration loaded"
    );

    let api_key = config.resolve_api_key().ok_or_else(|| {
        anyhow::anyhow!("no API key: set apiKey in config.json or the GEMINI_API_KEY env var")
    })?;

    let client = Arc::new(GeminiClient::new(
        &api_key,
        &config.chat_model,
        &config.tts_model,
    ));
    let sink = Arc::new(RodioSink::new());
    let session = Arc::new(VoiceSession::new(client, sink, config.session_config()));

    println!(
        "voice-translate ready ({}). Commands: record, stop, send <text>, play, clear, status, devices, quit",
        session.config().target_language
    );

    let mut commands = spawn_stdin_reader();
    while let Some(line) = commands.recv().await {
        if line.is_empty() {
            continue;
        }
        let (cmd, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        match cmd {
            "record" => {
                // Runs concurrently so `stop` and `clear` stay responsive.
                let session = session.clone();
                tokio::spawn(async move {
                    match session.record().await {
                        Err(e) => eprintln!("error: {e}"),
                        Ok(()) => {
                            if let Some(e) = session.last_error() {
                                eprintln!("error: {e}");
                            }
                            print_conversation(&session);
                        }
                    }
                });
            }
            "stop" => session.stop_recording(),
            "send" => match session.send_message(rest).await {
                Ok(()) => print_conversation(&session),
                Err(e) => eprintln!("error: {e}"),
            },
            "play" => {
                if let Err(e) = session.play_latest().await {
                    eprintln!("error: {e}");
                }
            }
            "clear" => session.clear(),
            "status" => print_status(&session),
            "devices" => {
                for name in list_input_devices() {
                    println!("{name}");
                }
            }
            "quit" | "exit" => break,
            other => eprintln!("unknown command: {other}"),
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Forward stdin lines to the async loop (blocking thread -> async channel).
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    if let Err(e) = spawned {
        eprintln!("error: could not read stdin: {e}");
    }
    rx
}

fn print_conversation(session: &VoiceSession) {
    for turn in session.turns() {
        println!("[{}] {}", turn.role.as_str(), turn.text);
    }
}

fn print_status(session: &VoiceSession) {
    println!(
        "status: {} | turns: {} | follow-up in flight: {} | playing: {}",
        session.status(),
        session.turns().len(),
        session.is_chat_loading(),
        session.is_playing()
    );
    if let Some(e) = session.last_error() {
        println!("last error: {e}");
    }
    if let Some(e) = session.audio_alert() {
        println!("audio alert: {e}");
    }
}
