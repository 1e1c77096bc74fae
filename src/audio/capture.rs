//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device, captures at its native sample
//! rate, downmixes and resamples to 16 kHz mono f32, and pushes samples into
//! the ring buffer for the recorder's analysis loop.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! that parks until told to stop. Exactly one capture stream may be live at
//! a time; the recording session enforces that by owning the handle.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::{error, info};

use super::ring_buffer::SampleProducer;
use crate::error::CaptureError;

/// Sample rate recorded audio is normalized to before transcription upload.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// List available input device names.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.input_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// Handle to a live capture stream. Stopping (or dropping) the handle tears
/// down the stream before any recorded audio is processed.
pub struct CaptureHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Tear down the capture stream and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start audio capture into `producer`. `device_name` of `None` uses the
/// system default input.
///
/// Blocks until the stream is confirmed running (or failed), so the caller
/// gets a typed error before any state transition happens.
pub fn start_capture(
    producer: SampleProducer,
    device_name: Option<&str>,
) -> Result<CaptureHandle, CaptureError> {
    let device_name = device_name.map(str::to_string);
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();

    let join = std::thread::Builder::new()
        .name("mic-capture".into())
        .spawn(move || {
            let stream = match build_stream(producer, device_name.as_deref()) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            // Park until stop is requested or the handle is dropped.
            let _ = stop_rx.recv();
            drop(stream);
        })
        .map_err(|e| CaptureError::Stream(format!("failed to spawn capture thread: {e}")))?;

    match ready_rx.recv() {
        Ok(Ok(())) => {
            info!("Audio capture started");
            Ok(CaptureHandle {
                stop_tx: Some(stop_tx),
                join: Some(join),
            })
        }
        Ok(Err(e)) => {
            let _ = join.join();
            Err(e)
        }
        Err(_) => {
            let _ = join.join();
            Err(CaptureError::Stream("capture thread exited early".into()))
        }
    }
}

/// Resolve the input device and build the cpal stream. Runs on the capture
/// thread.
fn build_stream(
    mut producer: SampleProducer,
    device_name: Option<&str>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(map_devices_err)?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or(CaptureError::DeviceNotFound)?
    } else {
        host.default_input_device()
            .ok_or(CaptureError::DeviceNotFound)?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(map_config_err)?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels,
        "Input config (will normalize to {} Hz mono)",
        CAPTURE_SAMPLE_RATE,
    );

    let needs_resample = native_rate != CAPTURE_SAMPLE_RATE;
    let needs_downmix = channels > 1;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };
                let normalized = if needs_resample {
                    resample_linear(&mono, native_rate, CAPTURE_SAMPLE_RATE)
                } else {
                    mono
                };
                producer.push_slice(&normalized);
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None, // no timeout
        )
        .map_err(map_build_err)?;

    Ok(stream)
}

fn map_build_err(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
        cpal::BuildStreamError::StreamConfigNotSupported => CaptureError::UnsupportedFormat,
        other => classify_message(other.to_string()),
    }
}

fn map_config_err(e: cpal::DefaultStreamConfigError) -> CaptureError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceNotFound,
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => CaptureError::UnsupportedFormat,
        other => classify_message(other.to_string()),
    }
}

fn map_devices_err(e: cpal::DevicesError) -> CaptureError {
    classify_message(e.to_string())
}

/// Backend-specific errors only carry a message; permission denials show up
/// here on most platforms.
fn classify_message(msg: String) -> CaptureError {
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Stream(msg)
    }
}

/// Simple linear resampler, mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_identity() {
        let input = vec![0.0, 0.5, -0.5, 1.0];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn test_resample_halves_length() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let out = resample_linear(&input, 32_000, 16_000);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn test_to_mono_averages() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_classify_permission_message() {
        assert_eq!(
            classify_message("Access denied by user".into()),
            CaptureError::PermissionDenied
        );
        assert!(matches!(
            classify_message("ALSA: broken pipe".into()),
            CaptureError::Stream(_)
        ));
    }
}
