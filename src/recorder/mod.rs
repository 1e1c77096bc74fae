//! Silence-triggered recording session.
//!
//! Owns the live capture stream, the sample buffer consumer, and the silence
//! detector. Exists only between start and stop; `finish` tears everything
//! down before the recorded audio is handed to the transcription stage, so
//! the analysis resources never outlive the stream they observe.

pub mod silence;

use std::time::Instant;

use tracing::{debug, info};

use crate::audio::capture::{start_capture, CaptureHandle, CAPTURE_SAMPLE_RATE};
use crate::audio::ring_buffer::{sample_ring_buffer, SampleConsumer};
use crate::error::CaptureError;

pub use silence::{SilenceConfig, SilenceDetector};

/// Cadence of the analysis loop, display-refresh-like. Not a precise timer;
/// it only governs a multi-second threshold.
pub const ANALYSIS_TICK_MS: u64 = 16;

/// The fully captured take, normalized mono f32.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl CapturedAudio {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A live microphone recording with silence analysis.
pub struct RecordingSession {
    capture: Option<CaptureHandle>,
    consumer: SampleConsumer,
    detector: SilenceDetector,
    captured: Vec<f32>,
}

impl RecordingSession {
    /// Acquire the microphone and begin capturing. Fails with a typed
    /// capture error and no side effects if the device can't be opened.
    pub fn start(
        device_name: Option<&str>,
        silence: SilenceConfig,
    ) -> Result<Self, CaptureError> {
        let (producer, consumer) = sample_ring_buffer(None);
        let capture = start_capture(producer, device_name)?;
        info!("Recording session started");
        Ok(Self {
            capture: Some(capture),
            consumer,
            detector: SilenceDetector::new(silence),
            captured: Vec::new(),
        })
    }

    /// Run one analysis tick: drain newly captured samples, accumulate them,
    /// and check the silence detector. Returns `true` when sustained silence
    /// requests an auto-stop.
    pub fn tick(&mut self, now: Instant) -> bool {
        let fresh = self.consumer.drain_all();
        if !fresh.is_empty() {
            self.detector.push_samples(&fresh);
            self.captured.extend_from_slice(&fresh);
        }
        self.detector.poll(now)
    }

    /// Stop capturing and return the take. The capture stream and analysis
    /// state are torn down here, before any asynchronous processing begins.
    pub fn finish(mut self) -> CapturedAudio {
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
        // Collect whatever landed in the buffer after the last tick.
        let tail = self.consumer.drain_all();
        self.captured.extend_from_slice(&tail);
        debug!(samples = self.captured.len(), "Recording finished");
        CapturedAudio {
            samples: std::mem::take(&mut self.captured),
            sample_rate: CAPTURE_SAMPLE_RATE,
        }
    }
}
