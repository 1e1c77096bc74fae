//! Silence detection over the live capture signal.
//!
//! Once per analysis tick, the detector computes the RMS deviation of the
//! most recent sample window from the signal midpoint, measured on the 8-bit
//! unsigned domain centered at 128 (the scale the thresholds are tuned for).
//! Sustained RMS below threshold for the configured duration requests an
//! auto-stop; any voiced window cancels the pending deadline.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Recorder tuning. The defaults are the values the pipeline was tuned with;
/// config may override threshold and duration.
#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// RMS threshold on the 8-bit domain. Below this counts as silence.
    pub threshold: f32,
    /// Continuous sub-threshold duration that triggers auto-stop.
    pub duration: Duration,
    /// Time-domain analysis window, in samples.
    pub window: usize,
    /// Exponential smoothing constant applied across windows (0 = none).
    pub smoothing: f32,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            duration: Duration::from_millis(3000),
            window: 512,
            smoothing: 0.1,
        }
    }
}

/// Stateful silence detector. Feed it captured samples, then poll once per
/// tick with the current time; `poll` returns `true` exactly once, when the
/// silence window has elapsed.
#[derive(Debug)]
pub struct SilenceDetector {
    config: SilenceConfig,
    window: VecDeque<f32>,
    smoothed: Option<f32>,
    deadline: Option<Instant>,
    fired: bool,
}

impl SilenceDetector {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window),
            config,
            smoothed: None,
            deadline: None,
            fired: false,
        }
    }

    /// Append newly captured samples, keeping only the most recent window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &s in samples {
            if self.window.len() == self.config.window {
                self.window.pop_front();
            }
            self.window.push_back(s);
        }
    }

    /// Run one analysis tick. Returns `true` when recording should auto-stop.
    ///
    /// Starting a new silence deadline while one is pending is a no-op; a
    /// voiced window clears it, requiring a fresh continuous run.
    pub fn poll(&mut self, now: Instant) -> bool {
        let rms = self.window_rms();
        let level = match self.smoothed {
            Some(prev) => self.config.smoothing * prev + (1.0 - self.config.smoothing) * rms,
            None => rms,
        };
        self.smoothed = Some(level);

        if self.fired {
            return false;
        }

        if level < self.config.threshold {
            match self.deadline {
                None => {
                    self.deadline = Some(now + self.config.duration);
                    false
                }
                Some(deadline) if now >= deadline => {
                    self.fired = true;
                    true
                }
                Some(_) => false,
            }
        } else {
            self.deadline = None;
            false
        }
    }

    /// RMS deviation from 128 on the 8-bit unsigned domain. An empty window
    /// reads as flat silence, matching a zeroed analyser buffer.
    fn window_rms(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        let sum_of_squares: f32 = self
            .window
            .iter()
            .map(|&s| {
                let byte = ((s.clamp(-1.0, 1.0) * 128.0) + 128.0)
                    .round()
                    .clamp(0.0, 255.0) as u8;
                let deviation = byte as f32 - 128.0;
                deviation * deviation
            })
            .sum();
        (sum_of_squares / self.window.len() as f32).sqrt()
    }
}
