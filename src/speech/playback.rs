//! Speech playback through the default output device.
//!
//! `AudioSink` is the seam the pipeline plays through; `RodioSink` is the
//! production implementation. rodio's `OutputStream` is not `Send`, so it
//! lives on a lazily started worker thread that is reused for every playback
//! (one output context for the life of the session). At most one playback is
//! active at a time: `play` refuses to start while one is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tracing::debug;

use crate::error::PlaybackError;

/// Exclusive audio output. Playback is non-blocking; natural end-of-stream
/// clears the playing flag.
pub trait AudioSink: Send + Sync {
    /// Start playing mono f32 samples. Errors if the output device can't be
    /// opened; a start while already playing is a guarded no-op.
    fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), PlaybackError>;

    /// Stop current playback immediately.
    fn stop(&self);

    fn is_playing(&self) -> bool;
}

struct PlayRequest {
    samples: Vec<f32>,
    sample_rate: u32,
}

struct Worker {
    tx: mpsc::Sender<PlayRequest>,
    sink: Arc<Sink>,
}

/// rodio-backed sink with a single reusable output context.
pub struct RodioSink {
    worker: Mutex<Option<Worker>>,
    playing: Arc<AtomicBool>,
}

impl RodioSink {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_worker(playing: Arc<AtomicBool>) -> Result<Worker, PlaybackError> {
        let (tx, rx) = mpsc::channel::<PlayRequest>();
        let (init_tx, init_rx) = mpsc::channel::<Result<Arc<Sink>, PlaybackError>>();

        std::thread::Builder::new()
            .name("speech-playback".into())
            .spawn(move || {
                let (stream, handle) = match OutputStream::try_default() {
                    Ok(v) => v,
                    Err(e) => {
                        let _ = init_tx.send(Err(PlaybackError(format!(
                            "failed to open audio output: {e}"
                        ))));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(s) => Arc::new(s),
                    Err(e) => {
                        let _ = init_tx.send(Err(PlaybackError(format!(
                            "failed to create audio sink: {e}"
                        ))));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(sink.clone()));

                // Keep the output stream alive for the worker's lifetime.
                let _stream = stream;
                while let Ok(req) = rx.recv() {
                    sink.append(SamplesBuffer::new(1, req.sample_rate, req.samples));
                    sink.sleep_until_end();
                    playing.store(false, Ordering::SeqCst);
                    debug!("Playback finished");
                }
            })
            .map_err(|e| PlaybackError(format!("failed to spawn playback thread: {e}")))?;

        match init_rx.recv() {
            Ok(Ok(sink)) => Ok(Worker { tx, sink }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError("playback thread exited early".into())),
        }
    }
}

impl Default for RodioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for RodioSink {
    fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), PlaybackError> {
        if samples.is_empty() {
            return Ok(());
        }
        // Guard against concurrent starts; the caller's toggle should have
        // stopped any active playback already.
        if self.playing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut guard = self
            .worker
            .lock()
            .map_err(|_| PlaybackError("playback state poisoned".into()))?;
        if guard.is_none() {
            match Self::spawn_worker(self.playing.clone()) {
                Ok(worker) => *guard = Some(worker),
                Err(e) => {
                    self.playing.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }

        let Some(worker) = guard.as_ref() else {
            self.playing.store(false, Ordering::SeqCst);
            return Err(PlaybackError("playback worker unavailable".into()));
        };
        worker
            .tx
            .send(PlayRequest {
                samples,
                sample_rate,
            })
            .map_err(|_| {
                self.playing.store(false, Ordering::SeqCst);
                PlaybackError("playback thread is gone".into())
            })
    }

    fn stop(&self) {
        if let Ok(guard) = self.worker.lock() {
            if let Some(worker) = guard.as_ref() {
                worker.sink.stop();
            }
        }
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
