//! Lock-free SPSC sample buffer between the cpal callback thread and the
//! recorder's analysis loop.
//!
//! The capture callback runs on a dedicated audio thread and must never
//! block; the recorder drains the buffer once per analysis tick.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~20 seconds of 16 kHz mono audio. Generous because the
/// analysis tick only governs a multi-second silence threshold and may be
/// starved under load.
const DEFAULT_CAPACITY: usize = 320_000;

/// Producer half, owned by the cpal input callback.
pub struct SampleProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half, owned by the recording session.
pub struct SampleConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair.
pub fn sample_ring_buffer(capacity: Option<usize>) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity.unwrap_or(DEFAULT_CAPACITY));
    let (prod, cons) = rb.split();
    (SampleProducer { inner: prod }, SampleConsumer { inner: cons })
}

impl SampleProducer {
    /// Push samples; returns how many were written. A full buffer drops the
    /// excess — acceptable, the consumer catches up on the next tick.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl SampleConsumer {
    /// Number of samples currently available.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Drain everything currently buffered.
    pub fn drain_all(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_then_drain() {
        let (mut prod, mut cons) = sample_ring_buffer(Some(8));
        assert_eq!(prod.push_slice(&[0.1, 0.2, 0.3]), 3);
        assert_eq!(cons.available(), 3);
        assert_eq!(cons.drain_all(), vec![0.1, 0.2, 0.3]);
        assert!(cons.drain_all().is_empty());
    }

    #[test]
    fn test_full_buffer_drops_excess() {
        let (mut prod, mut cons) = sample_ring_buffer(Some(4));
        assert_eq!(prod.push_slice(&[1.0; 6]), 4);
        assert_eq!(cons.drain_all().len(), 4);
    }
}
