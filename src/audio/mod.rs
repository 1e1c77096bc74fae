//! Audio subsystem: codec bridge, microphone capture, and the SPSC sample
//! buffer connecting the capture thread to the recorder.

pub mod capture;
pub mod codec;
pub mod ring_buffer;
