//! lfx-audio: Audio I/O for LoopFX using cpal
//!
//! Loopback capture of a playback endpoint, the DSP chain in the capture
//! callback, a wait-free SPSC ring buffer, and playback of the processed
//! stream.

mod device;
mod engine;
mod error;
mod ringbuf;

pub use device::*;
pub use engine::*;
pub use error::*;
pub use ringbuf::CircularBuffer;
