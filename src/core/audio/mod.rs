//! Audio buffering and container encoding.

pub mod ring_buffer;
pub mod wav;

pub use ring_buffer::{RangeError, RingBuffer, BYTES_PER_CHUNK};
