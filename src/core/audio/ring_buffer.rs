//! Chunk-addressed PCM byte buffer with head truncation.
//!
//! All segmentation arithmetic in the gateway is expressed in chunk units
//! (one chunk = one client audio message). The buffer maps chunk ranges to
//! byte ranges through a fixed bytes-per-chunk factor and keeps a `base_chunk`
//! watermark so long sessions can release memory after each final.

use thiserror::Error;

/// Bytes per chunk for 16 kHz / mono / s16le audio at 100 ms per message.
pub const BYTES_PER_CHUNK: usize = 3200;

/// Range errors surfaced by [`RingBuffer::read_range`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    /// The requested range starts before the truncated head. Callers treat
    /// this as "segment already delivered" and drop the work item.
    #[error("range [{start}, {end}) starts below base chunk {base}")]
    BelowBase { start: u64, end: u64, base: u64 },
    #[error("invalid range [{start}, {end})")]
    Inverted { start: u64, end: u64 },
}

/// Per-session append-only audio buffer addressable by chunk index.
#[derive(Debug)]
pub struct RingBuffer {
    data: Vec<u8>,
    base_chunk: u64,
    bytes_per_chunk: usize,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RingBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(BYTES_PER_CHUNK)
    }

    pub fn with_chunk_size(bytes_per_chunk: usize) -> Self {
        debug_assert!(bytes_per_chunk > 0);
        Self {
            data: Vec::new(),
            base_chunk: 0,
            bytes_per_chunk,
        }
    }

    /// Chunk index corresponding to buffer byte 0. Monotonically
    /// non-decreasing over the session lifetime.
    pub fn base_chunk(&self) -> u64 {
        self.base_chunk
    }

    /// Number of whole chunks currently buffered.
    pub fn chunks_available(&self) -> u64 {
        (self.data.len() / self.bytes_per_chunk) as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append raw PCM bytes at the tail. Never fails and never moves
    /// `base_chunk`.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Copy out the bytes covering `[start_chunk, end_chunk)`.
    ///
    /// The end is clamped to the data actually buffered; a start below
    /// `base_chunk` is an error because those bytes are gone.
    pub fn read_range(&self, start_chunk: u64, end_chunk: u64) -> Result<Vec<u8>, RangeError> {
        if start_chunk > end_chunk {
            return Err(RangeError::Inverted {
                start: start_chunk,
                end: end_chunk,
            });
        }
        if start_chunk < self.base_chunk {
            return Err(RangeError::BelowBase {
                start: start_chunk,
                end: end_chunk,
                base: self.base_chunk,
            });
        }

        let from = ((start_chunk - self.base_chunk) as usize).saturating_mul(self.bytes_per_chunk);
        let to = ((end_chunk - self.base_chunk) as usize).saturating_mul(self.bytes_per_chunk);
        let from = from.min(self.data.len());
        let to = to.min(self.data.len());
        Ok(self.data[from..to].to_vec())
    }

    /// Discard everything before `chunk` and advance `base_chunk`. A no-op
    /// when `chunk <= base_chunk`; the watermark never moves backwards.
    pub fn truncate_until(&mut self, chunk: u64) {
        if chunk <= self.base_chunk {
            return;
        }
        let drop_bytes =
            ((chunk - self.base_chunk) as usize).saturating_mul(self.bytes_per_chunk);
        self.data.drain(..drop_bytes.min(self.data.len()));
        self.base_chunk = chunk;
    }
}
