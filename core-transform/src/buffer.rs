//! # Sample Buffers
//!
//! The unit of ownership transfer between pipeline stages. At every
//! pipeline boundary at most one buffer is live on the input side and one
//! on the output side; the poll-style dequeue/queue calls hand the same
//! buffer back and forth instead of allocating per sample.

use bytes::BytesMut;

/// One coded sample or raw frame travelling through a pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    /// Payload bytes. Empty for pure end-of-stream markers.
    pub data: BytesMut,
    /// Presentation timestamp in microseconds.
    pub time_us: i64,
    /// Whether the sample starts a decodable unit (sync sample).
    pub is_key_frame: bool,
    /// Whether this buffer marks the end of the stream. An end-of-stream
    /// buffer carries no payload of its own.
    pub is_end_of_stream: bool,
}

impl SampleBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the buffer for reuse.
    pub fn clear(&mut self) {
        self.data.clear();
        self.time_us = 0;
        self.is_key_frame = false;
        self.is_end_of_stream = false;
    }

    /// Fills the buffer with a payload and timestamp.
    pub fn fill(&mut self, payload: &[u8], time_us: i64, is_key_frame: bool) {
        self.data.clear();
        self.data.extend_from_slice(payload);
        self.time_us = time_us;
        self.is_key_frame = is_key_frame;
        self.is_end_of_stream = false;
    }

    /// Marks the buffer as the end-of-stream sentinel.
    pub fn set_end_of_stream(&mut self) {
        self.data.clear();
        self.is_end_of_stream = true;
    }

    /// Copies another buffer's contents into this one.
    pub fn copy_from(&mut self, other: &SampleBuffer) {
        self.data.clear();
        self.data.extend_from_slice(&other.data);
        self.time_us = other.time_us;
        self.is_key_frame = other.is_key_frame;
        self.is_end_of_stream = other.is_end_of_stream;
    }

    /// Whether the buffer carries no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
