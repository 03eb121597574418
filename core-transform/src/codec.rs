//! # Codec Boundaries
//!
//! Decoder and encoder contracts consumed by the transcode pipelines, and
//! the event channel codec implementations use to hand completion signals
//! from their callback threads into the owning engine loop.
//!
//! All buffer calls are non-blocking polls: `dequeue_*` returns `None`
//! instead of waiting, so a single thread can interleave many tracks. At
//! most one input and one output buffer are live per codec instance.

use tokio::sync::mpsc;
use tracing::trace;

use crate::buffer::SampleBuffer;
use crate::error::Result;
use crate::format::{Format, TrackType};

/// A decoder turning coded samples into raw frames.
pub trait Decoder: Send {
    /// Returns the input buffer to fill, or `None` while the previously
    /// dequeued buffer has not been queued yet or the decoder is saturated.
    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer>;

    /// Commits the previously dequeued input buffer. Queue a buffer with
    /// its end-of-stream flag set to signal the end of input.
    fn queue_input_buffer(&mut self) -> Result<()>;

    /// Returns the next decoded frame without consuming it, if one is
    /// ready.
    fn dequeue_output_buffer(&mut self) -> Result<Option<&SampleBuffer>>;

    /// Releases the frame returned by the last successful
    /// [`Decoder::dequeue_output_buffer`].
    fn release_output_buffer(&mut self) -> Result<()>;

    /// Whether the end-of-stream marker has propagated through the
    /// decoder and every frame has been released.
    fn is_ended(&self) -> bool;
}

/// An encoder turning raw frames into coded samples.
pub trait Encoder: Send {
    /// Returns the input buffer to fill, or `None` while the previously
    /// dequeued buffer has not been queued yet or the encoder is saturated.
    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer>;

    /// Commits the previously dequeued input buffer. Queue a buffer with
    /// its end-of-stream flag set to signal the end of input.
    fn queue_input_buffer(&mut self) -> Result<()>;

    /// The actual coded output format. Available no later than the first
    /// output buffer, and required by the muxer before the first sample
    /// write.
    fn output_format(&self) -> Option<Format>;

    /// Returns the next coded sample without consuming it, if one is
    /// ready.
    fn dequeue_output_buffer(&mut self) -> Result<Option<&SampleBuffer>>;

    /// Releases the sample returned by the last successful
    /// [`Encoder::dequeue_output_buffer`].
    fn release_output_buffer(&mut self) -> Result<()>;

    /// Whether the end-of-stream marker has propagated through the
    /// encoder and every sample has been released.
    fn is_ended(&self) -> bool;
}

/// Creates decoders for input formats.
///
/// Creation failures surface as
/// [`ErrorCode::DecoderInitFailed`](crate::error::ErrorCode::DecoderInitFailed)
/// or
/// [`ErrorCode::DecodingFormatUnsupported`](crate::error::ErrorCode::DecodingFormatUnsupported).
pub trait DecoderFactory: Send + Sync {
    fn create_decoder(&self, format: &Format) -> Result<Box<dyn Decoder>>;
}

/// Creates encoders for requested output formats.
///
/// Creation failures surface as
/// [`ErrorCode::EncoderInitFailed`](crate::error::ErrorCode::EncoderInitFailed)
/// or
/// [`ErrorCode::EncodingFormatUnsupported`](crate::error::ErrorCode::EncodingFormatUnsupported).
pub trait EncoderFactory: Send + Sync {
    fn create_encoder(&self, format: &Format) -> Result<Box<dyn Encoder>>;
}

/// A completion signal from a codec callback context.
///
/// Codec implementations backed by asynchronous hardware callbacks must
/// not touch pipeline state from their callback threads. Instead they
/// push an event here; the engine drains the channel on its own thread
/// and polls the affected pipeline again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecEvent {
    /// A codec produced output or freed input capacity for a track.
    Progress(TrackType),
}

/// Sending half of the codec event channel. Cheap to clone and safe to
/// use from callback threads.
#[derive(Debug, Clone)]
pub struct CodecEventSender {
    sender: mpsc::Sender<CodecEvent>,
}

impl CodecEventSender {
    /// Signals progress for a track. Never blocks: when the bounded
    /// channel is full the event is dropped, which is harmless because
    /// the engine polls pipelines on its next tick anyway.
    pub fn signal_progress(&self, track_type: TrackType) {
        if self.sender.try_send(CodecEvent::Progress(track_type)).is_err() {
            trace!(?track_type, "codec event channel full, dropping signal");
        }
    }
}

/// Creates the bounded hand-off channel between codec callback contexts
/// and the engine loop.
pub fn codec_event_channel(capacity: usize) -> (CodecEventSender, mpsc::Receiver<CodecEvent>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (CodecEventSender { sender }, receiver)
}
