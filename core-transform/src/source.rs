//! # Upstream Sample Sources
//!
//! The read contract between a prepared period's sample streams and the
//! track renderers, plus the async factory that prepares streams for a
//! span when its holder is enqueued.

use async_trait::async_trait;

use core_queue::{PeriodId, PeriodInfo};

use crate::buffer::SampleBuffer;
use crate::error::Result;
use crate::format::{Format, TrackType};

/// Outcome of one non-blocking source read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// The stream's format was read. Delivered before any sample, and the
    /// buffer is left untouched.
    FormatRead(Format),
    /// One sample was read into the buffer.
    BufferRead,
    /// Nothing is available right now; poll again later.
    NothingRead,
    /// The stream is exhausted.
    EndOfStream,
}

/// One track's coded sample stream within a single span.
///
/// Reads are non-blocking polls. Timestamps are period-relative; mapping
/// onto the shared output axis is the renderer's job.
pub trait SampleSource: Send {
    /// Reads the next format or sample.
    ///
    /// With `require_format` set, the call returns
    /// [`ReadResult::FormatRead`] or [`ReadResult::NothingRead`] only:
    /// samples are held back until the caller has seen the format.
    fn read_next(&mut self, buffer: &mut SampleBuffer, require_format: bool) -> Result<ReadResult>;

    /// The track this stream belongs to.
    fn track_type(&self) -> TrackType;
}

/// The per-track streams of one prepared span.
pub struct PeriodStreams {
    streams: Vec<Box<dyn SampleSource>>,
}

impl PeriodStreams {
    /// Bundles streams for a span. One stream per track type.
    pub fn new(streams: Vec<Box<dyn SampleSource>>) -> Self {
        Self { streams }
    }

    /// The stream for `track_type`, if the span carries that track.
    pub fn stream_mut(&mut self, track_type: TrackType) -> Option<&mut (dyn SampleSource + 'static)> {
        self.streams
            .iter_mut()
            .find(|stream| stream.track_type() == track_type)
            .map(move |stream| stream.as_mut())
    }

    /// Track types present in this span.
    pub fn track_types(&self) -> Vec<TrackType> {
        self.streams.iter().map(|stream| stream.track_type()).collect()
    }
}

impl std::fmt::Debug for PeriodStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodStreams")
            .field("tracks", &self.track_types())
            .finish()
    }
}

/// Prepares the sample streams of a span when its holder is enqueued.
///
/// Opening media involves I/O, so preparation is async; everything after
/// it (the reads) is poll-style and synchronous.
#[async_trait]
pub trait PeriodSourceFactory: Send + Sync {
    /// Creates the streams for the span described by `id` and `info`.
    async fn create_streams(&self, id: &PeriodId, info: &PeriodInfo) -> Result<PeriodStreams>;
}
