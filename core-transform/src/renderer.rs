//! # Track Renderers
//!
//! The per-track driver between an upstream sample source, a sample
//! pipeline and the muxer wrapper. Each scheduling tick it pulls at most
//! one input buffer, drives the pipeline one step, and drains at most one
//! ready output buffer, so a single thread can interleave every track.

use std::sync::Arc;

use tracing::debug;

use crate::buffer::SampleBuffer;
use crate::codec::{DecoderFactory, EncoderFactory};
use crate::error::{Component, ErrorCode, Result, TransformError};
use crate::format::{SampleMime, TrackType};
use crate::muxer::MuxerWrapper;
use crate::pipeline::SamplePipeline;
use crate::request::TransformRequest;
use crate::slowmo::SlowMotionFlattener;
use crate::source::{ReadResult, SampleSource};

/// Driver state per track.
///
/// `Unconfigured → Configured` happens on the first successful format
/// read; `Configured → Streaming` on the first queued sample; `Ended`
/// once the pipeline reports end of stream at the final span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Unconfigured,
    Configured,
    Streaming,
    Ended,
}

enum FeedOutcome {
    Nothing,
    Dropped,
    EndOfStream,
    Read(i64),
}

/// Drives one track through configure, stream and drain.
pub struct TrackRenderer {
    track_type: TrackType,
    request: TransformRequest,
    decoder_factory: Arc<dyn DecoderFactory>,
    encoder_factory: Arc<dyn EncoderFactory>,

    state: RendererState,
    pipeline: Option<SamplePipeline>,
    flattener: Option<SlowMotionFlattener>,
    scratch: SampleBuffer,

    muxer_track_added: bool,
    added_output_mime: Option<SampleMime>,

    /// Offset added to span-relative sample times to place them on the
    /// output axis.
    stream_offset_us: i64,
    /// Output-axis timestamp of the newest sample read from the source.
    last_sample_time_us: Option<i64>,

    /// The current span's source reported end of stream.
    input_ended: bool,
    /// No further spans follow: drain the pipeline via end of stream.
    end_of_input: bool,
    /// The pipeline is being drained to cross a non-same-stream span
    /// boundary; when it ends, reconfigure instead of ending the track.
    draining_for_boundary: bool,
    /// Stream offset to apply after the boundary drain completes.
    pending_stream_offset_us: i64,
    eos_queued: bool,
}

impl TrackRenderer {
    /// Creates an unconfigured renderer.
    pub fn new(
        track_type: TrackType,
        request: TransformRequest,
        decoder_factory: Arc<dyn DecoderFactory>,
        encoder_factory: Arc<dyn EncoderFactory>,
    ) -> Self {
        Self {
            track_type,
            request,
            decoder_factory,
            encoder_factory,
            state: RendererState::Unconfigured,
            pipeline: None,
            flattener: None,
            scratch: SampleBuffer::new(),
            muxer_track_added: false,
            added_output_mime: None,
            stream_offset_us: 0,
            last_sample_time_us: None,
            input_ended: false,
            end_of_input: false,
            draining_for_boundary: false,
            pending_stream_offset_us: 0,
            eos_queued: false,
        }
    }

    /// The track this renderer drives.
    pub fn track_type(&self) -> TrackType {
        self.track_type
    }

    /// Current driver state.
    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Whether the pipeline has fully ended.
    pub fn is_ended(&self) -> bool {
        self.state == RendererState::Ended
    }

    /// Whether the current span's input is exhausted.
    pub fn input_exhausted(&self) -> bool {
        self.input_ended
    }

    /// Output-axis timestamp of the newest sample read, if any. The
    /// minimum across tracks is the transform position.
    pub fn last_sample_time_us(&self) -> Option<i64> {
        self.last_sample_time_us
    }

    /// Whether the renderer is draining its pipeline across a stream
    /// boundary.
    pub fn is_draining(&self) -> bool {
        self.draining_for_boundary
    }

    /// Tells the renderer that no span follows the current one: once the
    /// source is exhausted the pipeline is drained via end of stream.
    /// Returns whether this was news.
    pub fn signal_end_of_input(&mut self) -> bool {
        let changed = !self.end_of_input;
        self.end_of_input = true;
        changed
    }

    /// Continues into the next span without touching the pipeline. Only
    /// valid across same-stream transitions.
    pub fn continue_same_stream(&mut self, stream_offset_us: i64) {
        debug!(track = ?self.track_type, stream_offset_us, "continuing in same stream");
        self.stream_offset_us = stream_offset_us;
        self.input_ended = false;
    }

    /// Starts a drain across a non-same-stream boundary: the pipeline is
    /// fed an end-of-stream marker, and once it ends it is discarded and
    /// the renderer reconfigures from the next span's format.
    pub fn begin_stream_boundary(&mut self, stream_offset_us: i64) {
        if self.pipeline.is_none() {
            // Nothing to drain yet: switch spans directly.
            self.stream_offset_us = stream_offset_us;
            self.input_ended = false;
            return;
        }
        debug!(track = ?self.track_type, stream_offset_us, "draining across stream boundary");
        self.draining_for_boundary = true;
        self.end_of_input = true;
        self.input_ended = true;
        self.pending_stream_offset_us = stream_offset_us;
    }

    /// Drops the pipeline and span state for a queue reset. The muxer
    /// track registration survives: output continues into the same track.
    pub fn reset_for_new_position(&mut self, stream_offset_us: i64) {
        debug!(track = ?self.track_type, "resetting renderer");
        self.pipeline = None;
        self.flattener = None;
        if self.state != RendererState::Ended {
            self.state = RendererState::Unconfigured;
        }
        self.stream_offset_us = stream_offset_us;
        self.input_ended = false;
        self.end_of_input = false;
        self.draining_for_boundary = false;
        self.eos_queued = false;
    }

    /// Runs the driver until it can make no further progress this tick.
    /// Returns whether anything happened.
    pub fn render(
        &mut self,
        source: &mut dyn SampleSource,
        muxer: &mut MuxerWrapper,
    ) -> Result<bool> {
        if self.is_ended() {
            return Ok(false);
        }
        let mut progressed = false;
        loop {
            if !self.ensure_configured(source, muxer)? {
                break;
            }
            let fed_muxer = self.feed_muxer_from_pipeline(muxer)?;
            if self.is_ended() {
                progressed = true;
                break;
            }
            if self.pipeline.is_none() {
                // A boundary drain just completed: reconfigure from the
                // new span's format on the next iteration.
                progressed = true;
                continue;
            }
            let pipeline_progressed = match self.pipeline.as_mut() {
                Some(pipeline) => pipeline.process_data()?,
                None => false,
            };
            let fed_pipeline = self.feed_pipeline_from_input(source)?;
            if !fed_muxer && !pipeline_progressed && !fed_pipeline {
                break;
            }
            progressed = true;
        }
        Ok(progressed)
    }

    /// Attempts to read the input format and choose the pipeline.
    /// Returns `false` (retry next tick) while the format is not yet
    /// available.
    fn ensure_configured(
        &mut self,
        source: &mut dyn SampleSource,
        muxer: &mut MuxerWrapper,
    ) -> Result<bool> {
        if self.pipeline.is_some() {
            return Ok(true);
        }
        let format = match source.read_next(&mut self.scratch, true)? {
            ReadResult::FormatRead(format) => format,
            _ => return Ok(false),
        };

        // When the caller did not override the output MIME, the input
        // MIME is the output MIME: reject it before any decode work if
        // the muxer cannot carry it.
        if self.request.mime_override(self.track_type).is_none()
            && !muxer.supports_sample_mime(&format.mime)
        {
            return Err(TransformError::for_muxer(
                ErrorCode::MuxerSampleMimeUnsupported,
                format!(
                    "output sample MIME inferred from the input is not supported by the muxer: {}",
                    format.mime
                ),
            ));
        }

        let pipeline = if self.request.allows_passthrough(self.track_type, &format) {
            SamplePipeline::passthrough(format.clone())
        } else {
            match self.track_type {
                TrackType::Audio => SamplePipeline::audio_transcode(
                    &format,
                    &self.request,
                    self.decoder_factory.as_ref(),
                    self.encoder_factory.as_ref(),
                )?,
                TrackType::Video => SamplePipeline::video_transcode(
                    &format,
                    &self.request,
                    self.decoder_factory.as_ref(),
                    self.encoder_factory.as_ref(),
                )?,
            }
        };

        // Across span boundaries every pipeline must keep producing the
        // MIME registered with the muxer.
        if let (Some(added), Some(output_format)) =
            (&self.added_output_mime, pipeline.output_format())
        {
            if added != &output_format.mime {
                return Err(TransformError::for_encoder(
                    ErrorCode::EncodingFormatUnsupported,
                    format!(
                        "span output MIME {} does not match registered track MIME {}",
                        output_format.mime, added
                    ),
                ));
            }
        }

        self.flattener = (self.track_type == TrackType::Video
            && self.request.flatten_for_slow_motion
            && format.is_slow_motion())
        .then(|| SlowMotionFlattener::new(&format));

        debug!(track = ?self.track_type, mime = %format.mime, "renderer configured");
        self.pipeline = Some(pipeline);
        self.state = RendererState::Configured;
        Ok(true)
    }

    /// Drains one ready output buffer into the muxer, registering the
    /// track format first if needed.
    fn feed_muxer_from_pipeline(&mut self, muxer: &mut MuxerWrapper) -> Result<bool> {
        let pipeline = self.pipeline.as_mut().expect("configured");
        if !self.muxer_track_added {
            let Some(output_format) = pipeline.output_format() else {
                return Ok(false);
            };
            muxer.add_track_format(self.track_type, &output_format)?;
            self.added_output_mime = Some(output_format.mime);
            self.muxer_track_added = true;
        }
        if pipeline.is_ended() {
            if self.draining_for_boundary {
                // Old stream fully drained: reconfigure from the next
                // span without ending the muxer track.
                debug!(track = ?self.track_type, "boundary drain complete");
                self.pipeline = None;
                self.flattener = None;
                self.state = RendererState::Unconfigured;
                self.stream_offset_us = self.pending_stream_offset_us;
                self.draining_for_boundary = false;
                self.end_of_input = false;
                self.input_ended = false;
                self.eos_queued = false;
                return Ok(true);
            }
            muxer.end_track(self.track_type);
            self.state = RendererState::Ended;
            debug!(track = ?self.track_type, "renderer ended");
            return Ok(false);
        }
        if !muxer.can_write(self.track_type) {
            return Ok(false);
        }
        let Some(output) = pipeline.get_output_buffer()? else {
            return Ok(false);
        };
        let time_us = output.time_us + self.stream_offset_us;
        muxer.write_sample(self.track_type, &output.data, output.is_key_frame, time_us)?;
        pipeline.release_output_buffer()?;
        Ok(true)
    }

    /// Pulls one sample from the source into the pipeline, honoring the
    /// slow-motion drop hook.
    fn feed_pipeline_from_input(&mut self, source: &mut dyn SampleSource) -> Result<bool> {
        let pipeline = self.pipeline.as_mut().expect("configured");
        if self.eos_queued {
            return Ok(false);
        }
        if self.input_ended {
            if !self.end_of_input {
                // Waiting for the engine to hand over the next span.
                return Ok(false);
            }
            let Some(input) = pipeline.dequeue_input_buffer() else {
                return Ok(false);
            };
            input.set_end_of_stream();
            pipeline.queue_input_buffer()?;
            self.eos_queued = true;
            return Ok(true);
        }

        let Some(input) = pipeline.dequeue_input_buffer() else {
            return Ok(false);
        };
        let outcome = match source.read_next(input, false)? {
            ReadResult::NothingRead => FeedOutcome::Nothing,
            ReadResult::EndOfStream => FeedOutcome::EndOfStream,
            ReadResult::FormatRead(_) => {
                return Err(TransformError::runtime_check(
                    Component::Engine,
                    "mid-stream format changes are not supported",
                ))
            }
            ReadResult::BufferRead => {
                let dropped = match self.flattener.as_mut() {
                    Some(flattener) => flattener.drop_or_transform(input),
                    None => false,
                };
                if dropped {
                    input.clear();
                    FeedOutcome::Dropped
                } else {
                    FeedOutcome::Read(input.time_us)
                }
            }
        };

        match outcome {
            FeedOutcome::Nothing => Ok(false),
            FeedOutcome::Dropped => Ok(true),
            FeedOutcome::EndOfStream => {
                debug!(track = ?self.track_type, "span input exhausted");
                self.input_ended = true;
                Ok(true)
            }
            FeedOutcome::Read(time_us) => {
                self.last_sample_time_us = Some(time_us + self.stream_offset_us);
                if self.state == RendererState::Configured {
                    self.state = RendererState::Streaming;
                }
                pipeline.queue_input_buffer()?;
                Ok(true)
            }
        }
    }
}

impl std::fmt::Debug for TrackRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackRenderer")
            .field("track_type", &self.track_type)
            .field("state", &self.state)
            .field("input_ended", &self.input_ended)
            .field("end_of_input", &self.end_of_input)
            .finish()
    }
}
