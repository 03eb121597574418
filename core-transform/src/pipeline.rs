//! # Sample Pipelines
//!
//! Per-track pipelines that accept coded input buffers in arrival order
//! and produce output buffers for the muxer, either unchanged
//! (passthrough) or via decode → process → re-encode (transcode).
//!
//! All variants share one poll-style capability interface with strict
//! single-buffer backpressure: at most one input buffer and one output
//! buffer are live at the pipeline boundary at any time. Pipelines never
//! retry internally; the first failure is terminal for the track.

use crate::buffer::SampleBuffer;
use crate::codec::{Decoder, DecoderFactory, Encoder, EncoderFactory};
use crate::error::Result;
use crate::format::{Format, TrackType};
use crate::request::TransformRequest;
use crate::slowmo::SlowMotionTimeMap;

/// A per-track sample pipeline.
///
/// The variant is chosen by the renderer at configuration time; the
/// engine only ever talks to the uniform interface below.
#[derive(Debug)]
pub enum SamplePipeline {
    /// Samples pass through unmodified.
    Passthrough(PassthroughPipeline),
    /// Audio decode → process → encode.
    Audio(TranscodePipeline),
    /// Video decode → process → encode.
    Video(TranscodePipeline),
}

impl SamplePipeline {
    /// Creates a passthrough pipeline forwarding `format` unchanged.
    pub fn passthrough(format: Format) -> Self {
        SamplePipeline::Passthrough(PassthroughPipeline::new(format))
    }

    /// Creates the audio transcode pipeline for `input_format`.
    pub fn audio_transcode(
        input_format: &Format,
        request: &TransformRequest,
        decoder_factory: &dyn DecoderFactory,
        encoder_factory: &dyn EncoderFactory,
    ) -> Result<Self> {
        let mut output_format = input_format.clone();
        if let Some(mime) = request.mime_override(TrackType::Audio) {
            output_format.mime = mime.clone();
        }
        // Flattening consumes the tags; the output carries none.
        output_format.slow_motion_segments = Vec::new();

        let decoder = decoder_factory.create_decoder(input_format)?;
        let encoder = encoder_factory.create_encoder(&output_format)?;
        let processor = if request.flatten_for_slow_motion && input_format.is_slow_motion() {
            FrameProcessor::SlowMotionTime(SlowMotionTimeMap::new(
                &input_format.slow_motion_segments,
            ))
        } else {
            FrameProcessor::None
        };
        Ok(SamplePipeline::Audio(TranscodePipeline::new(
            decoder, encoder, processor,
        )))
    }

    /// Creates the video transcode pipeline for `input_format`.
    pub fn video_transcode(
        input_format: &Format,
        request: &TransformRequest,
        decoder_factory: &dyn DecoderFactory,
        encoder_factory: &dyn EncoderFactory,
    ) -> Result<Self> {
        let mut output_format = input_format.clone();
        if let Some(mime) = request.mime_override(TrackType::Video) {
            output_format.mime = mime.clone();
        }
        if let (Some(target_height), Some(width), Some(height)) =
            (request.output_height, input_format.width, input_format.height)
        {
            if height != 0 {
                // Scale width to preserve the aspect ratio.
                output_format.width = Some((width * target_height + height / 2) / height);
                output_format.height = Some(target_height);
            }
        }
        output_format.rotation_degrees =
            (input_format.rotation_degrees + request.rotation_degrees) % 360;
        output_format.slow_motion_segments = Vec::new();

        let decoder = decoder_factory.create_decoder(input_format)?;
        let encoder = encoder_factory.create_encoder(&output_format)?;
        // Timestamp flattening for video happens in the renderer's drop
        // hook before samples enter the pipeline.
        Ok(SamplePipeline::Video(TranscodePipeline::new(
            decoder,
            encoder,
            FrameProcessor::None,
        )))
    }

    /// Returns the input buffer to fill, or `None` while the previous
    /// input has not been consumed.
    pub fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer> {
        match self {
            SamplePipeline::Passthrough(p) => p.dequeue_input_buffer(),
            SamplePipeline::Audio(p) | SamplePipeline::Video(p) => p.dequeue_input_buffer(),
        }
    }

    /// Commits the previously dequeued input buffer.
    pub fn queue_input_buffer(&mut self) -> Result<()> {
        match self {
            SamplePipeline::Passthrough(p) => p.queue_input_buffer(),
            SamplePipeline::Audio(p) | SamplePipeline::Video(p) => p.queue_input_buffer(),
        }
    }

    /// Drives the internal stages one step. Returns whether any state
    /// changed, so the driver knows whether to keep polling.
    pub fn process_data(&mut self) -> Result<bool> {
        match self {
            SamplePipeline::Passthrough(_) => Ok(false),
            SamplePipeline::Audio(p) | SamplePipeline::Video(p) => p.process_data(),
        }
    }

    /// The format to register with the muxer. Must be available before
    /// the first sample write downstream.
    pub fn output_format(&self) -> Option<Format> {
        match self {
            SamplePipeline::Passthrough(p) => Some(p.format.clone()),
            SamplePipeline::Audio(p) | SamplePipeline::Video(p) => p.encoder.output_format(),
        }
    }

    /// Returns the next ready output buffer, if any.
    pub fn get_output_buffer(&mut self) -> Result<Option<&SampleBuffer>> {
        match self {
            SamplePipeline::Passthrough(p) => Ok(p.get_output_buffer()),
            SamplePipeline::Audio(p) | SamplePipeline::Video(p) => p.get_output_buffer(),
        }
    }

    /// Releases the buffer returned by the last successful
    /// [`SamplePipeline::get_output_buffer`].
    pub fn release_output_buffer(&mut self) -> Result<()> {
        match self {
            SamplePipeline::Passthrough(p) => {
                p.release_output_buffer();
                Ok(())
            }
            SamplePipeline::Audio(p) | SamplePipeline::Video(p) => p.release_output_buffer(),
        }
    }

    /// Whether an end-of-stream buffer has propagated all the way
    /// through and no output remains pending.
    pub fn is_ended(&self) -> bool {
        match self {
            SamplePipeline::Passthrough(p) => p.is_ended(),
            SamplePipeline::Audio(p) | SamplePipeline::Video(p) => p.is_ended(),
        }
    }
}

/// Pipeline that forwards samples without re-encoding.
#[derive(Debug)]
pub struct PassthroughPipeline {
    buffer: SampleBuffer,
    format: Format,
    has_pending_buffer: bool,
}

impl PassthroughPipeline {
    fn new(format: Format) -> Self {
        Self {
            buffer: SampleBuffer::new(),
            format,
            has_pending_buffer: false,
        }
    }

    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer> {
        if self.has_pending_buffer {
            None
        } else {
            Some(&mut self.buffer)
        }
    }

    fn queue_input_buffer(&mut self) -> Result<()> {
        self.has_pending_buffer = true;
        Ok(())
    }

    fn get_output_buffer(&mut self) -> Option<&SampleBuffer> {
        if self.has_pending_buffer && !self.buffer.is_end_of_stream {
            Some(&self.buffer)
        } else {
            None
        }
    }

    fn release_output_buffer(&mut self) {
        self.buffer.clear();
        self.has_pending_buffer = false;
    }

    fn is_ended(&self) -> bool {
        self.buffer.is_end_of_stream
    }
}

/// What happens to decoded frames between the decoder and the encoder.
#[derive(Debug)]
enum FrameProcessor {
    /// Frames pass unmodified.
    None,
    /// Frame timestamps are remapped onto the flattened output axis.
    SlowMotionTime(SlowMotionTimeMap),
}

impl FrameProcessor {
    fn process(&mut self, frame: &mut SampleBuffer) {
        match self {
            FrameProcessor::None => {}
            FrameProcessor::SlowMotionTime(map) => {
                frame.time_us = map.map_us(frame.time_us);
            }
        }
    }
}

/// Decode → process → encode pipeline shared by the audio and video
/// variants.
pub struct TranscodePipeline {
    decoder: Box<dyn Decoder>,
    encoder: Box<dyn Encoder>,
    processor: FrameProcessor,
    input: SampleBuffer,
    has_pending_input: bool,
}

impl TranscodePipeline {
    fn new(
        decoder: Box<dyn Decoder>,
        encoder: Box<dyn Encoder>,
        processor: FrameProcessor,
    ) -> Self {
        Self {
            decoder,
            encoder,
            processor,
            input: SampleBuffer::new(),
            has_pending_input: false,
        }
    }

    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer> {
        if self.has_pending_input {
            None
        } else {
            Some(&mut self.input)
        }
    }

    fn queue_input_buffer(&mut self) -> Result<()> {
        self.has_pending_input = true;
        Ok(())
    }

    fn process_data(&mut self) -> Result<bool> {
        let mut progressed = false;
        if self.feed_encoder_from_decoder()? {
            progressed = true;
        }
        if self.feed_decoder_from_input()? {
            progressed = true;
        }
        Ok(progressed)
    }

    /// Moves the pending input buffer into the decoder, if it has
    /// capacity.
    fn feed_decoder_from_input(&mut self) -> Result<bool> {
        if !self.has_pending_input {
            return Ok(false);
        }
        let Some(target) = self.decoder.dequeue_input_buffer() else {
            return Ok(false);
        };
        target.copy_from(&self.input);
        self.decoder.queue_input_buffer()?;
        self.input.clear();
        self.has_pending_input = false;
        Ok(true)
    }

    /// Moves one decoded frame through the processor into the encoder.
    fn feed_encoder_from_decoder(&mut self) -> Result<bool> {
        let frame = match self.decoder.dequeue_output_buffer()? {
            Some(frame) => frame,
            None => return Ok(false),
        };
        let Some(target) = self.encoder.dequeue_input_buffer() else {
            return Ok(false);
        };
        target.copy_from(frame);
        if !target.is_end_of_stream {
            self.processor.process(target);
        }
        self.encoder.queue_input_buffer()?;
        self.decoder.release_output_buffer()?;
        Ok(true)
    }

    fn get_output_buffer(&mut self) -> Result<Option<&SampleBuffer>> {
        match self.encoder.dequeue_output_buffer()? {
            Some(buffer) if buffer.is_end_of_stream => Ok(None),
            other => Ok(other),
        }
    }

    fn release_output_buffer(&mut self) -> Result<()> {
        self.encoder.release_output_buffer()
    }

    fn is_ended(&self) -> bool {
        self.encoder.is_ended()
    }
}

impl std::fmt::Debug for TranscodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodePipeline")
            .field("has_pending_input", &self.has_pending_input)
            .field("processor", &self.processor)
            .finish()
    }
}
