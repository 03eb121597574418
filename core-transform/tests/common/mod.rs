//! Hand-rolled fakes shared by the integration tests: a scripted sample
//! source, one-slot codecs that copy payloads through, a recording muxer
//! and a procedural period source factory.

// Each test binary uses its own subset of these fakes.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use core_queue::{PeriodId, PeriodInfo};
use core_timeline::TIME_END_OF_SOURCE;
use core_transform::{
    Decoder, DecoderFactory, Encoder, EncoderFactory, ErrorCode, Format, Muxer,
    PeriodSourceFactory, PeriodStreams, ReadResult, Result, SampleBuffer, SampleSource,
    TrackType, TransformError,
};

// ============================================================================
// Sample source
// ============================================================================

pub struct FakeSource {
    track_type: TrackType,
    format: Format,
    format_delay: usize,
    samples: VecDeque<(i64, bool, Vec<u8>)>,
    stutter: bool,
    stutter_flip: bool,
}

impl FakeSource {
    pub fn new(track_type: TrackType, format: Format) -> Self {
        Self {
            track_type,
            format,
            format_delay: 0,
            samples: VecDeque::new(),
            stutter: false,
            stutter_flip: false,
        }
    }

    /// Makes the first `calls` format reads come back empty.
    pub fn with_format_delay(mut self, calls: usize) -> Self {
        self.format_delay = calls;
        self
    }

    /// Returns `NothingRead` on every other sample read.
    pub fn with_stutter(mut self) -> Self {
        self.stutter = true;
        self
    }

    pub fn push_sample(&mut self, time_us: i64, is_key_frame: bool, payload: &[u8]) {
        self.samples.push_back((time_us, is_key_frame, payload.to_vec()));
    }

    /// Samples every `interval_us` covering `[start_us, end_us)`, first
    /// sample a key frame.
    pub fn with_span(mut self, start_us: i64, end_us: i64, interval_us: i64) -> Self {
        let mut time_us = start_us;
        let mut first = true;
        while time_us < end_us {
            self.samples.push_back((time_us, first, vec![0xAB; 8]));
            first = false;
            time_us += interval_us;
        }
        self
    }
}

impl SampleSource for FakeSource {
    fn read_next(&mut self, buffer: &mut SampleBuffer, require_format: bool) -> Result<ReadResult> {
        if require_format {
            if self.format_delay > 0 {
                self.format_delay -= 1;
                return Ok(ReadResult::NothingRead);
            }
            return Ok(ReadResult::FormatRead(self.format.clone()));
        }
        if self.stutter {
            self.stutter_flip = !self.stutter_flip;
            if self.stutter_flip {
                return Ok(ReadResult::NothingRead);
            }
        }
        match self.samples.pop_front() {
            Some((time_us, is_key_frame, payload)) => {
                buffer.fill(&payload, time_us, is_key_frame);
                Ok(ReadResult::BufferRead)
            }
            None => Ok(ReadResult::EndOfStream),
        }
    }

    fn track_type(&self) -> TrackType {
        self.track_type
    }
}

// ============================================================================
// Codecs
// ============================================================================

/// One-slot decoder that "decodes" by copying the payload through and
/// surfaces the end-of-stream marker as an output frame.
#[derive(Default)]
pub struct FakeDecoder {
    input: SampleBuffer,
    input_pending: bool,
    output: SampleBuffer,
    output_ready: bool,
    eos_received: bool,
    ended: bool,
}

impl Decoder for FakeDecoder {
    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer> {
        if self.input_pending || self.eos_received {
            None
        } else {
            Some(&mut self.input)
        }
    }

    fn queue_input_buffer(&mut self) -> Result<()> {
        if self.input.is_end_of_stream {
            self.eos_received = true;
            self.input.clear();
        } else {
            self.input_pending = true;
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self) -> Result<Option<&SampleBuffer>> {
        if !self.output_ready {
            if self.input_pending {
                self.output.copy_from(&self.input);
                self.output_ready = true;
                self.input.clear();
                self.input_pending = false;
            } else if self.eos_received && !self.ended {
                self.output.set_end_of_stream();
                self.output_ready = true;
            }
        }
        Ok(self.output_ready.then_some(&self.output))
    }

    fn release_output_buffer(&mut self) -> Result<()> {
        if self.output.is_end_of_stream {
            self.ended = true;
        }
        self.output.clear();
        self.output_ready = false;
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}

/// One-slot encoder that "encodes" by copying the payload through.
pub struct FakeEncoder {
    format: Format,
    input: SampleBuffer,
    input_pending: bool,
    output: SampleBuffer,
    output_ready: bool,
    eos_received: bool,
}

impl FakeEncoder {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            input: SampleBuffer::new(),
            input_pending: false,
            output: SampleBuffer::new(),
            output_ready: false,
            eos_received: false,
        }
    }
}

impl Encoder for FakeEncoder {
    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer> {
        if self.input_pending || self.eos_received {
            None
        } else {
            Some(&mut self.input)
        }
    }

    fn queue_input_buffer(&mut self) -> Result<()> {
        if self.input.is_end_of_stream {
            self.eos_received = true;
            self.input.clear();
        } else {
            self.input_pending = true;
        }
        Ok(())
    }

    fn output_format(&self) -> Option<Format> {
        Some(self.format.clone())
    }

    fn dequeue_output_buffer(&mut self) -> Result<Option<&SampleBuffer>> {
        if !self.output_ready && self.input_pending {
            self.output.copy_from(&self.input);
            self.output_ready = true;
            self.input.clear();
            self.input_pending = false;
        }
        Ok(self.output_ready.then_some(&self.output))
    }

    fn release_output_buffer(&mut self) -> Result<()> {
        self.output.clear();
        self.output_ready = false;
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.eos_received && !self.output_ready && !self.input_pending
    }
}

pub struct FakeDecoderFactory {
    pub fail_with: Option<ErrorCode>,
}

impl FakeDecoderFactory {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { fail_with: None })
    }
}

impl DecoderFactory for FakeDecoderFactory {
    fn create_decoder(&self, _format: &Format) -> Result<Box<dyn Decoder>> {
        if let Some(code) = self.fail_with {
            return Err(TransformError::for_decoder(code, "decoder creation refused"));
        }
        Ok(Box::new(FakeDecoder::default()))
    }
}

pub struct FakeEncoderFactory {
    pub fail_with: Option<ErrorCode>,
}

impl FakeEncoderFactory {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { fail_with: None })
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn create_encoder(&self, format: &Format) -> Result<Box<dyn Encoder>> {
        if let Some(code) = self.fail_with {
            return Err(TransformError::for_encoder(code, "encoder creation refused"));
        }
        Ok(Box::new(FakeEncoder::new(format.clone())))
    }
}

// ============================================================================
// Muxer
// ============================================================================

#[derive(Debug, Default)]
pub struct MuxerLog {
    pub tracks: Vec<Format>,
    pub samples: Vec<(usize, i64, bool, usize)>,
    pub released: Option<bool>,
}

/// Muxer recording every call into a shared log.
pub struct RecordingMuxer {
    pub log: Arc<Mutex<MuxerLog>>,
    pub fail_on_release: bool,
}

impl RecordingMuxer {
    pub fn new() -> (Self, Arc<Mutex<MuxerLog>>) {
        let log = Arc::new(Mutex::new(MuxerLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                fail_on_release: false,
            },
            log,
        )
    }
}

impl Muxer for RecordingMuxer {
    fn add_track(&mut self, format: &Format) -> Result<usize> {
        let mut log = self.log.lock();
        log.tracks.push(format.clone());
        Ok(log.tracks.len() - 1)
    }

    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        is_key_frame: bool,
        time_us: i64,
    ) -> Result<()> {
        self.log
            .lock()
            .samples
            .push((track_index, time_us, is_key_frame, data.len()));
        Ok(())
    }

    fn release(&mut self, for_cancellation: bool) -> Result<()> {
        self.log.lock().released = Some(for_cancellation);
        if self.fail_on_release {
            return Err(TransformError::for_muxer(
                ErrorCode::MuxingFailed,
                "finalize failed",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Period source factory
// ============================================================================

/// Generates one scripted source per track for every span it is asked to
/// prepare, sampling the span's position range procedurally.
pub struct ScriptedSourceFactory {
    pub formats: Vec<(TrackType, Format)>,
    pub sample_interval_us: i64,
    pub created: Arc<Mutex<Vec<PeriodId>>>,
}

impl ScriptedSourceFactory {
    pub fn new(formats: Vec<(TrackType, Format)>, sample_interval_us: i64) -> Arc<Self> {
        Arc::new(Self {
            formats,
            sample_interval_us,
            created: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn created_ids(&self) -> Vec<PeriodId> {
        self.created.lock().clone()
    }
}

/// Position range covered by a span: `[start, end)` on the period axis.
pub fn span_range(info: &PeriodInfo) -> (i64, i64) {
    let start_us = info.start_position_us;
    let end_us = match info.end_position_us {
        Some(end_us) if end_us != TIME_END_OF_SOURCE => end_us,
        _ => info.duration_us.expect("spans prepared by the engine have known durations"),
    };
    (start_us, end_us)
}

#[async_trait]
impl PeriodSourceFactory for ScriptedSourceFactory {
    async fn create_streams(&self, id: &PeriodId, info: &PeriodInfo) -> Result<PeriodStreams> {
        self.created.lock().push(id.clone());
        let (start_us, end_us) = span_range(info);
        let streams = self
            .formats
            .iter()
            .map(|(track_type, format)| {
                Box::new(
                    FakeSource::new(*track_type, format.clone()).with_span(
                        start_us,
                        end_us,
                        self.sample_interval_us,
                    ),
                ) as Box<dyn SampleSource>
            })
            .collect();
        Ok(PeriodStreams::new(streams))
    }
}
