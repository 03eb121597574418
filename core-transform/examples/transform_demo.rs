//! # Transform Engine Demo
//!
//! Drives an ad-stitched transform end to end with in-memory sources and
//! copy-through codecs, printing the muxer activity and the final
//! summary.
//!
//! Run with: `cargo run --example transform_demo --package core-transform`

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use core_queue::{PeriodId, PeriodInfo};
use core_timeline::{ad_state::AdPlaybackState, PeriodUid, Timeline, TIME_END_OF_SOURCE};
use core_transform::{
    ContainerMime, Decoder, DecoderFactory, Encoder, EncoderFactory, EngineConfig, EngineParams,
    Format, Muxer, PeriodSourceFactory, PeriodStreams, ReadResult, Result, SampleBuffer,
    SampleMime, SampleSource, TrackType, TransformEngine, TransformRequest,
};

const CONTENT_DURATION_US: i64 = 4_000_000;
const AD_DURATION_US: i64 = 1_000_000;
const SAMPLE_INTERVAL_US: i64 = 250_000;

// ============================================================================
// In-memory source
// ============================================================================

struct MemorySource {
    track_type: TrackType,
    format: Format,
    samples: VecDeque<(i64, bool)>,
}

impl SampleSource for MemorySource {
    fn read_next(&mut self, buffer: &mut SampleBuffer, require_format: bool) -> Result<ReadResult> {
        if require_format {
            return Ok(ReadResult::FormatRead(self.format.clone()));
        }
        match self.samples.pop_front() {
            Some((time_us, is_key_frame)) => {
                buffer.fill(&[0u8; 32], time_us, is_key_frame);
                Ok(ReadResult::BufferRead)
            }
            None => Ok(ReadResult::EndOfStream),
        }
    }

    fn track_type(&self) -> TrackType {
        self.track_type
    }
}

struct MemorySourceFactory;

#[async_trait]
impl PeriodSourceFactory for MemorySourceFactory {
    async fn create_streams(&self, id: &PeriodId, info: &PeriodInfo) -> Result<PeriodStreams> {
        println!(
            "preparing span {:?} [{} µs, duration {:?}]",
            id, info.start_position_us, info.duration_us
        );
        let start_us = info.start_position_us;
        let end_us = match info.end_position_us {
            Some(end_us) if end_us != TIME_END_OF_SOURCE => end_us,
            _ => info.duration_us.unwrap_or(start_us),
        };
        let mut samples = VecDeque::new();
        let mut time_us = start_us;
        let mut first = true;
        while time_us < end_us {
            samples.push_back((time_us, first));
            first = false;
            time_us += SAMPLE_INTERVAL_US;
        }
        Ok(PeriodStreams::new(vec![Box::new(MemorySource {
            track_type: TrackType::Audio,
            format: Format::audio(SampleMime::Aac, 44_100, 2),
            samples,
        })]))
    }
}

// ============================================================================
// Copy-through codecs
// ============================================================================

#[derive(Default)]
struct CopyDecoder {
    input: SampleBuffer,
    input_pending: bool,
    output: SampleBuffer,
    output_ready: bool,
    eos_received: bool,
    ended: bool,
}

impl Decoder for CopyDecoder {
    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer> {
        (!self.input_pending && !self.eos_received).then_some(&mut self.input)
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

struct CopyEncoder {
    format: Format,
    input: SampleBuffer,
    input_pending: bool,
    output: SampleBuffer,
    output_ready: bool,
    eos_received: bool,
}

impl Encoder for CopyEncoder {
    fn dequeue_input_buffer(&mut self) -> Option<&mut SampleBuffer> {
        (!self.input_pending && !self.eos_received).then_some(&mut self.input)
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

struct CopyCodecFactory;

impl DecoderFactory for CopyCodecFactory {
    fn create_decoder(&self, _format: &Format) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(CopyDecoder::default()))
    }
}

impl EncoderFactory for CopyCodecFactory {
    fn create_encoder(&self, format: &Format) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(CopyEncoder {
            format: format.clone(),
            input: SampleBuffer::new(),
            input_pending: false,
            output: SampleBuffer::new(),
            output_ready: false,
            eos_received: false,
        }))
    }
}

// ============================================================================
// Printing muxer
// ============================================================================

struct PrintingMuxer {
    tracks: usize,
    samples: usize,
}

impl Muxer for PrintingMuxer {
    fn add_track(&mut self, format: &Format) -> Result<usize> {
        println!("muxer: track {} registered ({})", self.tracks, format.mime);
        self.tracks += 1;
        Ok(self.tracks - 1)
    }

    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        is_key_frame: bool,
        time_us: i64,
    ) -> Result<()> {
        self.samples += 1;
        if is_key_frame {
            println!(
                "muxer: key frame on track {track_index} at {time_us} µs ({} bytes)",
                data.len()
            );
        }
        Ok(())
    }

    fn release(&mut self, for_cancellation: bool) -> Result<()> {
        println!(
            "muxer: released after {} samples (cancelled: {for_cancellation})",
            self.samples
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // A four-second period with a loaded preroll and midroll.
    let uid: PeriodUid = "demo-content".into();
    let ads = AdPlaybackState::new(Uuid::new_v4(), &[0, CONTENT_DURATION_US / 2])
        .with_content_duration_us(CONTENT_DURATION_US)
        .with_ad_count(0, 1)
        .with_ad_uri(0, 0, "https://ads.example/preroll.mp4")
        .with_ad_duration_us(0, 0, AD_DURATION_US)
        .with_ad_count(1, 1)
        .with_ad_uri(1, 0, "https://ads.example/midroll.mp4")
        .with_ad_duration_us(1, 0, AD_DURATION_US);
    let timeline = Timeline::single_period(uid.clone(), CONTENT_DURATION_US)
        .with_ad_playback_state(&uid, ads);

    let (engine, _codec_events) = TransformEngine::new(EngineParams {
        config: EngineConfig::default(),
        request: TransformRequest::default(),
        timeline,
        start_period_uid: uid,
        start_position_us: 0,
        tracks: vec![TrackType::Audio],
        muxer: Box::new(PrintingMuxer {
            tracks: 0,
            samples: 0,
        }),
        container: ContainerMime::Mp4,
        source_factory: Arc::new(MemorySourceFactory),
        decoder_factory: Arc::new(CopyCodecFactory),
        encoder_factory: Arc::new(CopyCodecFactory),
    })?;

    let summary = engine.run(CancellationToken::new()).await?;
    println!("summary: {}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
