//! # Transform Engine
//!
//! Sample pipelines, track renderers and the cooperative engine loop
//! that pumps media from per-period sample sources through decode →
//! process → encode stages into a container muxer, scheduled span by
//! span over the period queue.
//!
//! ## Overview
//!
//! - [`SamplePipeline`]: per-track passthrough or transcode pipeline
//!   with strict one-buffer backpressure at each boundary.
//! - [`TrackRenderer`]: the per-track driver state machine between a
//!   sample source, a pipeline and the muxer wrapper.
//! - [`MuxerWrapper`]: capability checks, lazy start, timestamp
//!   monotonicity and interleaving above the raw [`Muxer`] boundary.
//! - [`TransformEngine`]: the single-owner loop driving everything,
//!   including ad-stitched span transitions and timeline updates.
//!
//! Codecs, muxers and sample sources are external collaborators behind
//! traits; this crate orchestrates them and owns the scheduling.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod muxer;
pub mod pipeline;
pub mod renderer;
pub mod request;
pub mod slowmo;
pub mod source;

pub use buffer::SampleBuffer;
pub use codec::{
    codec_event_channel, CodecEvent, CodecEventSender, Decoder, DecoderFactory, Encoder,
    EncoderFactory,
};
pub use config::EngineConfig;
pub use engine::{
    EngineParams, EngineState, ProgressSnapshot, TransformEngine, TransformProgress,
    TransformSummary,
};
pub use error::{Component, ErrorCode, Result, TransformError};
pub use format::{ContainerMime, Format, SampleMime, SlowMotionSegment, TrackType};
pub use muxer::{Muxer, MuxerWrapper};
pub use pipeline::SamplePipeline;
pub use renderer::{RendererState, TrackRenderer};
pub use request::TransformRequest;
pub use source::{PeriodSourceFactory, PeriodStreams, ReadResult, SampleSource};
