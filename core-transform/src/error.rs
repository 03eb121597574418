//! # Transform Error Types
//!
//! A single terminal error type for the transform engine, carrying a
//! stable numeric code, the component that failed and the moment the
//! failure was recorded.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Stable numeric codes identifying failure causes.
///
/// Grouped by range: 1xxx runtime, 2xxx I/O, 3xxx decoding, 4xxx
/// encoding, 5xxx muxing, 6xxx processing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A failure whose cause could not be identified.
    Unspecified = 1000,
    /// A runtime invariant did not hold. Indicates a bug, not bad data.
    FailedRuntimeCheck = 1001,

    /// An unidentified I/O failure.
    IoUnspecified = 2000,
    /// A file that should exist does not.
    IoFileNotFound = 2005,
    /// Missing permission to access the input or output.
    IoNoPermission = 2006,
    /// A read past the end of the available data.
    IoReadPositionOutOfRange = 2008,

    /// The decoder could not be created for the input format.
    DecoderInitFailed = 3001,
    /// Decoding a sample failed.
    DecodingFailed = 3002,
    /// The input format cannot be decoded at all.
    DecodingFormatUnsupported = 3003,

    /// The encoder could not be created for the output format.
    EncoderInitFailed = 4001,
    /// Encoding a frame failed.
    EncodingFailed = 4002,
    /// The requested output format cannot be encoded.
    EncodingFormatUnsupported = 4003,

    /// Writing or finalizing the container failed.
    MuxingFailed = 5001,
    /// The output sample MIME type is not supported by the muxer for the
    /// requested container. Detected eagerly at configuration time.
    MuxerSampleMimeUnsupported = 5002,

    /// A processing stage could not be initialized.
    ProcessingInitFailed = 6001,
    /// A processing stage failed while transforming a frame.
    ProcessingFailed = 6002,
}

/// The component a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// The upstream sample source.
    Source,
    /// A decoder instance or its factory.
    Decoder,
    /// An encoder instance or its factory.
    Encoder,
    /// The muxer or its wrapper.
    Muxer,
    /// An intermediate processing stage.
    Processor,
    /// The engine or one of its renderers.
    Engine,
}

/// Terminal failure of a transform.
///
/// Pipelines never retry internally: the first failure of a track's
/// pipeline is wrapped with the originating component's identity and
/// surfaced once through the engine. Retry and fallback policy belongs to
/// the caller.
#[derive(Debug, Error)]
#[error("{component:?} failed ({code:?}): {message}")]
pub struct TransformError {
    /// Stable failure code.
    pub code: ErrorCode,
    /// Component the failure originated in.
    pub component: Component,
    /// Human-readable description.
    pub message: String,
    /// When the failure was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl TransformError {
    /// Creates an error with the given code and component.
    pub fn new(code: ErrorCode, component: Component, message: impl Into<String>) -> Self {
        Self {
            code,
            component,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// A decoder failure.
    pub fn for_decoder(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Component::Decoder, message)
    }

    /// An encoder failure.
    pub fn for_encoder(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Component::Encoder, message)
    }

    /// A muxer failure.
    pub fn for_muxer(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Component::Muxer, message)
    }

    /// An upstream source failure.
    pub fn for_source(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Component::Source, message)
    }

    /// A failed invariant inside the engine. These indicate contract
    /// violations and should not be retried.
    pub fn runtime_check(component: Component, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedRuntimeCheck, component, message)
    }

    /// Numeric value of the error code.
    pub fn code_value(&self) -> u32 {
        self.code as u32
    }

    /// Whether the failure is an I/O failure, potentially retryable by
    /// caller policy.
    pub fn is_io(&self) -> bool {
        (2000..3000).contains(&self.code_value())
    }

    /// Whether the failure happened while creating a codec.
    pub fn is_codec_init(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::DecoderInitFailed | ErrorCode::EncoderInitFailed
        )
    }

    /// Whether the failure is a format capability mismatch, where picking
    /// a different target format may succeed.
    pub fn is_format_unsupported(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::DecodingFormatUnsupported
                | ErrorCode::EncodingFormatUnsupported
                | ErrorCode::MuxerSampleMimeUnsupported
        )
    }
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;
