//! # Sample Formats
//!
//! Descriptions of coded sample streams as they flow between sources,
//! pipelines and the muxer.

use serde::{Deserialize, Serialize};

/// Kind of track a sample stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Video,
}

/// Coded sample MIME type.
///
/// The common types this engine routes are first-class variants; anything
/// else travels as [`SampleMime::Other`] with its full MIME string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMime {
    /// Advanced Audio Coding.
    Aac,
    /// AMR narrow-band speech.
    AmrNb,
    /// AMR wide-band speech.
    AmrWb,
    /// Ogg Vorbis audio.
    Vorbis,
    /// H.263 video.
    H263,
    /// H.264/AVC video.
    H264,
    /// H.265/HEVC video.
    H265,
    /// MPEG-4 part 2 video.
    Mp4v,
    /// VP8 video.
    Vp8,
    /// VP9 video.
    Vp9,
    /// Any other MIME type, carried verbatim.
    Other(String),
}

impl SampleMime {
    /// The full MIME string.
    pub fn as_str(&self) -> &str {
        match self {
            SampleMime::Aac => "audio/mp4a-latm",
            SampleMime::AmrNb => "audio/3gpp",
            SampleMime::AmrWb => "audio/amr-wb",
            SampleMime::Vorbis => "audio/vorbis",
            SampleMime::H263 => "video/3gpp",
            SampleMime::H264 => "video/avc",
            SampleMime::H265 => "video/hevc",
            SampleMime::Mp4v => "video/mp4v-es",
            SampleMime::Vp8 => "video/x-vnd.on2.vp8",
            SampleMime::Vp9 => "video/x-vnd.on2.vp9",
            SampleMime::Other(mime) => mime,
        }
    }

    /// Track type implied by the MIME type, if recognizable.
    pub fn track_type(&self) -> Option<TrackType> {
        match self {
            SampleMime::Aac | SampleMime::AmrNb | SampleMime::AmrWb | SampleMime::Vorbis => {
                Some(TrackType::Audio)
            }
            SampleMime::H263
            | SampleMime::H264
            | SampleMime::H265
            | SampleMime::Mp4v
            | SampleMime::Vp8
            | SampleMime::Vp9 => Some(TrackType::Video),
            SampleMime::Other(mime) => {
                if mime.starts_with("audio/") {
                    Some(TrackType::Audio)
                } else if mime.starts_with("video/") {
                    Some(TrackType::Video)
                } else {
                    None
                }
            }
        }
    }
}

impl std::fmt::Display for SampleMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output container MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerMime {
    /// MP4 container.
    Mp4,
    /// WebM container.
    Webm,
}

impl ContainerMime {
    /// The full MIME string.
    pub fn as_str(&self) -> &str {
        match self {
            ContainerMime::Mp4 => "video/mp4",
            ContainerMime::Webm => "video/webm",
        }
    }
}

/// A slow-motion segment tagged on recorded content: between `start_us`
/// and `end_us` the recording is meant to play back slowed by
/// `speed_divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowMotionSegment {
    pub start_us: i64,
    pub end_us: i64,
    /// How many times slower the segment plays back (2, 4, 8...).
    pub speed_divisor: u32,
}

/// Description of one coded sample stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    /// Coded sample MIME type.
    pub mime: SampleMime,
    /// Sample rate in Hz, for audio.
    pub sample_rate: Option<u32>,
    /// Channel count, for audio.
    pub channel_count: Option<u16>,
    /// Frame width in pixels, for video.
    pub width: Option<u32>,
    /// Frame height in pixels, for video.
    pub height: Option<u32>,
    /// Clockwise rotation to apply on display, in degrees.
    pub rotation_degrees: u32,
    /// Average bitrate in bits per second, if known.
    pub average_bitrate: Option<u32>,
    /// Slow-motion segments tagged on the stream, if any.
    pub slow_motion_segments: Vec<SlowMotionSegment>,
}

impl Format {
    /// Creates an audio format.
    pub fn audio(mime: SampleMime, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            mime,
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            width: None,
            height: None,
            rotation_degrees: 0,
            average_bitrate: None,
            slow_motion_segments: Vec::new(),
        }
    }

    /// Creates a video format.
    pub fn video(mime: SampleMime, width: u32, height: u32) -> Self {
        Self {
            mime,
            sample_rate: None,
            channel_count: None,
            width: Some(width),
            height: Some(height),
            rotation_degrees: 0,
            average_bitrate: None,
            slow_motion_segments: Vec::new(),
        }
    }

    /// Sets the display rotation.
    pub fn with_rotation_degrees(mut self, rotation_degrees: u32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    /// Sets the average bitrate.
    pub fn with_average_bitrate(mut self, bitrate: u32) -> Self {
        self.average_bitrate = Some(bitrate);
        self
    }

    /// Tags slow-motion segments on the stream.
    pub fn with_slow_motion_segments(mut self, segments: Vec<SlowMotionSegment>) -> Self {
        self.slow_motion_segments = segments;
        self
    }

    /// Track type of the stream.
    pub fn track_type(&self) -> Option<TrackType> {
        self.mime.track_type()
    }

    /// Whether the stream carries slow-motion metadata.
    pub fn is_slow_motion(&self) -> bool {
        !self.slow_motion_segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_track_types() {
        assert_eq!(SampleMime::Aac.track_type(), Some(TrackType::Audio));
        assert_eq!(SampleMime::H264.track_type(), Some(TrackType::Video));
        assert_eq!(
            SampleMime::Other("audio/flac".into()).track_type(),
            Some(TrackType::Audio)
        );
        assert_eq!(
            SampleMime::Other("application/x-subrip".into()).track_type(),
            None
        );
    }

    #[test]
    fn format_constructors_fill_the_right_side() {
        let audio = Format::audio(SampleMime::Aac, 44_100, 2);
        assert_eq!(audio.track_type(), Some(TrackType::Audio));
        assert_eq!(audio.sample_rate, Some(44_100));
        assert_eq!(audio.width, None);

        let video = Format::video(SampleMime::H264, 1920, 1080).with_rotation_degrees(90);
        assert_eq!(video.track_type(), Some(TrackType::Video));
        assert_eq!(video.height, Some(1080));
        assert_eq!(video.rotation_degrees, 90);
        assert!(!video.is_slow_motion());
    }

    #[test]
    fn slow_motion_tagging() {
        let video = Format::video(SampleMime::H264, 1280, 720).with_slow_motion_segments(vec![
            SlowMotionSegment {
                start_us: 1_000_000,
                end_us: 2_000_000,
                speed_divisor: 4,
            },
        ]);
        assert!(video.is_slow_motion());
    }
}
