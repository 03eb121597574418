//! # Transform Requests
//!
//! What the caller wants done to the media: target sample MIME types,
//! resolution, rotation and slow-motion flattening. The request also
//! determines, per track, whether samples can pass through untouched or
//! must take the transcode path.

use serde::{Deserialize, Serialize};

use crate::format::{Format, SampleMime, TrackType};

/// An immutable media transformation request.
///
/// Build one with [`TransformRequest::builder`]. The default request
/// changes nothing, which lets every track pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRequest {
    /// Target audio sample MIME type, or `None` to keep the input's.
    pub audio_mime: Option<SampleMime>,
    /// Target video sample MIME type, or `None` to keep the input's.
    pub video_mime: Option<SampleMime>,
    /// Target output height in pixels, or `None` to keep the input's.
    /// Width scales to preserve the aspect ratio.
    pub output_height: Option<u32>,
    /// Additional clockwise rotation in degrees. Zero means no change.
    pub rotation_degrees: u32,
    /// Whether slow-motion-tagged input should be flattened: the tags are
    /// removed and the tagged stretches are actually slowed down in the
    /// output.
    pub flatten_for_slow_motion: bool,
}

impl Default for TransformRequest {
    fn default() -> Self {
        Self {
            audio_mime: None,
            video_mime: None,
            output_height: None,
            rotation_degrees: 0,
            flatten_for_slow_motion: false,
        }
    }
}

impl TransformRequest {
    /// Starts building a request.
    pub fn builder() -> TransformRequestBuilder {
        TransformRequestBuilder {
            request: Self::default(),
        }
    }

    /// The target MIME override for `track_type`, if any.
    pub fn mime_override(&self, track_type: TrackType) -> Option<&SampleMime> {
        match track_type {
            TrackType::Audio => self.audio_mime.as_ref(),
            TrackType::Video => self.video_mime.as_ref(),
        }
    }

    /// Whether samples of `input_format` can be forwarded unmodified.
    ///
    /// Passthrough requires the requested output MIME (if any) to match
    /// the input, no resolution or rotation change, and no slow-motion
    /// flattening on slow-motion-tagged content. Any mismatch forces the
    /// transcode path.
    pub fn allows_passthrough(&self, track_type: TrackType, input_format: &Format) -> bool {
        if let Some(mime) = self.mime_override(track_type) {
            if mime != &input_format.mime {
                return false;
            }
        }
        if self.flatten_for_slow_motion && input_format.is_slow_motion() {
            return false;
        }
        if track_type == TrackType::Video {
            if let Some(height) = self.output_height {
                if Some(height) != input_format.height {
                    return false;
                }
            }
            if self.rotation_degrees != 0 {
                return false;
            }
        }
        true
    }
}

/// Builder for [`TransformRequest`].
#[derive(Debug, Clone)]
pub struct TransformRequestBuilder {
    request: TransformRequest,
}

impl TransformRequestBuilder {
    /// Sets the target audio sample MIME type.
    pub fn audio_mime(mut self, mime: SampleMime) -> Self {
        self.request.audio_mime = Some(mime);
        self
    }

    /// Sets the target video sample MIME type.
    pub fn video_mime(mut self, mime: SampleMime) -> Self {
        self.request.video_mime = Some(mime);
        self
    }

    /// Sets the output height in pixels.
    pub fn output_height(mut self, height: u32) -> Self {
        self.request.output_height = Some(height);
        self
    }

    /// Sets an additional clockwise rotation in degrees.
    pub fn rotation_degrees(mut self, degrees: u32) -> Self {
        self.request.rotation_degrees = degrees % 360;
        self
    }

    /// Requests slow-motion flattening.
    pub fn flatten_for_slow_motion(mut self, flatten: bool) -> Self {
        self.request.flatten_for_slow_motion = flatten;
        self
    }

    /// Finishes the request.
    pub fn build(self) -> TransformRequest {
        self.request
    }
}
