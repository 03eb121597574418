//! # Muxer Boundary and Wrapper
//!
//! The [`Muxer`] trait is the external container-writer contract. The
//! [`MuxerWrapper`] sits above it and owns everything the engine needs to
//! get right around the raw writer: sample MIME capability checks per
//! container, the all-tracks-registered gate, per-track timestamp
//! monotonicity, bounded track interleaving and the two-phase release
//! that distinguishes cancellation from ordinary shutdown.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{ErrorCode, Result, TransformError};
use crate::format::{ContainerMime, Format, SampleMime, TrackType};

/// External container writer.
///
/// Implementations must tolerate being started lazily: the first
/// [`Muxer::write_sample`] call may arrive long after [`Muxer::add_track`],
/// and [`Muxer::release`] may arrive before any sample at all.
pub trait Muxer: Send {
    /// Registers a track and returns its index.
    fn add_track(&mut self, format: &Format) -> Result<usize>;

    /// Writes one coded sample to a registered track.
    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        is_key_frame: bool,
        time_us: i64,
    ) -> Result<()>;

    /// Stops and releases the writer. With `for_cancellation` the output
    /// is going to be discarded, so finalization failures are acceptable.
    fn release(&mut self, for_cancellation: bool) -> Result<()>;
}

/// Sample MIME types each container accepts, by track type.
fn supported_sample_mimes(container: ContainerMime, track_type: TrackType) -> &'static [SampleMime] {
    match (container, track_type) {
        (ContainerMime::Mp4, TrackType::Video) => &[
            SampleMime::H263,
            SampleMime::H264,
            SampleMime::Mp4v,
            SampleMime::H265,
        ],
        (ContainerMime::Mp4, TrackType::Audio) => {
            &[SampleMime::Aac, SampleMime::AmrNb, SampleMime::AmrWb]
        }
        (ContainerMime::Webm, TrackType::Video) => &[SampleMime::Vp8, SampleMime::Vp9],
        (ContainerMime::Webm, TrackType::Audio) => &[SampleMime::Vorbis],
    }
}

#[derive(Debug)]
struct TrackState {
    index: usize,
    last_time_us: Option<i64>,
    ended: bool,
}

/// Engine-side wrapper around a [`Muxer`].
///
/// Tracks must all be registered before the first sample is written, so
/// the underlying writer can lay out its header once. Until then
/// [`MuxerWrapper::can_write`] returns `false` and renderers hold their
/// output. Interleaving is balanced by only admitting writes for a track
/// that is not ahead of the least-written track.
pub struct MuxerWrapper {
    muxer: Box<dyn Muxer>,
    container: ContainerMime,
    expected_track_count: usize,
    tracks: HashMap<TrackType, TrackState>,
    released: bool,
}

impl MuxerWrapper {
    /// Creates a wrapper expecting `expected_track_count` tracks.
    pub fn new(muxer: Box<dyn Muxer>, container: ContainerMime, expected_track_count: usize) -> Self {
        Self {
            muxer,
            container,
            expected_track_count,
            tracks: HashMap::new(),
            released: false,
        }
    }

    /// The output container.
    pub fn container(&self) -> ContainerMime {
        self.container
    }

    /// Whether the container accepts samples of `mime` for its track
    /// type. Used eagerly at renderer configuration time, before any
    /// decode work is spent.
    pub fn supports_sample_mime(&self, mime: &SampleMime) -> bool {
        match mime.track_type() {
            Some(track_type) => supported_sample_mimes(self.container, track_type).contains(mime),
            None => false,
        }
    }

    /// Registers one track's output format.
    ///
    /// Fails with [`ErrorCode::MuxerSampleMimeUnsupported`] for formats
    /// the container cannot carry, and with a runtime check failure when
    /// more tracks are registered than were announced.
    pub fn add_track_format(&mut self, track_type: TrackType, format: &Format) -> Result<()> {
        if self.tracks.len() >= self.expected_track_count {
            return Err(TransformError::for_muxer(
                ErrorCode::FailedRuntimeCheck,
                format!(
                    "all {} tracks were already registered",
                    self.expected_track_count
                ),
            ));
        }
        if self.tracks.contains_key(&track_type) {
            return Err(TransformError::for_muxer(
                ErrorCode::FailedRuntimeCheck,
                format!("{track_type:?} track registered twice"),
            ));
        }
        if !self.supports_sample_mime(&format.mime) {
            return Err(TransformError::for_muxer(
                ErrorCode::MuxerSampleMimeUnsupported,
                format!(
                    "sample MIME {} is not supported in {} output",
                    format.mime,
                    self.container.as_str()
                ),
            ));
        }
        let index = self.muxer.add_track(format)?;
        debug!(?track_type, index, mime = %format.mime, "registered muxer track");
        self.tracks.insert(
            track_type,
            TrackState {
                index,
                last_time_us: None,
                ended: false,
            },
        );
        Ok(())
    }

    /// Whether every announced track has been registered.
    pub fn is_ready(&self) -> bool {
        self.tracks.len() == self.expected_track_count
    }

    /// Whether a sample for `track_type` may be written now.
    ///
    /// False until every track is registered, and false while another
    /// unfinished track has fallen behind this one (interleaving).
    pub fn can_write(&self, track_type: TrackType) -> bool {
        if !self.is_ready() {
            return false;
        }
        let Some(track) = self.tracks.get(&track_type) else {
            return false;
        };
        if track.ended {
            return false;
        }
        let own_time = track.last_time_us.unwrap_or(i64::MIN);
        self.tracks
            .values()
            .filter(|other| !other.ended)
            .all(|other| own_time <= other.last_time_us.unwrap_or(i64::MIN))
    }

    /// Writes one sample.
    ///
    /// Timestamps must be non-decreasing per track; a backwards timestamp
    /// is a contract violation by the pipeline and fails the transform.
    pub fn write_sample(
        &mut self,
        track_type: TrackType,
        data: &[u8],
        is_key_frame: bool,
        time_us: i64,
    ) -> Result<()> {
        let track = self.tracks.get_mut(&track_type).ok_or_else(|| {
            TransformError::for_muxer(
                ErrorCode::FailedRuntimeCheck,
                format!("sample for unregistered {track_type:?} track"),
            )
        })?;
        if let Some(last_time_us) = track.last_time_us {
            if time_us < last_time_us {
                return Err(TransformError::for_muxer(
                    ErrorCode::FailedRuntimeCheck,
                    format!(
                        "{track_type:?} timestamps went backwards: {time_us} < {last_time_us}"
                    ),
                ));
            }
        }
        self.muxer
            .write_sample(track.index, data, is_key_frame, time_us)?;
        track.last_time_us = Some(time_us);
        Ok(())
    }

    /// Marks a track as finished, excluding it from interleaving.
    pub fn end_track(&mut self, track_type: TrackType) {
        if let Some(track) = self.tracks.get_mut(&track_type) {
            if !track.ended {
                debug!(?track_type, last_time_us = ?track.last_time_us, "muxer track ended");
                track.ended = true;
            }
        }
    }

    /// Whether every registered track has been ended.
    pub fn all_tracks_ended(&self) -> bool {
        self.is_ready() && self.tracks.values().all(|track| track.ended)
    }

    /// Last written timestamp of the least-advanced unfinished track, if
    /// any samples were written. This is the transform position.
    pub fn min_track_time_us(&self) -> Option<i64> {
        self.tracks
            .values()
            .filter(|track| !track.ended)
            .map(|track| track.last_time_us.unwrap_or(0))
            .min()
            .or_else(|| self.tracks.values().filter_map(|t| t.last_time_us).max())
    }

    /// Last written timestamp per registered track.
    pub fn track_times_us(&self) -> Vec<(TrackType, i64)> {
        let mut times: Vec<(TrackType, i64)> = self
            .tracks
            .iter()
            .map(|(&track_type, state)| (track_type, state.last_time_us.unwrap_or(0)))
            .collect();
        times.sort_by_key(|(_, time_us)| *time_us);
        times
    }

    /// Releases the underlying writer.
    ///
    /// With `for_cancellation` the output is discarded, so stop failures
    /// are logged and suppressed instead of masking the cancellation.
    /// During ordinary shutdown they propagate.
    pub fn release(&mut self, for_cancellation: bool) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match self.muxer.release(for_cancellation) {
            Ok(()) => Ok(()),
            Err(error) if for_cancellation => {
                warn!(%error, "ignoring muxer stop failure during cancellation");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

impl std::fmt::Debug for MuxerWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxerWrapper")
            .field("container", &self.container)
            .field("expected_track_count", &self.expected_track_count)
            .field("registered", &self.tracks.len())
            .field("released", &self.released)
            .finish()
    }
}
