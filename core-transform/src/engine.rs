//! # Transform Engine
//!
//! The single-owner cooperative loop that drives a transform: it keeps
//! the period queue topped up from the timeline, pumps every track
//! renderer, walks the reading pointer across span boundaries and
//! finalizes the muxer.
//!
//! ## Scheduling model
//!
//! One task owns the queue, the pipelines and the renderers; no two
//! stages of one transform ever run concurrently, so the pipeline needs
//! no locks. The loop is driven by polling: each tick makes at most
//! bounded progress per track and then yields. When nothing progressed,
//! the loop parks on the codec event channel (fed from codec callback
//! threads), a timeline update, cancellation or a short idle tick.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use core_queue::{PeriodQueue, PlaybackStart, INITIAL_RENDERER_POSITION_OFFSET_US};
use core_timeline::{PeriodUid, Timeline, TIME_END_OF_SOURCE};

use crate::codec::{codec_event_channel, CodecEvent, CodecEventSender, DecoderFactory, EncoderFactory};
use crate::config::EngineConfig;
use crate::error::{Component, Result, TransformError};
use crate::format::{ContainerMime, TrackType};
use crate::muxer::{Muxer, MuxerWrapper};
use crate::renderer::TrackRenderer;
use crate::request::TransformRequest;
use crate::source::{PeriodSourceFactory, PeriodStreams};

/// Everything needed to assemble a [`TransformEngine`].
pub struct EngineParams {
    pub config: EngineConfig,
    pub request: TransformRequest,
    /// Initial content description.
    pub timeline: Timeline,
    /// Period to start in.
    pub start_period_uid: PeriodUid,
    /// Start position within that period, in microseconds.
    pub start_position_us: i64,
    /// Track types to transform. One renderer and one muxer track each.
    pub tracks: Vec<TrackType>,
    /// Output container writer.
    pub muxer: Box<dyn Muxer>,
    /// Output container type.
    pub container: ContainerMime,
    pub source_factory: Arc<dyn PeriodSourceFactory>,
    pub decoder_factory: Arc<dyn DecoderFactory>,
    pub encoder_factory: Arc<dyn EncoderFactory>,
}

/// Coarse engine state for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Shared progress snapshot, readable from any thread.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub state: EngineState,
    /// Output position: the least-advanced track's written timestamp.
    pub position_us: i64,
    /// Spans currently queued.
    pub queued_spans: usize,
}

/// Cloneable handle onto a running engine's progress.
#[derive(Clone)]
pub struct TransformProgress {
    inner: Arc<Mutex<ProgressSnapshot>>,
}

impl TransformProgress {
    /// The latest snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.lock().clone()
    }
}

/// Final report of a finished or cancelled transform.
#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    pub completed: bool,
    pub cancelled: bool,
    /// Output duration: the furthest written timestamp.
    pub duration_us: i64,
    /// Last written timestamp per track.
    pub track_times_us: Vec<(TrackType, i64)>,
    /// The request the output was produced under.
    pub request: TransformRequest,
}

/// The transform engine. Create with [`TransformEngine::new`], then
/// consume with [`TransformEngine::run`].
pub struct TransformEngine {
    config: EngineConfig,
    request: TransformRequest,
    timeline: Timeline,
    queue: PeriodQueue<PeriodStreams>,
    start: PlaybackStart,
    renderers: Vec<TrackRenderer>,
    muxer: MuxerWrapper,
    source_factory: Arc<dyn PeriodSourceFactory>,
    codec_events: mpsc::Receiver<CodecEvent>,
    timeline_updates: Option<mpsc::Receiver<Timeline>>,
    /// Offset keeping output timestamps monotonic across queue resets.
    output_rebase_us: i64,
    progress: Arc<Mutex<ProgressSnapshot>>,
}

impl TransformEngine {
    /// Assembles an engine. The returned [`CodecEventSender`] should be
    /// handed to codec implementations that complete asynchronously, so
    /// their callbacks can wake the loop.
    pub fn new(params: EngineParams) -> Result<(Self, CodecEventSender)> {
        params.config.validate().map_err(|message| {
            TransformError::runtime_check(Component::Engine, message)
        })?;
        if params.tracks.is_empty() {
            return Err(TransformError::runtime_check(
                Component::Engine,
                "at least one track is required",
            ));
        }
        let mut queue = PeriodQueue::new();
        let period_id = queue.resolve_period_id_for_ads(
            &params.timeline,
            &params.start_period_uid,
            params.start_position_us,
        );
        let start = PlaybackStart {
            period_id,
            position_us: params.start_position_us,
            requested_content_position_us: None,
        };
        let renderers = params
            .tracks
            .iter()
            .map(|&track_type| {
                TrackRenderer::new(
                    track_type,
                    params.request.clone(),
                    Arc::clone(&params.decoder_factory),
                    Arc::clone(&params.encoder_factory),
                )
            })
            .collect::<Vec<_>>();
        let muxer = MuxerWrapper::new(params.muxer, params.container, renderers.len());
        let (event_sender, codec_events) = codec_event_channel(params.config.codec_event_capacity);
        let progress = Arc::new(Mutex::new(ProgressSnapshot {
            state: EngineState::Running,
            position_us: 0,
            queued_spans: 0,
        }));
        let engine = Self {
            config: params.config,
            request: params.request,
            timeline: params.timeline,
            queue,
            start,
            renderers,
            muxer,
            source_factory: params.source_factory,
            codec_events,
            timeline_updates: None,
            output_rebase_us: 0,
            progress,
        };
        Ok((engine, event_sender))
    }

    /// Attaches a channel delivering replacement timelines (manifest
    /// refreshes, ad load updates). The engine reconciles its queue on
    /// every delivery.
    pub fn with_timeline_updates(mut self, receiver: mpsc::Receiver<Timeline>) -> Self {
        self.timeline_updates = Some(receiver);
        self
    }

    /// A cloneable handle onto this engine's progress.
    pub fn progress(&self) -> TransformProgress {
        TransformProgress {
            inner: Arc::clone(&self.progress),
        }
    }

    /// Runs the transform to completion, failure or cancellation.
    ///
    /// Cancellation releases the muxer with `for_cancellation` set, so
    /// finalization errors on the discarded output are suppressed; they
    /// are never suppressed on the ordinary shutdown path.
    #[instrument(skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<TransformSummary> {
        info!(
            container = self.muxer.container().as_str(),
            tracks = self.renderers.len(),
            "starting transform"
        );
        match self.run_loop(&cancel).await {
            Ok(completed) => {
                self.muxer.release(!completed)?;
                let state = if completed {
                    EngineState::Completed
                } else {
                    EngineState::Cancelled
                };
                self.update_progress(state);
                info!(completed, "transform finished");
                Ok(self.summary(completed))
            }
            Err(error) => {
                self.update_progress(EngineState::Failed);
                // Partial output is kept; a failed transform is not a
                // cancellation.
                if let Err(release_error) = self.muxer.release(false) {
                    warn!(%release_error, "muxer release failed after transform error");
                }
                Err(error)
            }
        }
    }

    /// Returns `Ok(true)` when the transform completed, `Ok(false)` when
    /// it was cancelled.
    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<bool> {
        loop {
            if cancel.is_cancelled() {
                info!("transform cancelled");
                return Ok(false);
            }
            self.drain_timeline_updates()?;
            self.fill_queue().await?;
            let rendered = self.render_tick()?;
            let advanced = self.maybe_advance_spans()?;
            self.update_progress(EngineState::Running);
            if self.muxer.all_tracks_ended() {
                return Ok(true);
            }
            if rendered || advanced {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                event = self.codec_events.recv() => {
                    if event.is_some() {
                        debug!("woken by codec event");
                    }
                }
                _ = tokio::time::sleep(self.config.idle_tick) => {}
            }
        }
    }

    fn drain_timeline_updates(&mut self) -> Result<()> {
        let Some(receiver) = self.timeline_updates.as_mut() else {
            return Ok(());
        };
        let mut latest = None;
        while let Ok(timeline) = receiver.try_recv() {
            latest = Some(timeline);
        }
        if let Some(timeline) = latest {
            self.apply_timeline(timeline)?;
        }
        Ok(())
    }

    /// Installs a replacement timeline and reconciles the queue against
    /// it. An unabsorbable change falls back to a reset at the current
    /// read position; that is the expected escalation path, not an
    /// error.
    fn apply_timeline(&mut self, timeline: Timeline) -> Result<()> {
        self.timeline = timeline;
        if self.queue.is_empty() {
            return Ok(());
        }
        let renderer_position_us = self.renderer_position_us();
        let max_read_us = self.max_renderer_read_position_us();
        let handled =
            self.queue
                .update_queued_periods(&self.timeline, renderer_position_us, max_read_us);
        if handled {
            debug!("timeline change absorbed in place");
            Ok(())
        } else {
            info!("timeline change requires a reset at the current position");
            self.reset_at_current_position()
        }
    }

    fn reset_at_current_position(&mut self) -> Result<()> {
        let (period_uid, period_position_us) = {
            let reading = self.queue.reading().ok_or_else(|| {
                TransformError::runtime_check(Component::Engine, "reset without a reading span")
            })?;
            let max_read_us = self.max_renderer_read_position_us();
            let read_renderer_us = if max_read_us == TIME_END_OF_SOURCE {
                match reading.info.duration_us {
                    Some(duration_us) => reading.to_renderer_time_us(duration_us),
                    None => reading.renderer_offset_us(),
                }
            } else {
                max_read_us
            };
            let position_us = reading
                .to_period_time_us(read_renderer_us)
                .max(reading.info.start_position_us);
            (reading.info.id.period_uid.clone(), position_us)
        };
        self.queue.clear();

        // Keep output timestamps monotonic across the reset: the first
        // sample after it lands exactly on the written watermark.
        let watermark_us = self.muxer.min_track_time_us().unwrap_or(0);
        self.output_rebase_us = watermark_us - period_position_us;
        for renderer in &mut self.renderers {
            renderer.reset_for_new_position(self.output_rebase_us);
        }

        let period_id =
            self.queue
                .resolve_period_id_for_ads(&self.timeline, &period_uid, period_position_us);
        debug!(?period_id, period_position_us, "restarting queue");
        self.start = PlaybackStart {
            period_id,
            position_us: period_position_us,
            requested_content_position_us: None,
        };
        Ok(())
    }

    /// Tops the queue up to the configured lookahead.
    async fn fill_queue(&mut self) -> Result<()> {
        while self.queue.len() < self.config.lookahead_spans {
            // Offsets extend from the loading span's duration; an
            // unloaded ad blocks further lookahead until it loads.
            if self
                .queue
                .loading()
                .map_or(false, |loading| loading.info.duration_us.is_none())
            {
                break;
            }
            let renderer_position_us = self.renderer_position_us();
            let Some(info) =
                self.queue
                    .next_period_info(&self.timeline, renderer_position_us, &self.start)
            else {
                break;
            };
            // An ad whose media has not loaded cannot be prepared yet.
            if info.id.is_ad() && info.duration_us.is_none() {
                break;
            }
            debug!(id = ?info.id, "preparing span");
            let streams = self.source_factory.create_streams(&info.id, &info).await?;
            let holder = self.queue.enqueue_period(info);
            holder.streams = Some(streams);
        }
        Ok(())
    }

    /// Pumps every renderer against the reading span once.
    fn render_tick(&mut self) -> Result<bool> {
        let Some(reading) = self.queue.reading_mut() else {
            return Ok(false);
        };
        let Some(streams) = reading.streams.as_mut() else {
            return Ok(false);
        };
        let mut progressed = false;
        for renderer in self.renderers.iter_mut() {
            let source = streams.stream_mut(renderer.track_type()).ok_or_else(|| {
                TransformError::runtime_check(
                    Component::Engine,
                    format!("span is missing a {:?} stream", renderer.track_type()),
                )
            })?;
            if renderer.render(source, &mut self.muxer)? {
                progressed = true;
            }
        }
        Ok(progressed)
    }

    /// Advances the reading pointer when every renderer exhausted the
    /// current span, and the playing pointer when output passed a span's
    /// end.
    fn maybe_advance_spans(&mut self) -> Result<bool> {
        self.maybe_advance_playing();

        let ready = self.renderers.iter().all(|renderer| {
            renderer.is_ended() || (renderer.input_exhausted() && !renderer.is_draining())
        });
        if !ready {
            return Ok(false);
        }
        if self.queue.reading_is_loading() {
            let is_final = self
                .queue
                .reading()
                .map_or(false, |holder| holder.info.is_final);
            let mut signaled = false;
            if is_final {
                // Nothing follows: drain the pipelines to their end.
                for renderer in &mut self.renderers {
                    signaled |= renderer.signal_end_of_input();
                }
            }
            // Otherwise the next span has not loaded yet; wait.
            return Ok(signaled);
        }

        let same_stream = self
            .queue
            .reading()
            .expect("non-empty queue")
            .info
            .is_followed_by_transition_to_same_stream;
        let new_offset_us = {
            let holder = self.queue.advance_reading_period();
            holder.renderer_offset_us() - INITIAL_RENDERER_POSITION_OFFSET_US
                + self.output_rebase_us
        };
        for renderer in &mut self.renderers {
            if renderer.is_ended() {
                continue;
            }
            if same_stream {
                renderer.continue_same_stream(new_offset_us);
            } else {
                renderer.begin_stream_boundary(new_offset_us);
            }
        }
        info!(same_stream, "advanced reading to the next span");
        Ok(true)
    }

    fn maybe_advance_playing(&mut self) {
        loop {
            if self.queue.len() <= 1 || self.queue.playing_is_reading() {
                return;
            }
            let end_renderer_us = {
                let playing = self.queue.playing().expect("non-empty queue");
                match playing.info.duration_us {
                    Some(duration_us) => playing.to_renderer_time_us(duration_us),
                    None => return,
                }
            };
            if self.renderer_position_us() < end_renderer_us {
                return;
            }
            let holder = self.queue.advance_playing_period();
            debug!(id = ?holder.info.id, "span fully written");
        }
    }

    /// The output watermark mapped onto the renderer axis.
    fn renderer_position_us(&self) -> i64 {
        let output_us = self.muxer.min_track_time_us().unwrap_or(0);
        output_us - self.output_rebase_us + INITIAL_RENDERER_POSITION_OFFSET_US
    }

    /// How far the renderers have read, on the renderer axis.
    /// [`TIME_END_OF_SOURCE`] when every renderer read its span to the
    /// end.
    fn max_renderer_read_position_us(&self) -> i64 {
        let all_exhausted = self
            .renderers
            .iter()
            .all(|renderer| renderer.input_exhausted() || renderer.is_ended());
        if all_exhausted {
            return TIME_END_OF_SOURCE;
        }
        self.renderers
            .iter()
            .filter_map(|renderer| renderer.last_sample_time_us())
            .max()
            .map(|time_us| time_us - self.output_rebase_us + INITIAL_RENDERER_POSITION_OFFSET_US)
            .unwrap_or(INITIAL_RENDERER_POSITION_OFFSET_US)
    }

    fn update_progress(&self, state: EngineState) {
        let mut progress = self.progress.lock();
        progress.state = state;
        progress.position_us = self.muxer.min_track_time_us().unwrap_or(0);
        progress.queued_spans = self.queue.len();
    }

    fn summary(&self, completed: bool) -> TransformSummary {
        let track_times_us = self.muxer.track_times_us();
        TransformSummary {
            completed,
            cancelled: !completed,
            duration_us: track_times_us
                .iter()
                .map(|(_, time_us)| *time_us)
                .max()
                .unwrap_or(0),
            track_times_us,
            request: self.request.clone(),
        }
    }
}

impl std::fmt::Debug for TransformEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformEngine")
            .field("queued_spans", &self.queue.len())
            .field("renderers", &self.renderers.len())
            .finish()
    }
}
