//! End-to-end tests for the transform engine: single-period transforms,
//! ad-stitched span sequencing, timeline updates, cancellation and
//! failure propagation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{
    FakeDecoderFactory, FakeEncoderFactory, MuxerLog, RecordingMuxer, ScriptedSourceFactory,
};
use core_timeline::{ad_state::AdPlaybackState, PeriodUid, Timeline, TIME_END_OF_SOURCE};
use core_transform::{
    ContainerMime, EngineConfig, EngineParams, ErrorCode, Format, SampleMime, TrackType,
    TransformEngine, TransformRequest,
};
use parking_lot::Mutex;

const CONTENT_DURATION_US: i64 = 3_000_000;
const AD_DURATION_US: i64 = 1_000_000;
const SAMPLE_INTERVAL_US: i64 = 100_000;

struct Setup {
    engine: TransformEngine,
    log: Arc<Mutex<MuxerLog>>,
    factory: Arc<ScriptedSourceFactory>,
}

fn setup(timeline: Timeline, uid: &PeriodUid, request: TransformRequest, tracks: Vec<TrackType>) -> Setup {
    let formats = tracks
        .iter()
        .map(|&track_type| {
            let format = match track_type {
                TrackType::Audio => Format::audio(SampleMime::Aac, 44_100, 2),
                TrackType::Video => Format::video(SampleMime::H264, 1280, 720),
            };
            (track_type, format)
        })
        .collect();
    let factory = ScriptedSourceFactory::new(formats, SAMPLE_INTERVAL_US);
    let source_factory: Arc<dyn core_transform::PeriodSourceFactory> = factory.clone();
    let (muxer, log) = RecordingMuxer::new();
    let (engine, _events) = TransformEngine::new(EngineParams {
        config: EngineConfig::default(),
        request,
        timeline,
        start_period_uid: uid.clone(),
        start_position_us: 0,
        tracks,
        muxer: Box::new(muxer),
        container: ContainerMime::Mp4,
        source_factory,
        decoder_factory: FakeDecoderFactory::working(),
        encoder_factory: FakeEncoderFactory::working(),
    })
    .expect("engine assembles");
    Setup { engine, log, factory }
}

fn assert_monotonic_per_track(log: &MuxerLog) {
    let mut last: std::collections::HashMap<usize, i64> = std::collections::HashMap::new();
    for &(track_index, time_us, _, _) in &log.samples {
        if let Some(&previous) = last.get(&track_index) {
            assert!(
                time_us >= previous,
                "track {track_index} went backwards: {time_us} < {previous}"
            );
        }
        last.insert(track_index, time_us);
    }
}

#[tokio::test]
async fn plain_transform_writes_every_sample_and_completes() {
    let uid: PeriodUid = "content".into();
    let timeline = Timeline::single_period(uid.clone(), CONTENT_DURATION_US);
    let setup = setup(
        timeline,
        &uid,
        TransformRequest::default(),
        vec![TrackType::Audio, TrackType::Video],
    );

    let summary = setup
        .engine
        .run(CancellationToken::new())
        .await
        .expect("transform completes");

    assert!(summary.completed);
    assert!(!summary.cancelled);
    let log = setup.log.lock();
    assert_eq!(log.tracks.len(), 2);
    assert_eq!(log.released, Some(false));
    // 30 samples per track over three seconds.
    let per_track = (CONTENT_DURATION_US / SAMPLE_INTERVAL_US) as usize;
    assert_eq!(log.samples.len(), per_track * 2);
    assert_monotonic_per_track(&log);
    assert_eq!(summary.duration_us, CONTENT_DURATION_US - SAMPLE_INTERVAL_US);
}

#[tokio::test]
async fn ad_stitched_transform_visits_every_span_in_order() {
    let uid: PeriodUid = "content".into();
    let midroll_us = CONTENT_DURATION_US / 3;
    let mut ads = AdPlaybackState::new(Uuid::new_v4(), &[0, midroll_us, TIME_END_OF_SOURCE])
        .with_content_duration_us(CONTENT_DURATION_US);
    for group_index in 0..3 {
        ads = ads
            .with_ad_count(group_index, 1)
            .with_ad_uri(group_index, 0, "https://ads.example/creative.mp4")
            .with_ad_duration_us(group_index, 0, AD_DURATION_US);
    }
    let timeline =
        Timeline::single_period(uid.clone(), CONTENT_DURATION_US).with_ad_playback_state(&uid, ads);
    let setup = setup(
        timeline,
        &uid,
        TransformRequest::default(),
        vec![TrackType::Audio],
    );
    let factory = Arc::clone(&setup.factory);

    let summary = setup
        .engine
        .run(CancellationToken::new())
        .await
        .expect("transform completes");
    assert!(summary.completed);

    // Span order: preroll, content, midroll, content, postroll, tail.
    let created = factory.created_ids();
    let kinds: Vec<(bool, Option<usize>)> = created
        .iter()
        .map(|id| (id.is_ad(), id.ad.map(|ad| ad.ad_group_index)))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (true, Some(0)),
            (false, None),
            (true, Some(1)),
            (false, None),
            (true, Some(2)),
            (false, None),
        ]
    );

    let log = setup.log.lock();
    assert_monotonic_per_track(&log);
    // Output covers content plus all three ads.
    let expected_duration_us = CONTENT_DURATION_US + 3 * AD_DURATION_US;
    assert!(summary.duration_us >= expected_duration_us - 2 * SAMPLE_INTERVAL_US);
    assert_eq!(log.released, Some(false));
}

#[tokio::test]
async fn ad_loading_via_timeline_update_unblocks_the_queue() {
    let uid: PeriodUid = "content".into();
    let midroll_us = CONTENT_DURATION_US / 3;
    // The midroll group exists but its media is unknown at start.
    let pending_ads = AdPlaybackState::new(Uuid::new_v4(), &[midroll_us])
        .with_content_duration_us(CONTENT_DURATION_US);
    let timeline = Timeline::single_period(uid.clone(), CONTENT_DURATION_US)
        .with_ad_playback_state(&uid, pending_ads.clone());
    let setup = setup(
        timeline.clone(),
        &uid,
        TransformRequest::default(),
        vec![TrackType::Audio],
    );

    // Deliver the loaded ad group through the timeline update channel.
    let loaded_ads = pending_ads
        .with_ad_count(0, 1)
        .with_ad_uri(0, 0, "https://ads.example/creative.mp4")
        .with_ad_duration_us(0, 0, AD_DURATION_US);
    let updated_timeline = timeline.with_ad_playback_state(&uid, loaded_ads);
    let (sender, receiver) = tokio::sync::mpsc::channel(1);
    sender.send(updated_timeline).await.unwrap();
    let engine = setup.engine.with_timeline_updates(receiver);

    let summary = engine
        .run(CancellationToken::new())
        .await
        .expect("transform completes");

    assert!(summary.completed);
    let log = setup.log.lock();
    assert_monotonic_per_track(&log);
    // Content plus the one ad.
    assert!(summary.duration_us >= CONTENT_DURATION_US + AD_DURATION_US - 2 * SAMPLE_INTERVAL_US);
}

#[tokio::test]
async fn transcode_request_changes_registered_track_format() {
    let uid: PeriodUid = "content".into();
    let timeline = Timeline::single_period(uid.clone(), CONTENT_DURATION_US);
    let request = TransformRequest::builder()
        .video_mime(SampleMime::H265)
        .output_height(480)
        .build();
    let setup = setup(timeline, &uid, request, vec![TrackType::Video]);

    let summary = setup
        .engine
        .run(CancellationToken::new())
        .await
        .expect("transform completes");
    assert!(summary.completed);

    let log = setup.log.lock();
    assert_eq!(log.tracks.len(), 1);
    assert_eq!(log.tracks[0].mime, SampleMime::H265);
    // 1280x720 scaled to height 480 keeps the 16:9 aspect ratio.
    assert_eq!(log.tracks[0].height, Some(480));
    assert_eq!(log.tracks[0].width, Some(853));
}

#[tokio::test]
async fn unsupported_output_mime_aborts_before_writing() {
    let uid: PeriodUid = "content".into();
    let timeline = Timeline::single_period(uid.clone(), CONTENT_DURATION_US);
    // VP9 cannot go into MP4 and no override was requested.
    let formats = vec![(TrackType::Video, Format::video(SampleMime::Vp9, 1280, 720))];
    let factory = ScriptedSourceFactory::new(formats, SAMPLE_INTERVAL_US);
    let (muxer, log) = RecordingMuxer::new();
    let (engine, _events) = TransformEngine::new(EngineParams {
        config: EngineConfig::default(),
        request: TransformRequest::default(),
        timeline,
        start_period_uid: uid.clone(),
        start_position_us: 0,
        tracks: vec![TrackType::Video],
        muxer: Box::new(muxer),
        container: ContainerMime::Mp4,
        source_factory: factory,
        decoder_factory: FakeDecoderFactory::working(),
        encoder_factory: FakeEncoderFactory::working(),
    })
    .unwrap();

    let error = engine
        .run(CancellationToken::new())
        .await
        .expect_err("transform fails");
    assert_eq!(error.code, ErrorCode::MuxerSampleMimeUnsupported);
    let log = log.lock();
    assert!(log.samples.is_empty());
    // Ordinary (non-cancellation) release after a failure.
    assert_eq!(log.released, Some(false));
}

#[tokio::test]
async fn cancellation_uses_the_cancellation_release_path() {
    let uid: PeriodUid = "content".into();
    let timeline = Timeline::single_period(uid.clone(), CONTENT_DURATION_US);
    let formats = vec![(TrackType::Audio, Format::audio(SampleMime::Aac, 44_100, 2))];
    let factory = ScriptedSourceFactory::new(formats, SAMPLE_INTERVAL_US);
    let (mut muxer, log) = RecordingMuxer::new();
    // A stop failure on a cancelled output must not surface.
    muxer.fail_on_release = true;
    let (engine, _events) = TransformEngine::new(EngineParams {
        config: EngineConfig::default(),
        request: TransformRequest::default(),
        timeline,
        start_period_uid: uid.clone(),
        start_position_us: 0,
        tracks: vec![TrackType::Audio],
        muxer: Box::new(muxer),
        container: ContainerMime::Mp4,
        source_factory: factory,
        decoder_factory: FakeDecoderFactory::working(),
        encoder_factory: FakeEncoderFactory::working(),
    })
    .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(5), engine.run(cancel))
        .await
        .expect("cancellation is prompt")
        .expect("cancellation is not an error");

    assert!(summary.cancelled);
    assert!(!summary.completed);
    assert_eq!(log.lock().released, Some(true));
}

#[tokio::test]
async fn progress_reports_completion() {
    let uid: PeriodUid = "content".into();
    let timeline = Timeline::single_period(uid.clone(), CONTENT_DURATION_US);
    let setup = setup(
        timeline,
        &uid,
        TransformRequest::default(),
        vec![TrackType::Audio],
    );
    let progress = setup.engine.progress();

    setup
        .engine
        .run(CancellationToken::new())
        .await
        .expect("transform completes");

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.state, core_transform::EngineState::Completed);
    assert_eq!(snapshot.position_us, CONTENT_DURATION_US - SAMPLE_INTERVAL_US);
}
