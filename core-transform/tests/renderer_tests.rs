//! Tests for the track renderer state machine: configuration retries,
//! passthrough vs transcode selection, streaming, slow-motion dropping
//! and end of stream.

mod common;

use common::{FakeDecoderFactory, FakeEncoderFactory, FakeSource, RecordingMuxer};
use core_transform::{
    ContainerMime, ErrorCode, Format, MuxerWrapper, RendererState, SampleMime,
    SlowMotionSegment, TrackRenderer, TrackType, TransformRequest,
};

fn audio_format() -> Format {
    Format::audio(SampleMime::Aac, 44_100, 2)
}

fn renderer(track_type: TrackType, request: TransformRequest) -> TrackRenderer {
    TrackRenderer::new(
        track_type,
        request,
        FakeDecoderFactory::working(),
        FakeEncoderFactory::working(),
    )
}

fn mp4_muxer(track_count: usize) -> (MuxerWrapper, std::sync::Arc<parking_lot::Mutex<common::MuxerLog>>) {
    let (muxer, log) = RecordingMuxer::new();
    (
        MuxerWrapper::new(Box::new(muxer), ContainerMime::Mp4, track_count),
        log,
    )
}

#[test]
fn configuration_retries_until_format_is_available() {
    let mut source =
        FakeSource::new(TrackType::Audio, audio_format()).with_format_delay(2);
    let (mut muxer, _log) = mp4_muxer(1);
    let mut renderer = renderer(TrackType::Audio, TransformRequest::default());

    assert_eq!(renderer.state(), RendererState::Unconfigured);
    // Two ticks without a format: no transition, no failure.
    assert!(!renderer.render(&mut source, &mut muxer).unwrap());
    assert_eq!(renderer.state(), RendererState::Unconfigured);
    assert!(!renderer.render(&mut source, &mut muxer).unwrap());
    assert_eq!(renderer.state(), RendererState::Unconfigured);

    // Third tick reads the format and configures.
    renderer.render(&mut source, &mut muxer).unwrap();
    assert_ne!(renderer.state(), RendererState::Unconfigured);
}

#[test]
fn renderer_streams_and_ends_through_passthrough() {
    let mut source = FakeSource::new(TrackType::Audio, audio_format());
    source.push_sample(0, true, &[1, 2, 3]);
    source.push_sample(10_000, false, &[4, 5, 6]);
    let (mut muxer, log) = mp4_muxer(1);
    let mut renderer = renderer(TrackType::Audio, TransformRequest::default());
    renderer.signal_end_of_input();

    let mut guard = 0;
    while !renderer.is_ended() {
        renderer.render(&mut source, &mut muxer).unwrap();
        guard += 1;
        assert!(guard < 64, "renderer failed to reach the ended state");
    }

    let log = log.lock();
    // Passthrough: the registered track format is the input format.
    assert_eq!(log.tracks.len(), 1);
    assert_eq!(log.tracks[0].mime, SampleMime::Aac);
    let times: Vec<i64> = log.samples.iter().map(|(_, time_us, _, _)| *time_us).collect();
    assert_eq!(times, vec![0, 10_000]);
    assert_eq!(renderer.state(), RendererState::Ended);
    assert!(muxer.all_tracks_ended());
}

#[test]
fn transcode_path_registers_the_requested_mime() {
    let mut source = FakeSource::new(TrackType::Audio, Format::audio(SampleMime::Vorbis, 48_000, 2));
    source.push_sample(0, true, &[7; 4]);
    let (mut muxer, log) = mp4_muxer(1);
    let request = TransformRequest::builder().audio_mime(SampleMime::Aac).build();
    let mut renderer = renderer(TrackType::Audio, request);
    renderer.signal_end_of_input();

    let mut guard = 0;
    while !renderer.is_ended() {
        renderer.render(&mut source, &mut muxer).unwrap();
        guard += 1;
        assert!(guard < 64, "renderer failed to reach the ended state");
    }

    let log = log.lock();
    assert_eq!(log.tracks[0].mime, SampleMime::Aac);
    assert_eq!(log.samples.len(), 1);
}

#[test]
fn unsupported_inferred_mime_fails_at_configuration() {
    // VP9 into MP4 with no MIME override: rejected before any decode.
    let mut source =
        FakeSource::new(TrackType::Video, Format::video(SampleMime::Vp9, 1280, 720));
    let (mut muxer, log) = mp4_muxer(1);
    let mut renderer = renderer(TrackType::Video, TransformRequest::default());

    let error = renderer.render(&mut source, &mut muxer).unwrap_err();
    assert_eq!(error.code, ErrorCode::MuxerSampleMimeUnsupported);
    assert!(log.lock().tracks.is_empty());
}

#[test]
fn decoder_init_failure_surfaces_typed() {
    let mut source = FakeSource::new(TrackType::Audio, Format::audio(SampleMime::Vorbis, 48_000, 2));
    source.push_sample(0, true, &[1]);
    let (mut muxer, _log) = mp4_muxer(1);
    let request = TransformRequest::builder().audio_mime(SampleMime::Aac).build();
    let mut renderer = TrackRenderer::new(
        TrackType::Audio,
        request,
        std::sync::Arc::new(FakeDecoderFactory {
            fail_with: Some(ErrorCode::DecoderInitFailed),
        }),
        FakeEncoderFactory::working(),
    );

    let error = renderer.render(&mut source, &mut muxer).unwrap_err();
    assert_eq!(error.code, ErrorCode::DecoderInitFailed);
    assert!(error.is_codec_init());
}

#[test]
fn slow_motion_flattening_drops_and_restamps() {
    let format = Format::video(SampleMime::H264, 1280, 720).with_slow_motion_segments(vec![
        SlowMotionSegment {
            start_us: 100_000,
            end_us: 200_000,
            speed_divisor: 2,
        },
    ]);
    let mut source = FakeSource::new(TrackType::Video, format);
    // Four frames before the segment (thinned 2:1), two inside (kept).
    for i in 0..4 {
        source.push_sample(i * 10_000, i == 0, &[0; 4]);
    }
    source.push_sample(100_000, true, &[0; 4]);
    source.push_sample(150_000, false, &[0; 4]);

    let (mut muxer, log) = mp4_muxer(1);
    let request = TransformRequest::builder().flatten_for_slow_motion(true).build();
    let mut renderer = renderer(TrackType::Video, request);
    renderer.signal_end_of_input();

    let mut guard = 0;
    while !renderer.is_ended() {
        renderer.render(&mut source, &mut muxer).unwrap();
        guard += 1;
        assert!(guard < 128, "renderer failed to reach the ended state");
    }

    let log = log.lock();
    // Flattening forces the transcode path; the tags are consumed.
    assert!(log.tracks[0].slow_motion_segments.is_empty());
    let times: Vec<i64> = log.samples.iter().map(|(_, time_us, _, _)| *time_us).collect();
    // Outside the segment frames 0 and 2 survive thinning; inside, both
    // frames survive with stretched timestamps (divisor 2).
    assert_eq!(times, vec![0, 20_000, 100_000, 200_000]);
}

#[test]
fn stuttering_source_just_slows_progress() {
    let mut source = FakeSource::new(TrackType::Audio, audio_format()).with_stutter();
    source.push_sample(0, true, &[1]);
    source.push_sample(5_000, false, &[2]);
    let (mut muxer, log) = mp4_muxer(1);
    let mut renderer = renderer(TrackType::Audio, TransformRequest::default());
    renderer.signal_end_of_input();

    let mut guard = 0;
    while !renderer.is_ended() {
        renderer.render(&mut source, &mut muxer).unwrap();
        guard += 1;
        assert!(guard < 128, "renderer failed to reach the ended state");
    }
    assert_eq!(log.lock().samples.len(), 2);
}
