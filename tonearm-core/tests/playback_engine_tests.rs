//! Playback engine integration tests
//!
//! The engine renders into a `NullOutput`; the test pumps the device one
//! period at a time and inspects the samples.

mod helpers;

use helpers::FakeDecoder;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tonearm_common::ErrorCode;
use tonearm_core::{NullOutput, PlaybackConfig, PlaybackEngine, PlaybackState, TrackDescriptor};

fn engine_with_output() -> (PlaybackEngine, NullOutput) {
    let output = NullOutput::new();
    let engine = PlaybackEngine::new(Box::new(output.clone()), PlaybackConfig::default());
    (engine, output)
}

#[test]
fn test_load_then_play_starts_at_zero() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.wav"), FakeDecoder::new(0.5, 44100, 2, 441_000).shared())
        .unwrap();

    assert_eq!(engine.state(), PlaybackState::Stopped);
    engine.play().unwrap();

    assert_eq!(engine.state(), PlaybackState::Playing);
    assert_eq!(engine.get_position(), 0);
    assert_eq!(engine.get_duration(), 10_000);
    assert!(output.is_running());
    assert_eq!(output.format(), Some((44100, 2, 2048)));
}

#[test]
fn test_prepare_next_targets_other_slot() {
    let (engine, _output) = engine_with_output();
    engine
        .load_track(Path::new("a.wav"), FakeDecoder::new(0.5, 44100, 2, 44100).shared())
        .unwrap();
    engine
        .prepare_next_track(Path::new("b.wav"), FakeDecoder::new(0.25, 44100, 2, 44100).shared())
        .unwrap();

    assert_eq!(engine.current_index(), 0);
    assert_eq!(engine.next_index(), Some(1));
}

#[test]
fn test_failed_prepare_leaves_no_next() {
    let (engine, _output) = engine_with_output();
    engine
        .load_track(Path::new("a.wav"), FakeDecoder::new(0.5, 44100, 2, 44100).shared())
        .unwrap();

    let err = engine
        .prepare_next_track(Path::new("missing.wav"), FakeDecoder::failing_open().shared())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::FileNotFound);
    assert_eq!(engine.next_index(), None);
}

#[test]
fn test_info_failure_closes_stream() {
    let (engine, _output) = engine_with_output();
    let decoder = FakeDecoder::failing_info();
    let counters = Arc::clone(&decoder.counters);

    assert!(engine.load_track(Path::new("bad.wav"), decoder.shared()).is_err());
    assert_eq!(counters.open_streams(), 0);
    assert_eq!(
        engine.play().unwrap_err().code(),
        ErrorCode::InvalidState
    );
}

#[test]
fn test_gapless_splice_inside_one_buffer() {
    let (engine, output) = engine_with_output();
    let first = FakeDecoder::new(0.25, 1000, 1, 1000);
    let first_counters = Arc::clone(&first.counters);
    engine.load_track(Path::new("a.raw"), first.shared()).unwrap();
    engine
        .prepare_next_track(Path::new("b.raw"), FakeDecoder::new(0.75, 1000, 1, 1000).shared())
        .unwrap();

    engine.play().unwrap();
    engine.seek(990).unwrap();

    let samples = output.pump(20).unwrap();
    assert_eq!(samples.len(), 20);
    assert!(samples[..10].iter().all(|&s| s == 0.25));
    assert!(samples[10..].iter().all(|&s| s == 0.75));

    assert_eq!(engine.slot_switches(), 1);
    assert_eq!(engine.current_index(), 1);
    assert_eq!(engine.next_index(), None);
    assert_eq!(engine.get_position(), 10);
    assert_eq!(first_counters.open_streams(), 0);
}

#[test]
fn test_next_slot_is_not_armed_early() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.raw"), FakeDecoder::new(0.25, 1000, 1, 1000).shared())
        .unwrap();
    engine
        .prepare_next_track(Path::new("b.raw"), FakeDecoder::new(0.75, 1000, 1, 1000).shared())
        .unwrap();
    engine.play().unwrap();

    let samples = output.pump(100).unwrap();
    assert!(samples.iter().all(|&s| s == 0.25));
    assert_eq!(engine.current_index(), 0);
    assert_eq!(engine.slot_switches(), 0);
}

#[test]
fn test_low_rate_period_hands_off_without_silence() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.raw"), FakeDecoder::new(0.25, 22050, 1, 22050).shared())
        .unwrap();
    engine
        .prepare_next_track(Path::new("b.raw"), FakeDecoder::new(0.75, 22050, 1, 22050).shared())
        .unwrap();
    engine.play().unwrap();
    engine.seek(940).unwrap();

    let samples = output.pump(2048).unwrap();
    assert!(samples[..1323].iter().all(|&s| s == 0.25));
    assert!(samples[1323..].iter().all(|&s| s == 0.75));
    assert_eq!(engine.slot_switches(), 1);
    assert_eq!(engine.current_index(), 1);
}

#[test]
fn test_end_of_last_track_is_silence() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.raw"), FakeDecoder::new(0.5, 1000, 2, 100).shared())
        .unwrap();
    engine.play().unwrap();
    engine.seek(95).unwrap();

    let samples = output.pump(10).unwrap();
    assert!(samples[..10].iter().all(|&s| s == 0.5));
    assert!(samples[10..].iter().all(|&s| s == 0.0));

    let samples = output.pump(10).unwrap();
    assert!(samples.iter().all(|&s| s == 0.0));
    assert_eq!(engine.state(), PlaybackState::Playing);
}

#[test]
fn test_decode_error_falls_through_to_next_track() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(
            Path::new("a.raw"),
            FakeDecoder::new(0.25, 1000, 1, 1000).failing_decode_at(995).shared(),
        )
        .unwrap();
    engine
        .prepare_next_track(Path::new("b.raw"), FakeDecoder::new(0.75, 1000, 1, 1000).shared())
        .unwrap();
    engine.play().unwrap();
    engine.seek(990).unwrap();

    let samples = output.pump(5).unwrap();
    assert!(samples.iter().all(|&s| s == 0.25));
    assert_eq!(engine.slot_switches(), 0);

    let samples = output.pump(10).unwrap();
    assert!(samples.iter().all(|&s| s == 0.75));
    assert_eq!(engine.slot_switches(), 1);
}

#[test]
fn test_encoder_padding_never_reaches_output() {
    let (engine, output) = engine_with_output();
    let track = TrackDescriptor::new("a.m4a").with_encoder_trim(0, 25);
    engine
        .load_track_with(track, FakeDecoder::new(0.5, 1000, 1, 100).shared())
        .unwrap();
    engine.play().unwrap();

    let samples = output.pump(100).unwrap();
    assert!(samples[..75].iter().all(|&s| s == 0.5));
    assert!(samples[75..].iter().all(|&s| s == 0.0));
    assert_eq!(engine.get_position(), 75);
}

#[test]
fn test_seek_cursor_follows_reported_position() {
    let (engine, _output) = engine_with_output();
    engine
        .load_track(Path::new("a.flac"), FakeDecoder::new(0.5, 44100, 2, 441_000).shared())
        .unwrap();

    engine.seek(5000).unwrap();
    assert_eq!(engine.get_position(), 5000);
}

#[test]
fn test_seek_after_end_resumes_playback() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.raw"), FakeDecoder::new(0.5, 1000, 1, 100).shared())
        .unwrap();
    engine.play().unwrap();

    let samples = output.pump(150).unwrap();
    assert!(samples[100..].iter().all(|&s| s == 0.0));
    assert!(output.pump(10).unwrap().iter().all(|&s| s == 0.0));

    engine.seek(50).unwrap();
    let samples = output.pump(10).unwrap();
    assert!(samples.iter().all(|&s| s == 0.5));
    assert_eq!(engine.get_position(), 60);
}

#[test]
fn test_seek_without_stream_is_invalid_state() {
    let (engine, _output) = engine_with_output();
    assert_eq!(engine.seek(100).unwrap_err().code(), ErrorCode::InvalidState);
}

#[test]
fn test_pause_resume_keeps_device_open() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.wav"), FakeDecoder::new(0.5, 44100, 2, 44100).shared())
        .unwrap();

    engine.play().unwrap();
    engine.pause().unwrap();
    assert_eq!(engine.state(), PlaybackState::Paused);
    assert!(output.is_open());
    assert!(!output.is_running());

    engine.play().unwrap();
    assert_eq!(engine.state(), PlaybackState::Playing);
    let stats = output.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.starts, 2);
    assert_eq!(stats.closes, 0);
}

#[test]
fn test_control_operations_are_idempotent() {
    let (engine, output) = engine_with_output();
    engine.pause().unwrap();
    engine.stop().unwrap();
    assert_eq!(output.stats().stops, 0);

    engine
        .load_track(Path::new("a.wav"), FakeDecoder::new(0.5, 44100, 2, 44100).shared())
        .unwrap();
    engine.play().unwrap();
    engine.play().unwrap();
    assert_eq!(output.stats().starts, 1);
}

#[test]
fn test_stop_closes_device_and_rewinds() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.raw"), FakeDecoder::new(0.5, 1000, 1, 1000).shared())
        .unwrap();
    engine.play().unwrap();
    output.pump(250).unwrap();
    assert_eq!(engine.get_position(), 250);

    engine.stop().unwrap();
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert_eq!(engine.get_position(), 0);
    assert!(!output.is_open());

    let mut buffer = vec![1.0f32; 8];
    engine.fill_buffer(&mut buffer, 8);
    assert!(buffer.iter().all(|&s| s == 0.0));
}

#[test]
fn test_open_failure_stays_stopped() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.wav"), FakeDecoder::new(0.5, 44100, 2, 44100).shared())
        .unwrap();
    output.fail_next_open();

    assert!(engine.play().is_err());
    assert_eq!(engine.state(), PlaybackState::Stopped);

    engine.play().unwrap();
    assert_eq!(engine.state(), PlaybackState::Playing);
}

#[test]
fn test_start_failure_rolls_back() {
    let (engine, output) = engine_with_output();
    engine
        .load_track(Path::new("a.raw"), FakeDecoder::new(0.5, 1000, 1, 1000).shared())
        .unwrap();
    output.fail_next_start();

    assert!(engine.play().is_err());
    assert_eq!(engine.state(), PlaybackState::Stopped);

    let mut buffer = vec![1.0f32; 4];
    engine.fill_buffer(&mut buffer, 4);
    assert!(buffer.iter().all(|&s| s == 0.0));
    assert_eq!(engine.get_position(), 0);
}

#[test]
fn test_transition_to_next_promotes_prepared_slot() {
    let (engine, _output) = engine_with_output();
    assert_eq!(
        engine.transition_to_next().unwrap_err().code(),
        ErrorCode::InvalidState
    );

    let first = FakeDecoder::new(0.25, 1000, 1, 1000);
    let first_counters = Arc::clone(&first.counters);
    engine.load_track(Path::new("a.raw"), first.shared()).unwrap();
    engine
        .prepare_next_track(Path::new("b.raw"), FakeDecoder::new(0.75, 1000, 1, 2000).shared())
        .unwrap();

    engine.transition_to_next().unwrap();
    assert_eq!(engine.current_index(), 1);
    assert_eq!(engine.next_index(), None);
    assert_eq!(engine.get_duration(), 2000);
    assert_eq!(first_counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine.current_track().unwrap().path,
        std::path::PathBuf::from("b.raw")
    );
}

#[test]
fn test_volume_is_forwarded_to_device() {
    let (engine, output) = engine_with_output();
    engine.set_volume(2.0);
    assert_eq!(engine.volume(), 1.0);
    assert_eq!(output.volume(), 1.0);

    engine.set_volume(0.5);
    engine
        .load_track(Path::new("a.raw"), FakeDecoder::new(0.5, 1000, 1, 1000).shared())
        .unwrap();
    engine.play().unwrap();
    assert_eq!(output.volume(), 0.5);
    assert_eq!(output.pump(2).unwrap(), vec![0.25, 0.25]);
}

#[test]
fn test_drop_stops_device_and_closes_streams() {
    let output = NullOutput::new();
    let decoder = FakeDecoder::new(0.5, 1000, 1, 1000);
    let counters = Arc::clone(&decoder.counters);
    {
        let engine = PlaybackEngine::new(Box::new(output.clone()), PlaybackConfig::default());
        engine.load_track(Path::new("a.raw"), decoder.shared()).unwrap();
        engine.play().unwrap();
    }
    assert!(!output.is_open());
    assert_eq!(counters.open_streams(), 0);
}
