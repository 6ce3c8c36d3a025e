//! Integration tests for the session lifecycle
//!
//! Load, play, pause, rewind and end-of-track behaviour through the public
//! controller API, with the output pumped by hand.

mod helpers;

use helpers::{peak, sine_file, TestEngine};
use slowverb_common::{EffectParam, EngineEvent, ErrorKind, SessionState};
use slowverb_engine::audio::AudioFile;
use slowverb_engine::Error;

#[tokio::test]
async fn test_load_play_pause_resume() {
    let engine = TestEngine::new();
    engine.load_tone(2.0).await;
    assert_eq!(engine.snapshot().state, SessionState::Ready);
    assert!((engine.snapshot().duration_seconds - 2.0).abs() < 1e-3);

    engine.controller.play().await.unwrap();
    let rendered = engine.advance(0.5);
    assert!(peak(&rendered) > 0.05, "tone should be audible");

    engine.controller.pause().await.unwrap();
    let paused_at = engine.snapshot().current_time_seconds;
    assert_eq!(engine.snapshot().state, SessionState::Paused);
    assert!((paused_at - 0.4).abs() < 0.01, "0.5s at rate 0.8, got {}", paused_at);

    // Position holds while paused
    engine.advance(0.5);
    assert_eq!(engine.controller.tick().await.current_time_seconds, paused_at);

    engine.controller.play().await.unwrap();
    engine.advance(0.25);
    let resumed = engine.controller.tick().await.current_time_seconds;
    assert!((resumed - (paused_at + 0.2)).abs() < 0.01);
}

#[tokio::test]
async fn test_play_and_pause_are_idempotent() {
    let mut engine = TestEngine::new();
    engine.load_tone(1.0).await;
    engine.drain_events();

    engine.controller.play().await.unwrap();
    engine.controller.play().await.unwrap();
    engine.controller.pause().await.unwrap();
    engine.controller.pause().await.unwrap();

    let transitions: Vec<_> = engine
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::StateChanged { new_state, .. } => Some(new_state),
            _ => None,
        })
        .collect();
    assert_eq!(transitions, vec![SessionState::Playing, SessionState::Paused]);
}

#[tokio::test]
async fn test_position_is_monotonic_and_end_fires_once() {
    let mut engine = TestEngine::new();
    engine.load_tone(1.0).await;
    engine.controller.play().await.unwrap();

    let mut last = 0.0;
    let mut saw_end = false;
    for _ in 0..100 {
        engine.advance(0.05);
        let snapshot = engine.controller.tick().await;
        if snapshot.state == SessionState::Ended {
            saw_end = true;
            assert_eq!(snapshot.current_time_seconds, 0.0);
            break;
        }
        assert!(snapshot.current_time_seconds >= last);
        assert!(snapshot.current_time_seconds <= snapshot.duration_seconds);
        last = snapshot.current_time_seconds;
    }
    assert!(saw_end);

    // Further ticks stay ended without a second notification
    engine.advance(0.5);
    engine.controller.tick().await;
    let ended = engine
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::PlaybackEnded { .. }))
        .count();
    assert_eq!(ended, 1);

    // Ended behaves like paused at zero
    engine.controller.play().await.unwrap();
    assert_eq!(engine.snapshot().state, SessionState::Playing);
    assert!(engine.snapshot().current_time_seconds < 0.01);
}

#[tokio::test]
async fn test_rate_change_reanchors_position() {
    let engine = TestEngine::new();
    engine.load_tone(5.0).await;
    engine.controller.play().await.unwrap();

    engine.advance(1.0);
    engine
        .controller
        .set_effect_parameter(EffectParam::PlaybackRate, 1.0)
        .await
        .unwrap();
    engine.advance(1.0);

    // 1s at 0.8 then 1s at 1.0
    let position = engine.controller.tick().await.current_time_seconds;
    assert!((position - 1.8).abs() < 0.01, "got {}", position);
}

#[tokio::test]
async fn test_seek_to_start_rewinds_from_any_loaded_state() {
    let engine = TestEngine::new();
    engine.load_tone(2.0).await;
    engine.controller.play().await.unwrap();
    engine.advance(0.5);
    engine.controller.pause().await.unwrap();

    engine.controller.seek_to_start().await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert_eq!(snapshot.current_time_seconds, 0.0);

    engine.controller.play().await.unwrap();
    engine.controller.seek_to_start().await.unwrap();
    assert_eq!(engine.snapshot().state, SessionState::Ready);
    assert_eq!(engine.snapshot().current_time_seconds, 0.0);
}

#[tokio::test]
async fn test_new_file_replaces_session() {
    let engine = TestEngine::new();
    engine.load_tone(2.0).await;
    let first = engine.snapshot().session_id;
    engine.controller.play().await.unwrap();
    engine.advance(0.5);

    engine
        .controller
        .select_file(sine_file("second.wav", 1.0))
        .await
        .unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert_eq!(snapshot.file_name.as_deref(), Some("second.wav"));
    assert_ne!(snapshot.session_id, first);
    assert_eq!(snapshot.current_time_seconds, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_newer_selection_supersedes_load_in_flight() {
    let mut engine = TestEngine::new();
    let c = engine.controller.clone();

    // The long load parks on its decode; the short one bumps the generation on first poll
    let (long, short) = tokio::join!(
        c.select_file(sine_file("long.wav", 30.0)),
        c.select_file(sine_file("short.wav", 1.0))
    );
    assert!(matches!(long, Err(Error::RenderStale { .. })), "got {:?}", long);
    short.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert_eq!(snapshot.file_name.as_deref(), Some("short.wav"));
    assert!((snapshot.duration_seconds - 1.0).abs() < 1e-3);
    assert!(snapshot.last_error.is_none());

    let loaded: Vec<_> = engine
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::FileLoaded {
                file_name,
                duration_seconds,
                ..
            } => Some((file_name, duration_seconds)),
            _ => None,
        })
        .collect();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].0, "short.wav");
    assert!((loaded[0].1 - 1.0).abs() < 1e-3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_file_discards_render_of_previous_session() {
    let mut engine = TestEngine::new();
    engine.load_tone(10.0).await;
    let c = engine.controller.clone();
    c.set_effect_parameter(EffectParam::PreservePitch, 1.0).await.unwrap();
    c.set_effect_parameter(EffectParam::PlaybackRate, 0.5).await.unwrap();
    engine.drain_events();

    // play() holds the lock until it parks on the render, so the selection lands mid-render
    let (played, selected) = tokio::join!(c.play(), c.select_file(sine_file("next.wav", 1.0)));
    played.unwrap();
    selected.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert_eq!(snapshot.file_name.as_deref(), Some("next.wav"));
    assert_eq!(snapshot.current_time_seconds, 0.0);
    assert_eq!(c.processed_frames().await, None);

    let started = engine
        .drain_events()
        .into_iter()
        .any(|e| matches!(e, EngineEvent::StateChanged { new_state: SessionState::Playing, .. }));
    assert!(!started, "the stale render must not start playback");
}

#[tokio::test]
async fn test_needs_user_gesture_then_retry() {
    let mut engine = TestEngine::builder().require_gesture().build();
    engine.load_tone(1.0).await;
    engine.drain_events();

    let err = engine.controller.play().await.unwrap_err();
    assert!(matches!(err, Error::NeedsUserGesture(_)));
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert_eq!(
        snapshot.last_error.map(|e| e.kind),
        Some(ErrorKind::NeedsUserGesture)
    );
    assert!(engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::NeedsUserGesture { .. })));

    engine.driver.grant_gesture();
    engine.controller.play().await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Playing);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_file_too_large_is_rejected_before_decoding() {
    let engine = TestEngine::builder().max_file_size_bytes(1000).build();
    let err = engine
        .controller
        .select_file(sine_file("big.wav", 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FileTooLarge { limit: 1000, .. }));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.last_error.map(|e| e.kind), Some(ErrorKind::FileTooLarge));
    assert!(snapshot.playback_enabled);
}

#[tokio::test]
async fn test_undecodable_file_errors_then_recovers() {
    let engine = TestEngine::new();
    let broken = AudioFile::new("broken.wav", Some("audio/wav".to_string()), vec![7u8; 512]);
    let err = engine.controller.select_file(broken).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Error);
    assert!(snapshot.file_name.is_none());
    assert!(matches!(
        engine.controller.play().await,
        Err(Error::InvalidState(_))
    ));

    engine.load_tone(1.0).await;
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Ready);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_export_is_not_implemented() {
    let engine = TestEngine::new();
    let err = engine.controller.export().await.unwrap_err();
    assert!(matches!(err, Error::NotImplemented(_)));
}
