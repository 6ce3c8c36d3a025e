//! Integration tests for effect parameters, presets and pitch preservation

mod helpers;

use helpers::TestEngine;
use slowverb_common::{EffectParam, EngineEvent, ErrorKind, PresetId, QualityTier, SessionState};

#[tokio::test]
async fn test_vaporwave_preset_sets_all_values() {
    let mut engine = TestEngine::new();
    engine.controller.apply_preset(PresetId::Vaporwave).await.unwrap();

    let params = engine.snapshot().parameters;
    assert_eq!(params.playback_rate, 0.6);
    assert_eq!(params.reverb_wet, 0.5);
    assert_eq!(params.reverb_room_size, 1.2);
    assert_eq!(params.reverb_decay_seconds, 4.0);
    assert_eq!(params.low_pass_hz, 4000.0);
    assert!((params.dry_level() - 0.5).abs() < 1e-12);
    // Volume and pitch mode are not part of a preset
    assert_eq!(params.volume, 0.8);
    assert!(!params.preserve_pitch);

    let presets: Vec<_> = engine
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::ParametersChanged { preset, .. } => preset,
            _ => None,
        })
        .collect();
    assert_eq!(presets, vec![PresetId::Vaporwave]);
}

#[tokio::test]
async fn test_parameters_are_clamped() {
    let engine = TestEngine::new();
    let c = &engine.controller;
    c.set_effect_parameter(EffectParam::ReverbWet, 1.5).await.unwrap();
    c.set_effect_parameter(EffectParam::LowPass, 10.0).await.unwrap();
    c.set_effect_parameter(EffectParam::PlaybackRate, 9.0).await.unwrap();

    let params = engine.snapshot().parameters;
    assert_eq!(params.reverb_wet, 0.8);
    assert!((params.dry_level() - 0.2).abs() < 1e-12);
    assert_eq!(params.low_pass_hz, 500.0);
    assert_eq!(params.playback_rate, QualityTier::High.rate_range().1);

    assert!(c
        .set_effect_parameter(EffectParam::Volume, f64::NAN)
        .await
        .is_err());
}

#[tokio::test]
async fn test_reverb_changes_replace_the_impulse() {
    let engine = TestEngine::new();
    engine.load_tone(1.0).await;

    engine
        .controller
        .set_effect_parameter(EffectParam::ReverbDecay, 1.0)
        .await
        .unwrap();
    engine
        .controller
        .set_effect_parameter(EffectParam::ReverbRoomSize, 1.4)
        .await
        .unwrap();
    let params = engine.snapshot().parameters;
    assert_eq!(params.reverb_decay_seconds, 1.0);
    assert_eq!(params.reverb_room_size, 1.4);

    // Playback still works after swapping impulses mid-session
    engine.controller.play().await.unwrap();
    engine.advance(0.2);
    assert_eq!(engine.controller.tick().await.state, SessionState::Playing);
}

#[tokio::test]
async fn test_preserve_pitch_renders_longer_buffer() {
    let engine = TestEngine::new();
    engine.load_tone(10.0).await;
    let c = &engine.controller;
    c.set_effect_parameter(EffectParam::PreservePitch, 1.0).await.unwrap();
    c.set_effect_parameter(EffectParam::PlaybackRate, 0.5).await.unwrap();
    assert_eq!(c.processed_frames().await, None);

    c.play().await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Playing);
    assert!((snapshot.playback_duration_seconds - 20.0).abs() < 1e-3);
    assert_eq!(c.processed_frames().await, Some(160_000));

    // Position stays in track seconds
    engine.advance(2.0);
    let position = c.tick().await.current_time_seconds;
    assert!((position - 1.0).abs() < 0.01, "got {}", position);
}

#[tokio::test]
async fn test_pause_resume_reuses_rendered_buffer() {
    let engine = TestEngine::new();
    engine.load_tone(2.0).await;
    let c = &engine.controller;
    c.set_effect_parameter(EffectParam::PreservePitch, 1.0).await.unwrap();
    c.set_effect_parameter(EffectParam::PlaybackRate, 0.5).await.unwrap();

    c.play().await.unwrap();
    engine.advance(1.0);
    c.pause().await.unwrap();
    assert!((engine.snapshot().current_time_seconds - 0.5).abs() < 0.01);
    assert_eq!(c.processed_frames().await, Some(32_000));

    c.play().await.unwrap();
    engine.advance(1.0);
    assert!((c.tick().await.current_time_seconds - 1.0).abs() < 0.01);

    // A new rate drops the cached render and starts over from the current spot
    c.set_effect_parameter(EffectParam::PlaybackRate, 0.25).await.unwrap();
    assert_eq!(c.processed_frames().await, Some(64_000));
    assert_eq!(engine.snapshot().state, SessionState::Playing);
    assert!((engine.snapshot().current_time_seconds - 1.0).abs() < 0.01);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_superseded_render_is_discarded() {
    let engine = TestEngine::new();
    engine.load_tone(10.0).await;
    let c = engine.controller.clone();
    c.set_effect_parameter(EffectParam::PreservePitch, 1.0).await.unwrap();
    c.set_effect_parameter(EffectParam::PlaybackRate, 0.5).await.unwrap();

    let (played, changed) = tokio::join!(
        c.play(),
        c.set_effect_parameter(EffectParam::PlaybackRate, 0.6)
    );
    played.unwrap();
    changed.unwrap();

    // Whatever the interleaving, the newest rate wins
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Playing);
    assert_eq!(snapshot.parameters.playback_rate, 0.6);
    assert_eq!(c.processed_frames().await, Some(133_333));
}

#[tokio::test]
async fn test_pause_during_render_cancels_start() {
    let engine = TestEngine::new();
    engine.load_tone(10.0).await;
    let c = engine.controller.clone();
    c.set_effect_parameter(EffectParam::PreservePitch, 1.0).await.unwrap();
    c.set_effect_parameter(EffectParam::PlaybackRate, 0.5).await.unwrap();

    let (played, paused) = tokio::join!(c.play(), async {
        tokio::task::yield_now().await;
        c.pause().await
    });
    played.unwrap();
    paused.unwrap();

    // Either the pause landed during the render (start discarded) or after it
    let state = engine.snapshot().state;
    assert!(matches!(state, SessionState::Ready | SessionState::Paused));
}

#[tokio::test]
async fn test_pitch_preservation_falls_back_on_basic() {
    let mut engine = TestEngine::builder().tier(QualityTier::Basic).build();
    engine.load_tone(1.0).await;
    let c = engine.controller.clone();
    c.set_effect_parameter(EffectParam::PreservePitch, 1.0).await.unwrap();
    c.set_effect_parameter(EffectParam::PlaybackRate, 0.5).await.unwrap();
    engine.drain_events();

    c.play().await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, SessionState::Playing);
    assert_eq!(
        snapshot.last_error.map(|e| e.kind),
        Some(ErrorKind::CapabilityDegraded)
    );
    assert!(engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::CapabilityDegraded { .. })));

    // Native rate control: position still advances at the requested rate
    engine.advance(1.0);
    assert!((c.tick().await.current_time_seconds - 0.5).abs() < 0.01);
}
