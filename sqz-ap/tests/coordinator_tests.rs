//! Coordinator behavior against the in-memory backend
//!
//! All tests run on a paused tokio clock, so clip durations and load delays
//! advance deterministically.

use sqz_ap::backend::{ClipFault, ClipSpec, MemoryBackend};
use sqz_ap::{AudioBackend, AudioCoordinator, AudioHandle, AudioError, AutoplayGate, CoordinatorConfig};
use sqz_common::events::{EffectOutcome, EventBus, SqzEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const BGM: &str = "/bgm/bgm1.mp3";

struct Fixture {
    coordinator: AudioCoordinator,
    backend: MemoryBackend,
    gate: Arc<AutoplayGate>,
    events: Arc<EventBus>,
}

fn fixture(granted: bool) -> Fixture {
    let backend = MemoryBackend::new();
    let gate = Arc::new(AutoplayGate::new());
    if granted {
        gate.set_user_interacted();
    }
    let events = Arc::new(EventBus::new(64));
    let coordinator = AudioCoordinator::new(
        Arc::new(backend.clone()),
        Arc::clone(&gate),
        Arc::clone(&events),
        CoordinatorConfig::default(),
    );
    Fixture {
        coordinator,
        backend,
        gate,
        events,
    }
}

fn approx(a: Option<f32>, b: f32) -> bool {
    a.is_some_and(|a| (a - b).abs() < 1e-6)
}

#[tokio::test(start_paused = true)]
async fn test_same_source_requested_twice_plays_once() {
    let f = fixture(true);

    let (first, second) = tokio::join!(
        f.coordinator.play_sound_effect("/sound/dog.mp3", 1.0),
        f.coordinator.play_sound_effect("/sound/dog.mp3", 1.0),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(f.backend.started(), vec!["/sound/dog.mp3".to_string()]);

    // Repeat while it is still playing
    f.coordinator.play_sound_effect("/sound/dog.mp3", 1.0).await.unwrap();
    assert_eq!(f.backend.started().len(), 1);
    assert_eq!(f.backend.peak_audible(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_keep_only_latest() {
    let f = fixture(true);

    let (a, b) = tokio::join!(
        f.coordinator.play_sound_effect("/sound/a.mp3", 1.0),
        f.coordinator.play_sound_effect("/sound/b.mp3", 1.0),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    assert_eq!(f.backend.started(), vec!["/sound/b.mp3".to_string()]);
    assert_eq!(f.coordinator.current_effect_ref().as_deref(), Some("/sound/b.mp3"));
    assert!(f.backend.peak_audible() <= 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_effect_halts_previous() {
    let f = fixture(true);

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    assert_eq!(f.backend.playing_sources(), vec!["/sound/a.mp3".to_string()]);

    f.coordinator.play_sound_effect("/sound/b.mp3", 1.0).await.unwrap();
    assert_eq!(f.backend.playing_sources(), vec!["/sound/b.mp3".to_string()]);
    assert_eq!(f.backend.peak_audible(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_play_after_stop_all_is_not_affected() {
    let f = fixture(true);

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    f.coordinator.stop_all().await;
    assert!(!f.coordinator.is_effect_playing());
    assert!(f.backend.playing_sources().is_empty());

    f.coordinator.play_sound_effect("/sound/x.mp3", 1.0).await.unwrap();
    assert_eq!(f.backend.playing_sources(), vec!["/sound/x.mp3".to_string()]);
    assert_eq!(f.coordinator.current_effect_ref().as_deref(), Some("/sound/x.mp3"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_during_load_drops_effect() {
    let f = fixture(true);
    f.backend.set_clip(
        "/sound/slow.mp3",
        ClipSpec::default().with_load_delay(Duration::from_millis(500)),
    );

    let coordinator = f.coordinator.clone();
    let pending =
        tokio::spawn(async move { coordinator.play_sound_effect("/sound/slow.mp3", 1.0).await });
    sleep(Duration::from_millis(150)).await;
    f.coordinator.stop_all().await;

    assert!(pending.await.unwrap().is_ok());
    assert!(f.backend.started().is_empty());
    assert!(!f.coordinator.is_effect_playing());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_caller_does_not_corrupt_state() {
    let f = fixture(true);

    let result = tokio::time::timeout(
        Duration::from_millis(1),
        f.coordinator.play_sound_effect("/sound/a.mp3", 1.0),
    )
    .await;
    assert!(result.is_err());

    // The start sequence keeps running without the caller
    sleep(Duration::from_millis(200)).await;
    assert_eq!(f.backend.started(), vec!["/sound/a.mp3".to_string()]);

    sleep(Duration::from_secs(2)).await;
    assert!(!f.coordinator.is_effect_playing());
}

#[tokio::test(start_paused = true)]
async fn test_untracked_handles_are_stopped() {
    let f = fixture(true);

    let stray = f.backend.create("/sound/stray.mp3");
    stray.play().await.unwrap();
    assert_eq!(f.backend.audible(), 1);

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    assert_eq!(f.backend.playing_sources(), vec!["/sound/a.mp3".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_effect_ducks_bgm_until_end() {
    let f = fixture(true);
    f.coordinator.play_bgm(BGM, 0.5, true).await;
    assert!(approx(f.coordinator.bgm_volume(), 0.5));

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    assert!(approx(f.coordinator.bgm_volume(), 0.1));
    assert!(f.coordinator.status().bgm_ducked);

    sleep(Duration::from_millis(1100)).await;
    assert!(approx(f.coordinator.bgm_volume(), 0.5));
    assert!(!f.coordinator.status().bgm_ducked);
    // BGM is not counted as an audible effect
    assert_eq!(f.backend.peak_audible(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_restores_duck_once() {
    let f = fixture(true);
    f.backend
        .set_clip("/sound/long.mp3", ClipSpec::new(Duration::from_secs(10)));
    f.coordinator.play_bgm(BGM, 0.5, true).await;

    f.coordinator.play_sound_effect("/sound/long.mp3", 1.0).await.unwrap();
    assert!(approx(f.coordinator.bgm_volume(), 0.1));

    sleep(Duration::from_millis(3100)).await;
    assert!(f.coordinator.is_effect_playing());
    assert!(approx(f.coordinator.bgm_volume(), 0.5));

    f.coordinator.adjust_bgm_volume(0.8);
    sleep(Duration::from_secs(10)).await;
    assert!(!f.coordinator.is_effect_playing());
    assert!(approx(f.coordinator.bgm_volume(), 0.8));
}

#[tokio::test(start_paused = true)]
async fn test_duck_passes_to_next_effect() {
    let f = fixture(true);
    f.coordinator.play_bgm(BGM, 0.5, true).await;

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    f.coordinator.play_sound_effect("/sound/b.mp3", 1.0).await.unwrap();
    assert!(approx(f.coordinator.bgm_volume(), 0.1));

    sleep(Duration::from_millis(1100)).await;
    assert!(approx(f.coordinator.bgm_volume(), 0.5));
}

#[tokio::test(start_paused = true)]
async fn test_adjust_volume_while_ducked_sets_nominal() {
    let f = fixture(true);
    f.coordinator.play_bgm(BGM, 0.5, true).await;
    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();

    f.coordinator.adjust_bgm_volume(1.0);
    assert!(approx(f.coordinator.bgm_volume(), 0.2));

    sleep(Duration::from_millis(1100)).await;
    assert!(approx(f.coordinator.bgm_volume(), 1.0));
}

#[tokio::test(start_paused = true)]
async fn test_missing_asset_reports_error_and_restores() {
    let f = fixture(true);
    f.backend.set_clip(
        "/sound/missing.mp3",
        ClipSpec::default().with_fault(ClipFault::Missing),
    );
    f.coordinator.play_bgm(BGM, 0.5, true).await;

    let result = f.coordinator.play_sound_effect("/sound/missing.mp3", 1.0).await;
    assert!(matches!(result, Err(AudioError::AssetLoad { .. })));
    assert!(!f.coordinator.is_effect_playing());
    assert!(approx(f.coordinator.bgm_volume(), 0.5));

    // A retry of the same source is attempted again
    let retry = f.coordinator.play_sound_effect("/sound/missing.mp3", 1.0).await;
    assert!(retry.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_start_is_not_fatal() {
    let f = fixture(true);
    f.backend.set_clip(
        "/sound/odd.mp3",
        ClipSpec::default().with_fault(ClipFault::PlayRejected("decoder busy".into())),
    );

    let result = f.coordinator.play_sound_effect("/sound/odd.mp3", 1.0).await;
    assert!(matches!(result, Err(AudioError::Playback(_))));

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    assert_eq!(f.backend.playing_sources(), vec!["/sound/a.mp3".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_blocked_until_interaction() {
    let f = fixture(false);

    let result = f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await;
    assert_eq!(result, Err(AudioError::AutoplayBlocked));
    assert!(!f.coordinator.is_effect_playing());
    assert!(f.backend.started().is_empty());

    f.gate.set_user_interacted();
    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    assert_eq!(f.backend.started(), vec!["/sound/a.mp3".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_bgm_refused_before_interaction() {
    let f = fixture(false);

    f.coordinator.play_bgm(BGM, 0.5, true).await;
    assert!(!f.coordinator.is_bgm_playing());
    assert!(!f.coordinator.toggle_bgm().await);

    f.gate.set_user_interacted();
    f.coordinator.resume_bgm().await;
    assert!(f.coordinator.is_bgm_playing());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_pauses_and_resumes() {
    let f = fixture(true);
    f.coordinator.play_bgm(BGM, 0.5, true).await;

    assert!(!f.coordinator.toggle_bgm().await);
    assert!(!f.coordinator.is_bgm_playing());

    assert!(f.coordinator.toggle_bgm().await);
    assert!(f.coordinator.is_bgm_playing());
}

#[tokio::test(start_paused = true)]
async fn test_resume_replays_stopped_bgm() {
    let f = fixture(true);
    f.coordinator.play_bgm(BGM, 0.4, true).await;
    f.coordinator.stop_bgm();
    assert!(!f.coordinator.is_bgm_playing());

    f.coordinator.resume_bgm().await;
    assert!(f.coordinator.is_bgm_playing());
    assert!(approx(f.coordinator.bgm_volume(), 0.4));
    assert_eq!(f.coordinator.status().bgm_source.as_deref(), Some(BGM));
}

#[tokio::test(start_paused = true)]
async fn test_effect_events() {
    let f = fixture(true);
    let mut rx = f.events.subscribe();

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    sleep(Duration::from_millis(1100)).await;

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, SqzEvent::EffectStarted { source, .. } if source == "/sound/a.mp3")));
    assert!(seen.iter().any(|e| matches!(
        e,
        SqzEvent::EffectFinished { outcome: EffectOutcome::Ended, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_effect_reports_stopped() {
    let f = fixture(true);
    let mut rx = f.events.subscribe();

    f.coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
    f.coordinator.play_sound_effect("/sound/b.mp3", 1.0).await.unwrap();

    let mut finished = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SqzEvent::EffectFinished { source, outcome, .. } = event {
            finished.push((source, outcome));
        }
    }
    assert_eq!(
        finished,
        vec![("/sound/a.mp3".to_string(), EffectOutcome::Stopped)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_blocked_repeat_request_is_refused_too() {
    let f = fixture(false);

    let (first, second) = tokio::join!(
        f.coordinator.play_sound_effect("/sound/a.mp3", 1.0),
        f.coordinator.play_sound_effect("/sound/a.mp3", 1.0),
    );
    assert_eq!(first, Err(AudioError::AutoplayBlocked));
    assert_eq!(second, Err(AudioError::AutoplayBlocked));
    assert!(!f.coordinator.is_effect_playing());
    assert!(!f.coordinator.is_audible("/sound/a.mp3"));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_restores_while_effect_still_loading() {
    let f = fixture(true);
    f.backend.set_clip(
        "/sound/slow.mp3",
        ClipSpec::new(Duration::from_secs(1)).with_load_delay(Duration::from_secs(10)),
    );
    f.coordinator.play_bgm(BGM, 0.5, true).await;

    let coordinator = f.coordinator.clone();
    let pending = tokio::spawn(async move { coordinator.play_sound_effect("/sound/slow.mp3", 1.0).await });

    sleep(Duration::from_millis(500)).await;
    assert!(approx(f.coordinator.bgm_volume(), 0.1));
    assert!(!f.coordinator.is_effect_audible());

    sleep(Duration::from_millis(2700)).await;
    assert!(approx(f.coordinator.bgm_volume(), 0.5));
    assert!(!f.coordinator.is_effect_audible());

    // Starting late does not duck again
    pending.await.unwrap().unwrap();
    assert!(f.coordinator.is_audible("/sound/slow.mp3"));
    assert!(approx(f.coordinator.bgm_volume(), 0.5));
}

#[tokio::test(start_paused = true)]
async fn test_replacing_bgm_reports_previous_stopped() {
    let f = fixture(true);
    let mut rx = f.events.subscribe();

    f.coordinator.play_bgm(BGM, 0.5, true).await;
    f.coordinator.play_bgm("/bgm/bgm2.mp3", 0.5, true).await;

    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SqzEvent::BgmStateChanged { source, playing, .. } = event {
            states.push((source, playing));
        }
    }
    assert_eq!(
        states,
        vec![
            (Some(BGM.to_string()), true),
            (Some(BGM.to_string()), false),
            (Some("/bgm/bgm2.mp3".to_string()), true),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_remembered_bgm_waits_for_resume() {
    let f = fixture(true);

    f.coordinator.remember_bgm(BGM, 0.4, true);
    assert!(!f.coordinator.is_bgm_playing());

    f.coordinator.resume_bgm().await;
    assert!(f.coordinator.is_bgm_playing());
    assert!(approx(f.coordinator.bgm_volume(), 0.4));
}
