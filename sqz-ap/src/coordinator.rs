//! Audio coordinator
//!
//! Owns at most one background music handle and one sound effect handle.
//!
//! # Effect lifecycle
//!
//! Every effect request gets a generation number. The request claims the
//! effect slot atomically (so a repeated request for the same source is a
//! no-op even before the first one has loaded), halts whatever played before,
//! waits a short settle delay, then loads and starts its own handle. After
//! each suspension the request re-checks that its generation still owns the
//! slot; a superseded request releases its handle and resolves `Ok`.
//!
//! # Ducking
//!
//! BGM is lowered while an effect is current and restored by whichever comes
//! first: the effect ending (or failing), the fallback timer, or `stop_all`.
//! Restoring is owner-checked and idempotent.
//!
//! The internal lock is never held across an `.await`.

use crate::backend::{AudioBackend, AudioHandle, HandleId, HandleStatus};
use crate::duck::DuckState;
use crate::error::{AudioError, Result};
use crate::gate::AutoplayGate;
use sqz_common::config::AudioConfig;
use sqz_common::events::{AudioStatus, EffectOutcome, EventBus, SqzEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Coordinator tuning
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Initial nominal BGM volume
    pub bgm_volume: f32,
    /// BGM volume multiplier while an effect is current
    pub duck_ratio: f32,
    /// Restore ducking after this long even if no end signal arrives
    pub duck_restore_fallback: Duration,
    /// Pause between halting old handles and starting a new effect
    pub settle_delay: Duration,
}

impl From<&AudioConfig> for CoordinatorConfig {
    fn from(config: &AudioConfig) -> Self {
        Self {
            bgm_volume: config.bgm_volume,
            duck_ratio: config.duck_ratio,
            duck_restore_fallback: config.duck_restore_fallback(),
            settle_delay: config.settle_delay(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

struct BgmSlot {
    source: String,
    handle: Arc<dyn AudioHandle>,
}

struct EffectSlot {
    generation: u64,
    source: String,
    /// None until the handle is created after the settle delay
    handle: Option<Arc<dyn AudioHandle>>,
    /// Set once playback actually started
    playing: bool,
}

struct AudioState {
    bgm: Option<BgmSlot>,
    /// Most recent BGM request (source, looping), replayed by `resume_bgm`
    last_bgm: Option<(String, bool)>,
    effect: Option<EffectSlot>,
    generation: u64,
    duck: DuckState,
}

impl AudioState {
    fn owned_by(&self, generation: u64) -> bool {
        self.effect.as_ref().is_some_and(|slot| slot.generation == generation)
    }

    /// Push the effective BGM volume to the live handle
    fn apply_bgm_volume(&self) -> Option<f32> {
        let bgm = self.bgm.as_ref()?;
        let volume = self.duck.effective();
        bgm.handle.set_volume(volume);
        Some(volume)
    }

    /// Handles that must survive orphan cleanup
    fn tracked_ids(&self) -> Vec<HandleId> {
        let bgm = self.bgm.as_ref().map(|b| b.handle.id());
        let effect = self
            .effect
            .as_ref()
            .and_then(|slot| slot.handle.as_ref())
            .map(|h| h.id());
        bgm.into_iter().chain(effect).collect()
    }
}

struct Inner {
    backend: Arc<dyn AudioBackend>,
    gate: Arc<AutoplayGate>,
    events: Arc<EventBus>,
    config: CoordinatorConfig,
    state: Mutex<AudioState>,
}

/// Single owner of BGM and effect playback
///
/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct AudioCoordinator {
    inner: Arc<Inner>,
}

impl AudioCoordinator {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        gate: Arc<AutoplayGate>,
        events: Arc<EventBus>,
        config: CoordinatorConfig,
    ) -> Self {
        info!("Audio coordinator using {} backend", backend.name());
        let duck = DuckState::new(config.bgm_volume, config.duck_ratio);
        Self {
            inner: Arc::new(Inner {
                backend,
                gate,
                events,
                config,
                state: Mutex::new(AudioState {
                    bgm: None,
                    last_bgm: None,
                    effect: None,
                    generation: 0,
                    duck,
                }),
            }),
        }
    }

    pub fn gate(&self) -> &Arc<AutoplayGate> {
        &self.inner.gate
    }

    pub fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.inner.backend
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, AudioState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SqzEvent) {
        self.inner.events.emit_lossy(event);
    }

    fn emit_volume(&self, volume: f32, ducked: bool) {
        self.emit(SqzEvent::BgmVolumeChanged {
            volume,
            ducked,
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit_bgm_state(&self, source: Option<String>, playing: bool) {
        self.emit(SqzEvent::BgmStateChanged {
            source,
            playing,
            timestamp: chrono::Utc::now(),
        });
    }

    // ----------------------------------------------------------------------
    // Background music
    // ----------------------------------------------------------------------

    /// Replace the BGM track and try to play it.
    ///
    /// Never fails: a closed gate or a broken asset is logged and leaves no
    /// BGM playing.
    pub async fn play_bgm(&self, source: &str, volume: f32, looping: bool) {
        let previous = {
            let mut state = self.state();
            state.last_bgm = Some((source.to_string(), looping));
            state.duck.set_nominal(volume);
            state.bgm.take()
        };
        if let Some(previous) = previous {
            previous.handle.stop();
            self.emit_bgm_state(Some(previous.source), false);
        }

        if !self.inner.gate.is_granted() {
            debug!("BGM {} not started: no user interaction yet", source);
            return;
        }

        let handle = {
            let mut state = self.state();
            let handle = self.inner.backend.create(source);
            handle.set_looping(looping);
            handle.set_volume(state.duck.effective());
            state.bgm = Some(BgmSlot {
                source: source.to_string(),
                handle: Arc::clone(&handle),
            });
            handle
        };

        match handle.play().await {
            Ok(()) => {
                info!("BGM started: {}", source);
                self.emit_bgm_state(Some(source.to_string()), true);
            }
            Err(e) => {
                if e.is_benign() {
                    debug!("BGM {} start pre-empted: {}", source, e);
                } else {
                    warn!("BGM {} failed to start: {}", source, e);
                }
                self.drop_bgm_handle(handle.id());
                handle.stop();
            }
        }
    }

    /// Record the track `resume_bgm` replays, without touching live BGM
    pub fn remember_bgm(&self, source: &str, volume: f32, looping: bool) {
        let mut state = self.state();
        state.last_bgm = Some((source.to_string(), looping));
        if state.bgm.is_none() {
            state.duck.set_nominal(volume);
        }
    }

    fn drop_bgm_handle(&self, id: HandleId) {
        let mut state = self.state();
        if state.bgm.as_ref().is_some_and(|b| b.handle.id() == id) {
            state.bgm = None;
        }
    }

    /// Stop and release the BGM handle. Idempotent.
    pub fn stop_bgm(&self) {
        let previous = self.state().bgm.take();
        if let Some(previous) = previous {
            previous.handle.stop();
            debug!("BGM stopped: {}", previous.source);
            self.emit_bgm_state(Some(previous.source), false);
        }
    }

    /// Set the nominal BGM volume (clamped). No-op without a BGM handle.
    ///
    /// While ducked the handle keeps the ducked level of the new volume.
    pub fn adjust_bgm_volume(&self, volume: f32) {
        let applied = {
            let mut state = self.state();
            if state.bgm.is_none() {
                return;
            }
            state.duck.set_nominal(volume);
            state.apply_bgm_volume().map(|v| (v, state.duck.is_ducked()))
        };
        if let Some((volume, ducked)) = applied {
            self.emit_volume(volume, ducked);
        }
    }

    /// Pause or resume the BGM handle. Returns whether BGM plays afterwards.
    ///
    /// Resuming is refused (logged) while the gate is closed.
    pub async fn toggle_bgm(&self) -> bool {
        let bgm = {
            let state = self.state();
            state
                .bgm
                .as_ref()
                .map(|b| (Arc::clone(&b.handle), b.source.clone()))
        };
        let Some((handle, source)) = bgm else {
            debug!("BGM toggle ignored: no BGM handle");
            return false;
        };

        if handle.status() == HandleStatus::Playing {
            handle.pause();
            self.emit_bgm_state(Some(source), false);
            return false;
        }

        if !self.inner.gate.is_granted() {
            warn!("BGM resume refused: no user interaction yet");
            return false;
        }
        match handle.play().await {
            Ok(()) => {
                self.emit_bgm_state(Some(source), true);
                true
            }
            Err(e) => {
                warn!("BGM {} failed to resume: {}", source, e);
                false
            }
        }
    }

    /// Resume paused BGM, or replay the last requested track if none is live
    pub async fn resume_bgm(&self) {
        let (handle, last, volume) = {
            let state = self.state();
            (
                state.bgm.as_ref().map(|b| Arc::clone(&b.handle)),
                state.last_bgm.clone(),
                state.duck.nominal(),
            )
        };

        match handle {
            Some(handle) if handle.status() == HandleStatus::Playing => {}
            Some(_) => {
                self.toggle_bgm().await;
            }
            None => {
                if let Some((source, looping)) = last {
                    self.play_bgm(&source, volume, looping).await;
                }
            }
        }
    }

    pub fn is_bgm_playing(&self) -> bool {
        self.state()
            .bgm
            .as_ref()
            .is_some_and(|b| b.handle.status() == HandleStatus::Playing)
    }

    /// Volume of the live BGM handle
    pub fn bgm_volume(&self) -> Option<f32> {
        self.state().bgm.as_ref().map(|b| b.handle.volume())
    }

    // ----------------------------------------------------------------------
    // Sound effects
    // ----------------------------------------------------------------------

    /// Make `source` the current sound effect.
    ///
    /// - Gate closed: `AutoplayBlocked`, checked before anything else
    /// - Same source already current or starting: no-op `Ok`
    /// - Pre-empted by a newer request or `stop_all`: `Ok`
    /// - Load or start failure: the error, with state cleared
    ///
    /// Cancel-safe: the start sequence runs on its own task.
    pub async fn play_sound_effect(&self, source: &str, volume: f32) -> Result<()> {
        let this = self.clone();
        let source = source.to_string();
        tokio::spawn(async move { this.start_effect(source, volume).await })
            .await
            .unwrap_or_else(|e| Err(AudioError::Playback(format!("Effect start task failed: {}", e))))
    }

    async fn start_effect(&self, source: String, volume: f32) -> Result<()> {
        // The gate never closes again, so one check up front covers the whole start
        if !self.inner.gate.is_granted() {
            debug!("Effect {} refused: no user interaction yet", source);
            return Err(AudioError::AutoplayBlocked);
        }

        let (generation, previous) = {
            let mut state = self.state();
            if state.effect.as_ref().is_some_and(|slot| slot.source == source) {
                debug!("Effect {} already current, ignoring repeat request", source);
                return Ok(());
            }
            state.generation += 1;
            let generation = state.generation;
            let previous = state.effect.replace(EffectSlot {
                generation,
                source: source.clone(),
                handle: None,
                playing: false,
            });
            state.duck.transfer(generation);
            (generation, previous)
        };

        if let Some(previous) = previous {
            self.release_slot(previous);
        }
        self.halt_orphans();
        tokio::time::sleep(self.inner.config.settle_delay).await;

        if !self.owns(generation) {
            debug!("Effect {} superseded before start", source);
            return Ok(());
        }

        let (handle, ducked) = {
            let mut state = self.state();
            if !state.owned_by(generation) {
                return Ok(());
            }
            let handle = self.inner.backend.create(&source);
            handle.set_volume(volume);
            if let Some(slot) = state.effect.as_mut() {
                slot.handle = Some(Arc::clone(&handle));
            }
            let ducked = if state.duck.duck(generation) {
                state.apply_bgm_volume()
            } else {
                None
            };
            (handle, ducked)
        };
        if let Some(volume) = ducked {
            self.emit_volume(volume, true);
        }
        self.arm_duck_fallback(generation);

        let started = match handle.load().await {
            Ok(()) if self.owns(generation) => handle.play().await,
            Ok(()) => Err(AudioError::PlaybackAborted(format!("{} superseded while loading", source))),
            Err(e) => Err(e),
        };

        match started {
            Ok(()) => {
                let current = {
                    let mut state = self.state();
                    match state.effect.as_mut() {
                        Some(slot) if slot.generation == generation => {
                            slot.playing = true;
                            true
                        }
                        _ => false,
                    }
                };
                if !current {
                    handle.stop();
                    return Ok(());
                }

                debug!("Effect started: {}", source);
                self.emit(SqzEvent::EffectStarted {
                    source,
                    timestamp: chrono::Utc::now(),
                });
                self.watch_effect(generation, handle);
                Ok(())
            }
            Err(e) if e.is_benign() => {
                handle.stop();
                self.finish_effect(generation, EffectOutcome::Stopped);
                debug!("Effect {} start aborted: {}", source, e);
                Ok(())
            }
            Err(e) => {
                handle.stop();
                self.finish_effect(generation, EffectOutcome::Failed);
                warn!("Effect {} failed: {}", source, e);
                Err(e)
            }
        }
    }

    fn owns(&self, generation: u64) -> bool {
        self.state().owned_by(generation)
    }

    /// Clear the slot and undo ducking when the effect ends. Idempotent.
    fn watch_effect(&self, generation: u64, handle: Arc<dyn AudioHandle>) {
        let mut status = handle.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            let last = status
                .wait_for(|s| s.is_terminal())
                .await
                .map(|s| *s)
                .unwrap_or(HandleStatus::Stopped);
            let outcome = match last {
                HandleStatus::Ended => EffectOutcome::Ended,
                HandleStatus::Failed => EffectOutcome::Failed,
                _ => EffectOutcome::Stopped,
            };
            this.finish_effect(generation, outcome);
        });
    }

    /// Undo `generation`'s duck after the fallback delay, even if it never starts
    fn arm_duck_fallback(&self, generation: u64) {
        let this = self.clone();
        let fallback = self.inner.config.duck_restore_fallback;
        tokio::spawn(async move {
            tokio::time::sleep(fallback).await;
            if this.restore_duck(generation) {
                debug!("BGM volume restored by fallback timer");
            }
        });
    }

    /// Release `generation`'s slot (if still current) and its duck
    fn finish_effect(&self, generation: u64, outcome: EffectOutcome) {
        let (finished, restored) = {
            let mut state = self.state();
            let finished = if state.owned_by(generation) {
                state.effect.take()
            } else {
                None
            };
            let restored = if state.duck.restore(generation) {
                state.apply_bgm_volume()
            } else {
                None
            };
            (finished, restored)
        };

        if let Some(volume) = restored {
            self.emit_volume(volume, false);
        }
        if let Some(slot) = finished {
            if slot.playing {
                self.emit(SqzEvent::EffectFinished {
                    source: slot.source,
                    outcome,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }

    fn restore_duck(&self, generation: u64) -> bool {
        let restored = {
            let mut state = self.state();
            if state.duck.restore(generation) {
                Some(state.apply_bgm_volume())
            } else {
                None
            }
        };
        match restored {
            Some(volume) => {
                if let Some(volume) = volume {
                    self.emit_volume(volume, false);
                }
                true
            }
            None => false,
        }
    }

    /// Stop a slot's handle synchronously
    fn release_slot(&self, slot: EffectSlot) {
        if let Some(handle) = &slot.handle {
            handle.stop();
        }
        if slot.playing {
            self.emit(SqzEvent::EffectFinished {
                source: slot.source,
                outcome: EffectOutcome::Stopped,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Stop every live handle that is neither the BGM nor the current effect
    fn halt_orphans(&self) {
        let keep = self.state().tracked_ids();
        for handle in self.inner.backend.handles() {
            if keep.contains(&handle.id()) || handle.status().is_terminal() {
                continue;
            }
            debug!("Stopping untracked handle {} ({})", handle.id(), handle.source());
            handle.stop();
        }
    }

    /// Stop the current effect and every other non-BGM handle, restore
    /// ducking, and wait for the settle delay.
    ///
    /// A `play_sound_effect` awaited after this returns is never affected by it.
    pub async fn stop_all(&self) {
        let (effect, restored) = {
            let mut state = self.state();
            let effect = state.effect.take();
            let restored = if state.duck.restore_any() {
                state.apply_bgm_volume()
            } else {
                None
            };
            (effect, restored)
        };

        if let Some(slot) = effect {
            debug!("Stopping effect {}", slot.source);
            self.release_slot(slot);
        }
        if let Some(volume) = restored {
            self.emit_volume(volume, false);
        }
        self.halt_orphans();
        tokio::time::sleep(self.inner.config.settle_delay).await;
    }

    /// Whether an effect is current (starting or playing)
    pub fn is_effect_playing(&self) -> bool {
        self.state().effect.is_some()
    }

    /// Source of the current effect
    pub fn current_effect_ref(&self) -> Option<String> {
        self.state().effect.as_ref().map(|slot| slot.source.clone())
    }

    /// Whether the current effect's handle is audible right now
    pub fn is_effect_audible(&self) -> bool {
        self.state()
            .effect
            .as_ref()
            .and_then(|slot| slot.handle.as_ref())
            .is_some_and(|h| h.status() == HandleStatus::Playing)
    }

    /// Whether `source` is the current effect and audible right now
    pub fn is_audible(&self, source: &str) -> bool {
        self.state()
            .effect
            .as_ref()
            .filter(|slot| slot.source == source)
            .and_then(|slot| slot.handle.as_ref())
            .is_some_and(|h| h.status() == HandleStatus::Playing)
    }

    pub fn status(&self) -> AudioStatus {
        let state = self.state();
        let bgm = state.bgm.as_ref();
        AudioStatus {
            user_interacted: self.inner.gate.is_granted(),
            bgm_source: bgm.map(|b| b.source.clone()),
            bgm_playing: bgm.is_some_and(|b| b.handle.status() == HandleStatus::Playing),
            bgm_volume: bgm.map(|b| b.handle.volume()),
            bgm_ducked: state.duck.is_ducked(),
            effect_playing: state.effect.is_some(),
            current_effect: state.effect.as_ref().map(|slot| slot.source.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn coordinator() -> (AudioCoordinator, MemoryBackend) {
        let backend = MemoryBackend::new();
        let gate = Arc::new(AutoplayGate::new());
        gate.set_user_interacted();
        let coordinator = AudioCoordinator::new(
            Arc::new(backend.clone()),
            gate,
            Arc::new(EventBus::new(64)),
            CoordinatorConfig::default(),
        );
        (coordinator, backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_effect_clears_after_end() {
        let (coordinator, _backend) = coordinator();
        coordinator.play_sound_effect("/sound/a.mp3", 1.0).await.unwrap();
        assert_eq!(coordinator.current_effect_ref().as_deref(), Some("/sound/a.mp3"));
        assert!(coordinator.is_effect_audible());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!coordinator.is_effect_playing());
        assert_eq!(coordinator.current_effect_ref(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_bgm_is_idempotent() {
        let (coordinator, _backend) = coordinator();
        coordinator.play_bgm("/bgm/bgm1.mp3", 0.5, true).await;
        assert!(coordinator.is_bgm_playing());

        coordinator.stop_bgm();
        coordinator.stop_bgm();
        assert!(!coordinator.is_bgm_playing());
        assert_eq!(coordinator.bgm_volume(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_volume_without_bgm_is_noop() {
        let (coordinator, _backend) = coordinator();
        coordinator.adjust_bgm_volume(0.9);
        assert_eq!(coordinator.bgm_volume(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot() {
        let (coordinator, _backend) = coordinator();
        coordinator.play_bgm("/bgm/bgm1.mp3", 0.5, true).await;
        let status = coordinator.status();
        assert!(status.user_interacted);
        assert!(status.bgm_playing);
        assert_eq!(status.bgm_source.as_deref(), Some("/bgm/bgm1.mp3"));
        assert!(!status.effect_playing);
    }
}
