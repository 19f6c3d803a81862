//! In-memory audio backend
//!
//! Models clips with a load delay and a duration using tokio timers, so
//! coordinator behavior can be tested deterministically under a paused clock.
//! Also used by `--headless` mode. Records how many non-looping handles were
//! audible at the same time.

use super::{AudioBackend, AudioHandle, HandleId, HandleStatus};
use crate::error::{AudioError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Injected failure for a clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipFault {
    /// Load fails as if the file did not exist
    Missing,
    /// `play()` is rejected with the given reason
    PlayRejected(String),
    /// `play()` is refused by the platform's autoplay policy
    NotAllowed,
}

/// Simulated clip characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSpec {
    pub duration: Duration,
    pub load_delay: Duration,
    pub fault: Option<ClipFault>,
}

impl ClipSpec {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn with_load_delay(mut self, load_delay: Duration) -> Self {
        self.load_delay = load_delay;
        self
    }

    pub fn with_fault(mut self, fault: ClipFault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl Default for ClipSpec {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(1),
            load_delay: Duration::from_millis(20),
            fault: None,
        }
    }
}

#[derive(Default)]
struct Stats {
    audible: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

struct Shared {
    next_id: AtomicU64,
    default_clip: Mutex<ClipSpec>,
    clips: Mutex<HashMap<String, ClipSpec>>,
    handles: Mutex<Vec<Arc<MemoryHandle>>>,
    stats: Arc<Stats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deterministic backend driven by tokio time
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_default_clip(ClipSpec::default())
    }

    /// Use `spec` for every source without an explicit clip
    pub fn with_default_clip(spec: ClipSpec) -> Self {
        Self {
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(1),
                default_clip: Mutex::new(spec),
                clips: Mutex::new(HashMap::new()),
                handles: Mutex::new(Vec::new()),
                stats: Arc::new(Stats::default()),
            }),
        }
    }

    /// Configure the clip for one source; affects handles created afterwards
    pub fn set_clip(&self, source: &str, spec: ClipSpec) {
        lock(&self.shared.clips).insert(source.to_string(), spec);
    }

    /// Highest number of non-looping handles playing at the same time
    pub fn peak_audible(&self) -> usize {
        self.shared.stats.peak.load(Ordering::SeqCst)
    }

    /// Number of non-looping handles playing now
    pub fn audible(&self) -> usize {
        self.shared.stats.audible.load(Ordering::SeqCst)
    }

    pub fn reset_peak(&self) {
        let now = self.audible();
        self.shared.stats.peak.store(now, Ordering::SeqCst);
    }

    /// Sources in the order playback started
    pub fn started(&self) -> Vec<String> {
        lock(&self.shared.stats.started).clone()
    }

    /// Sources of handles currently playing
    pub fn playing_sources(&self) -> Vec<String> {
        self.live()
            .into_iter()
            .filter(|h| h.status() == HandleStatus::Playing)
            .map(|h| h.source.clone())
            .collect()
    }

    fn live(&self) -> Vec<Arc<MemoryHandle>> {
        let mut handles = lock(&self.shared.handles);
        handles.retain(|h| !h.status().is_terminal());
        handles.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MemoryBackend {
    fn create(&self, source: &str) -> Arc<dyn AudioHandle> {
        let spec = lock(&self.shared.clips)
            .get(source)
            .cloned()
            .unwrap_or_else(|| lock(&self.shared.default_clip).clone());
        let id = HandleId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let (status, _) = watch::channel(HandleStatus::Idle);

        let handle = Arc::new(MemoryHandle {
            id,
            source: source.to_string(),
            core: Arc::new(Core {
                state: Mutex::new(PlayState {
                    volume: 1.0,
                    looping: false,
                    remaining: spec.duration,
                    started_at: None,
                    epoch: 0,
                    counted: false,
                }),
                status,
                stats: Arc::clone(&self.shared.stats),
            }),
            spec,
        });

        let mut handles = lock(&self.shared.handles);
        handles.retain(|h| !h.status().is_terminal());
        handles.push(Arc::clone(&handle));
        debug!("Memory backend created handle {} for {}", id, source);
        handle
    }

    fn handles(&self) -> Vec<Arc<dyn AudioHandle>> {
        self.live()
            .into_iter()
            .map(|h| h as Arc<dyn AudioHandle>)
            .collect()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct PlayState {
    volume: f32,
    looping: bool,
    remaining: Duration,
    started_at: Option<Instant>,
    /// Bumped on every play/pause/stop so stale end timers do nothing
    epoch: u64,
    /// Whether this handle is included in the audible count
    counted: bool,
}

struct Core {
    state: Mutex<PlayState>,
    status: watch::Sender<HandleStatus>,
    stats: Arc<Stats>,
}

impl Core {
    fn state(&self) -> MutexGuard<'_, PlayState> {
        lock(&self.state)
    }

    fn status(&self) -> HandleStatus {
        *self.status.borrow()
    }

    /// Change status; caller holds the state lock
    fn transition(&self, state: &mut PlayState, next: HandleStatus) {
        if self.status() == next {
            return;
        }
        if state.counted {
            self.stats.audible.fetch_sub(1, Ordering::SeqCst);
            state.counted = false;
        }
        if next == HandleStatus::Playing && !state.looping {
            let now = self.stats.audible.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.peak.fetch_max(now, Ordering::SeqCst);
            state.counted = true;
        }
        self.status.send_replace(next);
    }
}

/// Handle created by [`MemoryBackend`]
pub struct MemoryHandle {
    id: HandleId,
    source: String,
    spec: ClipSpec,
    core: Arc<Core>,
}

impl MemoryHandle {
    fn aborted(&self, during: &str) -> AudioError {
        AudioError::PlaybackAborted(format!("{} stopped while {}", self.source, during))
    }

    fn missing(&self) -> AudioError {
        AudioError::asset_load(&self.source, "no such asset")
    }

    /// Wait for a concurrent load to settle
    async fn settled(&self) -> HandleStatus {
        let mut rx = self.core.status.subscribe();
        let status = match rx.wait_for(|s| *s != HandleStatus::Loading).await {
            Ok(status) => *status,
            Err(_) => HandleStatus::Stopped,
        };
        status
    }
}

#[async_trait]
impl AudioHandle for MemoryHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn set_volume(&self, volume: f32) {
        self.core.state().volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.core.state().volume
    }

    /// Takes effect on the next `play()`
    fn set_looping(&self, looping: bool) {
        self.core.state().looping = looping;
    }

    async fn load(&self) -> Result<()> {
        let concurrent = {
            let mut state = self.core.state();
            match self.core.status() {
                HandleStatus::Idle => {
                    self.core.transition(&mut state, HandleStatus::Loading);
                    false
                }
                HandleStatus::Loading => true,
                HandleStatus::Stopped => return Err(self.aborted("loading")),
                HandleStatus::Failed => return Err(self.missing()),
                _ => return Ok(()),
            }
        };
        if concurrent {
            return match self.settled().await {
                HandleStatus::Stopped => Err(self.aborted("loading")),
                HandleStatus::Failed => Err(self.missing()),
                _ => Ok(()),
            };
        }

        tokio::time::sleep(self.spec.load_delay).await;

        let mut state = self.core.state();
        if self.core.status() != HandleStatus::Loading {
            return match self.core.status() {
                HandleStatus::Stopped => Err(self.aborted("loading")),
                _ => Ok(()),
            };
        }
        if self.spec.fault == Some(ClipFault::Missing) {
            self.core.transition(&mut state, HandleStatus::Failed);
            return Err(self.missing());
        }
        self.core.transition(&mut state, HandleStatus::Ready);
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        if matches!(self.core.status(), HandleStatus::Idle | HandleStatus::Loading) {
            self.load().await?;
        }

        let mut state = self.core.state();
        match self.core.status() {
            HandleStatus::Playing => return Ok(()),
            HandleStatus::Stopped => return Err(self.aborted("starting")),
            HandleStatus::Failed => return Err(self.missing()),
            HandleStatus::Ended => state.remaining = self.spec.duration,
            _ => {}
        }
        match &self.spec.fault {
            Some(ClipFault::PlayRejected(reason)) => return Err(AudioError::Playback(reason.clone())),
            Some(ClipFault::NotAllowed) => return Err(AudioError::AutoplayBlocked),
            _ => {}
        }

        state.epoch += 1;
        state.started_at = Some(Instant::now());
        self.core.transition(&mut state, HandleStatus::Playing);
        lock(&self.core.stats.started).push(self.source.clone());

        if !state.looping {
            let core = Arc::clone(&self.core);
            let epoch = state.epoch;
            let remaining = state.remaining;
            tokio::spawn(async move {
                tokio::time::sleep(remaining).await;
                let mut state = core.state();
                if state.epoch == epoch && core.status() == HandleStatus::Playing {
                    state.remaining = Duration::ZERO;
                    state.started_at = None;
                    core.transition(&mut state, HandleStatus::Ended);
                }
            });
        }
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.core.state();
        if self.core.status() != HandleStatus::Playing {
            return;
        }
        if let Some(started) = state.started_at.take() {
            state.remaining = state.remaining.saturating_sub(started.elapsed());
        }
        state.epoch += 1;
        self.core.transition(&mut state, HandleStatus::Paused);
    }

    fn stop(&self) {
        let mut state = self.core.state();
        if matches!(self.core.status(), HandleStatus::Stopped | HandleStatus::Failed) {
            return;
        }
        state.epoch += 1;
        state.started_at = None;
        state.remaining = self.spec.duration;
        self.core.transition(&mut state, HandleStatus::Stopped);
    }

    fn status(&self) -> HandleStatus {
        self.core.status()
    }

    fn subscribe(&self) -> watch::Receiver<HandleStatus> {
        self.core.status.subscribe()
    }
}
