//! Device audio backend
//!
//! Clips are resolved under the asset root, decoded whole with symphonia on a
//! blocking thread, resampled with rubato to the device rate and mixed into a
//! single cpal output stream. The stream is opened lazily, on `prime()` or
//! the first play.

mod decode;
mod mixer;
mod output;
mod resample;

pub use decode::{decode_file, DecodedClip};
pub use output::{probe_device, OutputInfo};

use super::{AudioBackend, AudioHandle, HandleId, HandleStatus};
use crate::error::{AudioError, Result};
use async_trait::async_trait;
use mixer::{Mixer, Voice};
use output::OutputThread;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map a source reference ("/sound/a.mp3") to a file under `root`.
///
/// Rejects parent, current-directory and backslash components.
pub fn resolve_source(root: &Path, source: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut parts = 0;
    for part in source.split('/').filter(|p| !p.is_empty()) {
        if part == ".." || part == "." || part.contains('\\') {
            return Err(AudioError::asset_load(source, "invalid path component"));
        }
        path.push(part);
        parts += 1;
    }
    if parts == 0 {
        return Err(AudioError::asset_load(source, "empty source"));
    }
    Ok(path)
}

/// Lazily opened output stream plus its mixer
struct Output {
    device_name: Option<String>,
    mixer: Arc<Mixer>,
    thread: Mutex<Option<OutputThread>>,
}

impl Output {
    /// Open the stream if needed and return the output sample rate. Blocking.
    fn ensure_open(&self) -> Result<u32> {
        let mut thread = lock(&self.thread);
        if let Some(running) = thread.as_ref() {
            return Ok(running.info().sample_rate);
        }
        let running = OutputThread::spawn(self.device_name.clone(), Arc::clone(&self.mixer))?;
        let rate = running.info().sample_rate;
        *thread = Some(running);
        Ok(rate)
    }

    async fn sample_rate(self: &Arc<Self>) -> Result<u32> {
        let running = lock(&self.thread).as_ref().map(|t| t.info().sample_rate);
        if let Some(rate) = running {
            return Ok(rate);
        }
        let output = Arc::clone(self);
        tokio::task::spawn_blocking(move || output.ensure_open())
            .await
            .map_err(|e| AudioError::Output(format!("Output open task failed: {}", e)))?
    }
}

/// Backend playing through a cpal output device
pub struct DeviceBackend {
    root: PathBuf,
    output: Arc<Output>,
    handles: Mutex<Vec<Arc<DeviceHandle>>>,
    next_id: AtomicU64,
}

impl DeviceBackend {
    /// Create the backend without touching the device
    pub fn new(root: impl Into<PathBuf>, device_name: Option<String>) -> Self {
        Self {
            root: root.into(),
            output: Arc::new(Output {
                device_name,
                mixer: Arc::new(Mixer::new()),
                thread: Mutex::new(None),
            }),
            handles: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create the backend after checking that an output device exists
    pub fn open(root: impl Into<PathBuf>, device_name: Option<String>) -> Result<Self> {
        let found = probe_device(device_name.as_deref())?;
        info!("Audio output device available: {}", found);
        Ok(Self::new(root, device_name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AudioBackend for DeviceBackend {
    fn create(&self, source: &str) -> Arc<dyn AudioHandle> {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (status, _) = watch::channel(HandleStatus::Idle);
        let handle = Arc::new(DeviceHandle {
            id,
            source: source.to_string(),
            path: resolve_source(&self.root, source),
            output: Arc::clone(&self.output),
            status: Arc::new(status),
            state: Mutex::new(DeviceState {
                volume: 1.0,
                looping: false,
                clip: None,
                voice: None,
                failure: None,
            }),
        });

        let mut handles = lock(&self.handles);
        handles.retain(|h| !h.status().is_terminal());
        handles.push(Arc::clone(&handle));
        handle
    }

    fn handles(&self) -> Vec<Arc<dyn AudioHandle>> {
        let mut handles = lock(&self.handles);
        handles.retain(|h| !h.status().is_terminal());
        handles
            .iter()
            .map(|h| Arc::clone(h) as Arc<dyn AudioHandle>)
            .collect()
    }

    fn prime(&self) -> Result<()> {
        self.output.ensure_open().map(|_| ())
    }

    fn name(&self) -> &'static str {
        "device"
    }
}

struct DeviceState {
    volume: f32,
    looping: bool,
    clip: Option<DecodedClip>,
    voice: Option<Arc<Voice>>,
    failure: Option<AudioError>,
}

/// Handle created by [`DeviceBackend`]
pub struct DeviceHandle {
    id: HandleId,
    source: String,
    path: Result<PathBuf>,
    output: Arc<Output>,
    status: Arc<watch::Sender<HandleStatus>>,
    state: Mutex<DeviceState>,
}

impl DeviceHandle {
    fn set_status(&self, status: HandleStatus) {
        self.status.send_replace(status);
    }

    fn aborted(&self, during: &str) -> AudioError {
        AudioError::PlaybackAborted(format!("{} stopped while {}", self.source, during))
    }

    fn failure(&self, state: &DeviceState) -> AudioError {
        state
            .failure
            .clone()
            .unwrap_or_else(|| AudioError::asset_load(&self.source, "load failed"))
    }

    fn fail(&self, error: AudioError) -> AudioError {
        let mut state = lock(&self.state);
        if self.status() == HandleStatus::Stopped {
            return self.aborted("loading");
        }
        state.failure = Some(error.clone());
        self.set_status(HandleStatus::Failed);
        error
    }

    /// Clip converted to the output rate, cached after the first conversion
    async fn clip_for(&self, rate: u32) -> Result<DecodedClip> {
        let clip = lock(&self.state)
            .clip
            .clone()
            .ok_or_else(|| self.aborted("starting"))?;
        if clip.sample_rate == rate {
            return Ok(clip);
        }

        let source = Arc::clone(&clip.samples);
        let from = clip.sample_rate;
        let samples = tokio::task::spawn_blocking(move || resample::resample(&source, from, rate, 2))
            .await
            .map_err(|e| AudioError::Playback(format!("Resample task failed: {}", e)))??;
        let converted = DecodedClip {
            samples: samples.into(),
            sample_rate: rate,
        };
        lock(&self.state).clip = Some(converted.clone());
        Ok(converted)
    }
}

#[async_trait]
impl AudioHandle for DeviceHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn set_volume(&self, volume: f32) {
        let mut state = lock(&self.state);
        state.volume = volume.clamp(0.0, 1.0);
        if let Some(voice) = &state.voice {
            voice.set_volume(state.volume);
        }
    }

    fn volume(&self) -> f32 {
        lock(&self.state).volume
    }

    fn set_looping(&self, looping: bool) {
        let mut state = lock(&self.state);
        state.looping = looping;
        if let Some(voice) = &state.voice {
            voice.set_looping(looping);
        }
    }

    async fn load(&self) -> Result<()> {
        let concurrent = {
            let state = lock(&self.state);
            match self.status() {
                HandleStatus::Idle => {
                    self.set_status(HandleStatus::Loading);
                    false
                }
                HandleStatus::Loading => true,
                HandleStatus::Stopped => return Err(self.aborted("loading")),
                HandleStatus::Failed => return Err(self.failure(&state)),
                _ => return Ok(()),
            }
        };
        if concurrent {
            let mut rx = self.status.subscribe();
            let settled = rx
                .wait_for(|s| *s != HandleStatus::Loading)
                .await
                .map(|s| *s)
                .unwrap_or(HandleStatus::Stopped);
            return match settled {
                HandleStatus::Stopped => Err(self.aborted("loading")),
                HandleStatus::Failed => Err(self.failure(&lock(&self.state))),
                _ => Ok(()),
            };
        }

        let path = match &self.path {
            Ok(path) => path.clone(),
            Err(e) => return Err(self.fail(e.clone())),
        };
        let decoded = tokio::task::spawn_blocking(move || decode_file(&path))
            .await
            .map_err(|e| AudioError::Playback(format!("Decode task failed: {}", e)))
            .and_then(|result| result);

        let clip = match decoded {
            Ok(clip) => clip,
            Err(e) => return Err(self.fail(e)),
        };

        let mut state = lock(&self.state);
        if self.status() != HandleStatus::Loading {
            return Err(self.aborted("loading"));
        }
        debug!("Loaded {} ({:?})", self.source, clip.duration());
        state.clip = Some(clip);
        self.set_status(HandleStatus::Ready);
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        if matches!(self.status(), HandleStatus::Idle | HandleStatus::Loading) {
            self.load().await?;
        }

        {
            let state = lock(&self.state);
            match self.status() {
                HandleStatus::Playing => return Ok(()),
                HandleStatus::Stopped => return Err(self.aborted("starting")),
                HandleStatus::Failed => return Err(self.failure(&state)),
                HandleStatus::Paused => {
                    if let Some(voice) = &state.voice {
                        voice.set_active(true);
                        self.set_status(HandleStatus::Playing);
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        let rate = self.output.sample_rate().await?;
        let clip = self.clip_for(rate).await?;

        let mut state = lock(&self.state);
        if self.status() == HandleStatus::Stopped {
            return Err(self.aborted("starting"));
        }
        let voice = Voice::new(clip.samples, state.volume, state.looping, Arc::clone(&self.status));
        self.output.mixer.add(Arc::clone(&voice));
        if let Some(previous) = state.voice.replace(voice) {
            self.output.mixer.remove(&previous);
        }
        self.set_status(HandleStatus::Playing);
        Ok(())
    }

    fn pause(&self) {
        let state = lock(&self.state);
        if self.status() != HandleStatus::Playing {
            return;
        }
        if let Some(voice) = &state.voice {
            voice.set_active(false);
        }
        self.set_status(HandleStatus::Paused);
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        if matches!(self.status(), HandleStatus::Stopped | HandleStatus::Failed) {
            return;
        }
        if let Some(voice) = state.voice.take() {
            self.output.mixer.remove(&voice);
        }
        state.clip = None;
        self.set_status(HandleStatus::Stopped);
    }

    fn status(&self) -> HandleStatus {
        *self.status.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<HandleStatus> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_source() {
        let root = Path::new("/srv/sqz");
        assert_eq!(
            resolve_source(root, "/sound/cat.mp3").unwrap(),
            PathBuf::from("/srv/sqz/sound/cat.mp3")
        );
        assert_eq!(
            resolve_source(root, "bgm//bgm1.mp3").unwrap(),
            PathBuf::from("/srv/sqz/bgm/bgm1.mp3")
        );
    }

    #[test]
    fn test_resolve_source_rejects_traversal() {
        let root = Path::new("/srv/sqz");
        assert!(resolve_source(root, "/sound/../../etc/passwd").is_err());
        assert!(resolve_source(root, "/sound/./a.mp3").is_err());
        assert!(resolve_source(root, "/").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_fails_without_device() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DeviceBackend::new(dir.path(), None);
        let handle = backend.create("/sound/missing.mp3");

        let result = handle.load().await;
        assert!(matches!(result, Err(AudioError::AssetLoad { .. })));
        assert_eq!(handle.status(), HandleStatus::Failed);
        assert!(matches!(handle.play().await, Err(AudioError::AssetLoad { .. })));
    }

    #[tokio::test]
    async fn test_traversal_source_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DeviceBackend::new(dir.path(), None);
        let handle = backend.create("/../secret.mp3");

        assert!(matches!(handle.load().await, Err(AudioError::AssetLoad { .. })));
    }

    #[test]
    fn test_stop_idle_handle_releases_it() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DeviceBackend::new(dir.path(), None);
        let handle = backend.create("/sound/a.mp3");
        assert_eq!(backend.handles().len(), 1);

        handle.stop();
        assert_eq!(handle.status(), HandleStatus::Stopped);
        assert!(backend.handles().is_empty());
    }
}
