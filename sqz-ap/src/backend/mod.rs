//! Audio platform seam
//!
//! An [`AudioHandle`] is one playable clip (the analogue of a media element);
//! an [`AudioBackend`] creates handles and can enumerate every live one,
//! including handles nobody in the coordinator tracks anymore.

pub mod device;
pub mod memory;

pub use device::DeviceBackend;
pub use memory::{ClipFault, ClipSpec, MemoryBackend};

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Backend-unique handle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a handle
///
/// `Ended`, `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleStatus {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Stopped,
    Failed,
}

impl HandleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleStatus::Ended | HandleStatus::Stopped | HandleStatus::Failed)
    }
}

/// One playable clip
#[async_trait]
pub trait AudioHandle: Send + Sync {
    fn id(&self) -> HandleId;

    fn source(&self) -> &str;

    /// Set volume, clamped to 0.0-1.0
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;

    fn set_looping(&self, looping: bool);

    /// Resolve once the clip is playable
    ///
    /// Fails with `AssetLoad` for missing or undecodable assets and with
    /// `PlaybackAborted` if the handle is stopped meanwhile.
    async fn load(&self) -> Result<()>;

    /// Start or resume playback, loading first if needed
    async fn play(&self) -> Result<()>;

    fn pause(&self);

    /// Pause, rewind and release. Complete when this returns; the handle
    /// cannot be played again.
    fn stop(&self);

    fn status(&self) -> HandleStatus;

    fn is_paused(&self) -> bool {
        self.status() != HandleStatus::Playing
    }

    /// Status updates; the current value is available immediately
    fn subscribe(&self) -> watch::Receiver<HandleStatus>;
}

/// Creates handles and tracks the live ones
pub trait AudioBackend: Send + Sync {
    /// Create an idle handle for `source` (never fails; errors surface on load)
    fn create(&self, source: &str) -> Arc<dyn AudioHandle>;

    /// Every live (non-terminal) handle, including untracked ones
    fn handles(&self) -> Vec<Arc<dyn AudioHandle>>;

    /// Best-effort output unlock, called once when interaction is granted
    fn prime(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
