//! Autoplay gate
//!
//! Records the first qualifying user gesture. Once granted the gate stays
//! granted for the lifetime of the process. The gate only answers "may audio
//! start now"; retrying refused starts is the caller's job.

use serde::{Deserialize, Serialize};
use sqz_common::events::{EventBus, SqzEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// User gesture kinds forwarded by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    PointerDown,
    TouchStart,
    KeyDown,
    PointerMove,
    Scroll,
    Focus,
}

impl Gesture {
    /// Only activation gestures unlock audio output
    pub fn qualifies(&self) -> bool {
        matches!(self, Gesture::PointerDown | Gesture::TouchStart | Gesture::KeyDown)
    }
}

type Primer = Box<dyn Fn() + Send + Sync>;

/// Write-once interaction flag with an async "granted" signal
pub struct AutoplayGate {
    tx: watch::Sender<bool>,
    primer: Option<Primer>,
    events: Option<Arc<EventBus>>,
}

impl AutoplayGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            primer: None,
            events: None,
        }
    }

    /// Run `primer` once, on the transition to granted (best-effort output unlock)
    pub fn with_primer(mut self, primer: impl Fn() + Send + Sync + 'static) -> Self {
        self.primer = Some(Box::new(primer));
        self
    }

    /// Emit `InteractionGranted` on `events` when the gate opens
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Record a gesture. Returns whether interaction is granted afterwards.
    pub fn record_gesture(&self, gesture: Gesture) -> bool {
        if gesture.qualifies() {
            self.grant();
        } else {
            debug!("Ignoring non-activating gesture {:?}", gesture);
        }
        self.is_granted()
    }

    /// Manual override for handlers that know a gesture just happened
    pub fn set_user_interacted(&self) {
        self.grant();
    }

    pub fn is_granted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once interaction is granted (immediately if it already is)
    pub async fn wait_granted(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|granted| *granted).await;
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    fn grant(&self) {
        let opened = self.tx.send_if_modified(|granted| {
            if *granted {
                false
            } else {
                *granted = true;
                true
            }
        });
        if !opened {
            return;
        }

        info!("User interaction recorded, audio unlocked");
        if let Some(primer) = &self.primer {
            primer();
        }
        if let Some(events) = &self.events {
            events.emit_lossy(SqzEvent::InteractionGranted {
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

impl Default for AutoplayGate {
    fn default() -> Self {
        Self::new()
    }
}
