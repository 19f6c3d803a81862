//! Event types for the SQZ event system
//!
//! Provides the shared event enum and EventBus used by the audio coordinator,
//! the quiz controller and the SSE stream. Every UI-facing signal is a typed
//! variant here instead of an ad hoc named window event.

mod audio_types;

pub use audio_types::{AudioStatus, EffectOutcome};

use crate::model::QuizPhase;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// SQZ event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SqzEvent {
    /// First qualifying user gesture recorded; audio may start from now on
    InteractionGranted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Background music started, paused, resumed or stopped
    BgmStateChanged {
        source: Option<String>,
        playing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Background music volume changed (ducking or explicit adjustment)
    BgmVolumeChanged {
        volume: f32,
        ducked: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sound effect became audible
    EffectStarted {
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sound effect was released
    EffectFinished {
        source: String,
        outcome: EffectOutcome,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Quiz phase transition
    QuizPhaseChanged {
        session_id: Uuid,
        old_phase: QuizPhase,
        new_phase: QuizPhase,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current question index changed
    QuestionAdvanced {
        session_id: Uuid,
        index: usize,
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User picked an answer for the current question
    AnswerSelected {
        session_id: Uuid,
        index: usize,
        choice: String,
        correct: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic elapsed-time update while playing
    ElapsedTick {
        session_id: Uuid,
        question_elapsed_ms: u64,
        total_elapsed_ms: u64,
    },

    /// Last question advanced past
    GameFinished {
        session_id: Uuid,
        correct: u32,
        incorrect: u32,
        total: usize,
        total_elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Asset listing failed; the quiz cannot start
    QuestionBankLoadFailed {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SqzEvent {
    /// Variant name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SqzEvent::InteractionGranted { .. } => "InteractionGranted",
            SqzEvent::BgmStateChanged { .. } => "BgmStateChanged",
            SqzEvent::BgmVolumeChanged { .. } => "BgmVolumeChanged",
            SqzEvent::EffectStarted { .. } => "EffectStarted",
            SqzEvent::EffectFinished { .. } => "EffectFinished",
            SqzEvent::QuizPhaseChanged { .. } => "QuizPhaseChanged",
            SqzEvent::QuestionAdvanced { .. } => "QuestionAdvanced",
            SqzEvent::AnswerSelected { .. } => "AnswerSelected",
            SqzEvent::ElapsedTick { .. } => "ElapsedTick",
            SqzEvent::GameFinished { .. } => "GameFinished",
            SqzEvent::QuestionBankLoadFailed { .. } => "QuestionBankLoadFailed",
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel: one-to-many, lossy for slow receivers.
pub struct EventBus {
    tx: broadcast::Sender<SqzEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use sqz_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SqzEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SqzEvent) -> Result<usize, broadcast::error::SendError<SqzEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SqzEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_eventbus_emit() {
        let bus = EventBus::new(100);
        let event = SqzEvent::EffectStarted {
            source: "/sound/a.mp3".to_string(),
            timestamp: chrono::Utc::now(),
        };

        // No subscribers yet
        assert!(bus.emit(event.clone()).is_err());

        let mut rx = bus.subscribe();
        assert_eq!(bus.emit(event).unwrap(), 1);

        match rx.recv().await.unwrap() {
            SqzEvent::EffectStarted { source, .. } => assert_eq!(source, "/sound/a.mp3"),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(100);
        // Should not panic even without subscribers
        bus.emit_lossy(SqzEvent::InteractionGranted {
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SqzEvent::QuizPhaseChanged {
            session_id: Uuid::new_v4(),
            old_phase: QuizPhase::Ready,
            new_phase: QuizPhase::Playing,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "QuizPhaseChanged");
        assert_eq!(json["new_phase"], "playing");
        assert_eq!(event.event_type(), "QuizPhaseChanged");
    }

    #[test]
    fn test_effect_finished_outcome_round_trip() {
        let event = SqzEvent::EffectFinished {
            source: "/sound/b.mp3".to_string(),
            outcome: EffectOutcome::Stopped,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SqzEvent = serde_json::from_str(&json).unwrap();
        match back {
            SqzEvent::EffectFinished { outcome, .. } => assert_eq!(outcome, EffectOutcome::Stopped),
            other => panic!("Wrong event type: {:?}", other),
        }
    }
}
