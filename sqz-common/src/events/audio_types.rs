//! Audio-related event payload types

use serde::{Deserialize, Serialize};

/// How a sound effect stopped being current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectOutcome {
    /// Played to the end
    Ended,
    /// Stopped or replaced before the end
    Stopped,
    /// Asset or platform failure after starting
    Failed,
}

/// Snapshot of the audio coordinator for status endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStatus {
    pub user_interacted: bool,
    pub bgm_source: Option<String>,
    pub bgm_playing: bool,
    pub bgm_volume: Option<f32>,
    pub bgm_ducked: bool,
    pub effect_playing: bool,
    pub current_effect: Option<String>,
}
