//! Error types for sqz-ap
//!
//! Every audio failure is classified so callers can tell a benign pre-emption
//! from a refusal or a real fault.

use thiserror::Error;

/// Audio layer error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// No qualifying user interaction recorded yet (or the platform refused the start)
    #[error("Autoplay blocked: no user interaction recorded")]
    AutoplayBlocked,

    /// Asset missing, unreadable or undecodable
    #[error("Failed to load asset {asset}: {reason}")]
    AssetLoad { asset: String, reason: String },

    /// Start pre-empted by a stop or a newer request
    #[error("Playback aborted: {0}")]
    PlaybackAborted(String),

    /// Any other start or playback failure
    #[error("Playback error: {0}")]
    Playback(String),

    /// Output device could not be opened or driven
    #[error("Audio output error: {0}")]
    Output(String),
}

impl AudioError {
    pub fn asset_load(asset: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AudioError::AssetLoad {
            asset: asset.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is a pre-emption that callers should swallow
    pub fn is_benign(&self) -> bool {
        matches!(self, AudioError::PlaybackAborted(_))
    }
}

/// Convenience Result type using AudioError
pub type Result<T> = std::result::Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_abort_is_benign() {
        assert!(AudioError::PlaybackAborted("stopped".into()).is_benign());
        assert!(!AudioError::AutoplayBlocked.is_benign());
        assert!(!AudioError::asset_load("/sound/a.mp3", "missing").is_benign());
    }

    #[test]
    fn test_display() {
        let err = AudioError::asset_load("/sound/a.mp3", "not found");
        assert_eq!(err.to_string(), "Failed to load asset /sound/a.mp3: not found");
    }
}
