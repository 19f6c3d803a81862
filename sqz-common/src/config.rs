//! Bootstrap configuration and root folder resolution
//!
//! Configuration is a single TOML file in which every field has a built-in
//! default. A missing file is not fatal: the application logs a warning and
//! starts with defaults. A file that exists but does not parse is an error.
//!
//! # Root folder priority
//!
//! 1. Command-line argument (`--root-folder`)
//! 2. Environment variable (`SQZ_ROOT_FOLDER`)
//! 3. TOML `root_folder`
//! 4. OS-dependent default data directory

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the asset root folder
pub const ROOT_FOLDER_ENV: &str = "SQZ_ROOT_FOLDER";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5780;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Asset root folder (optional; see [`resolve_root_folder`])
    pub root_folder: Option<PathBuf>,

    /// HTTP server port (optional; CLI and env take precedence)
    pub port: Option<u16>,

    pub audio: AudioConfig,
    pub quiz: QuizConfig,
    pub assets: AssetConfig,
    pub logging: LoggingConfig,
}

/// `[audio]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Volume applied to every sound effect (0.0-1.0)
    pub effect_volume: f32,
    /// Nominal background music volume (0.0-1.0)
    pub bgm_volume: f32,
    /// Multiplier applied to BGM volume while an effect plays
    pub duck_ratio: f32,
    /// Safety-net delay after which ducking is undone even without an end signal
    pub duck_restore_fallback_ms: u64,
    /// Pause after stopping handles, before the next start
    pub settle_delay_ms: u64,
    /// Output device name; the default device is used when absent or not found
    pub device_name: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            effect_volume: 1.0,
            bgm_volume: 0.3,
            duck_ratio: 0.2,
            duck_restore_fallback_ms: 3000,
            settle_delay_ms: 50,
            device_name: None,
        }
    }
}

impl AudioConfig {
    pub fn duck_restore_fallback(&self) -> Duration {
        Duration::from_millis(self.duck_restore_fallback_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// `[quiz]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    pub max_questions: usize,
    pub distractor_count: usize,
    /// Delay between answer selection and automatic advance
    pub reveal_delay_ms: u64,
    pub auto_advance: bool,
    /// Elapsed-time resolution
    pub tick_interval_ms: u64,
    /// Delays after which question playback is retried if it has not started
    pub retry_schedule_ms: Vec<u64>,
    pub prompt_text: String,
    /// Base URL of a server exposing `/api/sounds` and `/api/images`
    pub question_source_url: Option<String>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            max_questions: 10,
            distractor_count: 3,
            reveal_delay_ms: 1000,
            auto_advance: true,
            tick_interval_ms: 10,
            retry_schedule_ms: vec![100, 300, 600],
            prompt_text: "Which picture matches the sound?".to_string(),
            question_source_url: None,
        }
    }
}

impl QuizConfig {
    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn retry_schedule(&self) -> Vec<Duration> {
        self.retry_schedule_ms.iter().copied().map(Duration::from_millis).collect()
    }
}

/// `[assets]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub sound_dir: String,
    pub image_dir: String,
    pub bgm_dir: String,
    pub sound_extension: String,
    pub image_extension: String,
    /// Menu background track, e.g. "/bgm/bgm1.mp3"
    pub menu_bgm: Option<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            sound_dir: "sound".to_string(),
            image_dir: "img".to_string(),
            bgm_dir: "bgm".to_string(),
            sound_extension: "mp3".to_string(),
            image_extension: "webp".to_string(),
            menu_bgm: None,
        }
    }
}

impl AssetConfig {
    /// Playable reference for a sound file name ("/sound/cat.mp3")
    pub fn sound_source(&self, file: &str) -> String {
        format!("/{}/{}", self.sound_dir, file)
    }

    /// Displayable reference for an image file name ("/img/cat.webp")
    pub fn image_source(&self, file: &str) -> String {
        format!("/{}/{}", self.image_dir, file)
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load the bootstrap configuration.
///
/// Missing file → defaults plus a warning. Unreadable or malformed file → `Error::Config`.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(TomlConfig::default());
        }
        Err(e) => {
            return Err(Error::Config(format!("Failed to read {}: {}", path.display(), e)));
        }
    };

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    config.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

impl TomlConfig {
    /// Reject values that would make the quiz or mixer misbehave
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        for (name, value) in [
            ("audio.effect_volume", self.audio.effect_volume),
            ("audio.bgm_volume", self.audio.bgm_volume),
            ("audio.duck_ratio", self.audio.duck_ratio),
        ] {
            if !unit.contains(&value) {
                return Err(Error::Config(format!("{} must be within 0.0-1.0, got {}", name, value)));
            }
        }
        if self.quiz.max_questions == 0 {
            return Err(Error::Config("quiz.max_questions must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Default configuration file location (`<config dir>/sqz/config.toml`)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("sqz").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("sqz.toml"))
}

/// Resolve the asset root folder: CLI → `SQZ_ROOT_FOLDER` → TOML → OS default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sqz"))
        .unwrap_or_else(|| PathBuf::from("./sqz_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.audio.duck_ratio, 0.2);
        assert_eq!(config.audio.duck_restore_fallback(), Duration::from_secs(3));
        assert_eq!(config.quiz.max_questions, 10);
        assert_eq!(config.quiz.retry_schedule_ms, vec![100, 300, 600]);
        assert_eq!(config.assets.sound_dir, "sound");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/srv/sqz"

            [quiz]
            max_questions = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/sqz")));
        assert_eq!(config.quiz.max_questions, 5);
        assert_eq!(config.quiz.distractor_count, 3);
        assert_eq!(config.audio.bgm_volume, 0.3);
    }

    #[test]
    fn test_asset_sources() {
        let assets = AssetConfig::default();
        assert_eq!(assets.sound_source("cat.mp3"), "/sound/cat.mp3");
        assert_eq!(assets.image_source("cat.webp"), "/img/cat.webp");
    }

    #[test]
    fn test_validate_rejects_out_of_range_volume() {
        let mut config = TomlConfig::default();
        config.audio.duck_ratio = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let quiz = QuizConfig {
            tick_interval_ms: 0,
            ..QuizConfig::default()
        };
        assert_eq!(quiz.tick_interval(), Duration::from_millis(1));
    }
}
