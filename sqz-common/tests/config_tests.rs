//! Configuration loading and graceful degradation
//!
//! Tests that touch SQZ_ROOT_FOLDER are marked #[serial] so environment
//! changes do not race between test threads.

use serial_test::serial;
use sqz_common::config::{
    default_root_folder, load_toml_config, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV,
};
use sqz_common::Error;
use std::env;
use std::path::{Path, PathBuf};

#[test]
fn test_missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_toml_config(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_config_file_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
port = 6000

[audio]
bgm_volume = 0.5
settle_delay_ms = 20

[quiz]
reveal_delay_ms = 250
retry_schedule_ms = [50]
question_source_url = "http://localhost:3000"

[assets]
menu_bgm = "/bgm/bgm1.mp3"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.port, Some(6000));
    assert_eq!(config.audio.bgm_volume, 0.5);
    assert_eq!(config.audio.settle_delay_ms, 20);
    assert_eq!(config.audio.duck_ratio, 0.2);
    assert_eq!(config.quiz.reveal_delay_ms, 250);
    assert_eq!(config.quiz.retry_schedule_ms, vec![50]);
    assert_eq!(config.quiz.question_source_url.as_deref(), Some("http://localhost:3000"));
    assert_eq!(config.assets.menu_bgm.as_deref(), Some("/bgm/bgm1.mp3"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[audio\nbgm_volume = ").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_out_of_range_value_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[audio]\neffect_volume = 2.0\n").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/sqz-env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/sqz-toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/tmp/sqz-cli")), &toml);
    assert_eq!(resolved, PathBuf::from("/tmp/sqz-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/sqz-env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/sqz-toml")),
        ..TomlConfig::default()
    };

    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/tmp/sqz-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_beats_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/sqz-toml")),
        ..TomlConfig::default()
    };

    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/tmp/sqz-toml"));
}

#[test]
#[serial]
fn test_falls_back_to_os_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = resolve_root_folder(None, &TomlConfig::default());
    assert_eq!(resolved, default_root_folder());
    assert!(!resolved.as_os_str().is_empty());
}
