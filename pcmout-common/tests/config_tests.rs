//! Configuration file loading and resolution tests
//!
//! Tests that manipulate PCMOUT_CONFIG are marked with #[serial] so they
//! never race each other on the process environment.

use pcmout_common::config::{resolve_config_path, PlayerConfig, CONFIG_ENV_VAR};
use pcmout_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn test_load_full_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        [playback]
        buffer_duration_ms = 250
        chunk_frames = 512
        write_timeout_ms = 750
        shutdown_timeout_ms = 1500
        drain_poll_interval_ms = 2
        device = "Headphones"

        [logging]
        level = "debug"
        "#,
    );

    let config = PlayerConfig::load(&path).unwrap();
    assert_eq!(config.playback.buffer_duration_ms, 250);
    assert_eq!(config.playback.chunk_frames, 512);
    assert_eq!(config.playback.write_timeout_ms, 750);
    assert_eq!(config.playback.shutdown_timeout_ms, 1500);
    assert_eq!(config.playback.drain_poll_interval_ms, 2);
    assert_eq!(config.playback.device.as_deref(), Some("Headphones"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let config = PlayerConfig::load_or_default(Some(&missing)).unwrap();
    assert_eq!(config, PlayerConfig::default());

    let config = PlayerConfig::load_or_default(None).unwrap();
    assert_eq!(config, PlayerConfig::default());
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[playback\nbuffer_duration_ms = 1");

    let err = PlayerConfig::load_or_default(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {:?}", err);
}

#[test]
#[serial]
fn test_cli_argument_beats_environment() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    let resolved = resolve_config_path(Some(&cli), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(cli));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_empty_environment_value_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    // Only the per-user file may be returned, and only if it exists
    if let Some(path) = resolved {
        assert!(path.exists());
        assert!(path.ends_with("pcmout/config.toml"));
    }

    env::remove_var(CONFIG_ENV_VAR);
}
