//! Integration tests for configuration resolution
//!
//! Uses serial_test to prevent races on the SLOWVERB_CONFIG environment variable.
//! Tests that touch it are marked with #[serial].

use serial_test::serial;
use slowverb_common::config::{resolve_config_path, SlowverbConfig, CONFIG_ENV_VAR};
use slowverb_common::{Error, QualityTier, TransportMode};
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    let cli = write_config("[engine]\nforce_tier = \"high\"\n");
    let env_file = write_config("[engine]\nforce_tier = \"basic\"\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let config = SlowverbConfig::load(Some(cli.path())).unwrap();
    assert_eq!(config.engine.force_tier, Some(QualityTier::High));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    let env_file = write_config(
        "[engine]\nforce_transport = \"mediaElement\"\noutput_buffer_frames = 512\n",
    );
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let (path, explicit) = resolve_config_path(None, CONFIG_ENV_VAR).unwrap();
    assert_eq!(path, env_file.path());
    assert!(explicit);

    let config = SlowverbConfig::load(None).unwrap();
    assert_eq!(config.engine.force_transport, Some(TransportMode::MediaElement));
    assert_eq!(config.engine.output_buffer_frames, Some(512));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = SlowverbConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
#[serial]
fn test_malformed_file_reports_path() {
    env::remove_var(CONFIG_ENV_VAR);
    let file = write_config("[limits.max_file_size_mb]\nbasic = \"lots\"\n");

    match SlowverbConfig::load(Some(file.path())) {
        Err(Error::Config(msg)) => {
            assert!(msg.contains(&file.path().display().to_string()));
        }
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_full_document_round_trip() {
    let file = write_config(
        r#"
[engine]
force_tier = "medium"

[limits.max_file_size_mb]
basic = 40
medium = 100
high = 300

[reverb]
max_seconds_high = 3.5
max_seconds_medium = 1.5

[visualizer]
bar_count = 24

[logging]
level = "debug"
"#,
    );

    let config = SlowverbConfig::from_file(file.path()).unwrap();
    assert_eq!(config.max_file_size_bytes(QualityTier::Medium), 100 * 1024 * 1024);
    assert_eq!(config.reverb_max_seconds(QualityTier::High), Some(3.5));
    assert_eq!(config.reverb_max_seconds(QualityTier::Medium), Some(1.5));
    assert_eq!(config.bar_count(QualityTier::Basic), 24);
    assert_eq!(config.logging.level, "debug");
}
