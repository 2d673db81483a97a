//! `hostbridge.toml` discovery and loading from disk.

use hostbridge::config::{discover, load_from_path, ConfigError, CONFIG_FILE_NAME};
use hostbridge::patch::ContextStrictness;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_project_file_is_discovered() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"
[bridge]
address = "127.0.0.1:9100"
protocol_requirement = "^1.2"

[refresh]
idle_timeout_ms = 750
compiled_extensions = ["cs", "asmdef"]

[diagnostics]
session_log = "Logs/Editor.log"

[patch]
context_strictness = "whitespace-insensitive"

[logging]
default = "info"

[logging.modules]
"hostbridge::bridge" = "debug"
"#,
    )
    .unwrap();

    let config = discover(None, dir.path()).unwrap();
    assert_eq!(config.bridge.address, "127.0.0.1:9100");
    assert_eq!(config.bridge.worker_threads, 4);
    assert_eq!(config.refresh.idle_timeout_ms, 750);
    assert_eq!(config.refresh.compiled_extensions, vec!["cs", "asmdef"]);
    assert_eq!(
        config.diagnostics.session_log,
        Some(PathBuf::from("Logs/Editor.log"))
    );
    assert_eq!(
        config.patch.context_strictness,
        ContextStrictness::WhitespaceInsensitive
    );
    assert_eq!(config.logging.modules["hostbridge::bridge"], "debug");
}

#[test]
fn test_explicit_path_wins_over_project_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE_NAME), "[bridge]\nworker_threads = 2\n").unwrap();
    let explicit = dir.path().join("ci.toml");
    fs::write(&explicit, "[bridge]\nworker_threads = 8\n").unwrap();

    let config = discover(Some(&explicit), dir.path()).unwrap();
    assert_eq!(config.bridge.worker_threads, 8);
}

#[test]
fn test_unknown_key_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[refresh]\nidle_timeout = 5\n").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
    assert!(err.to_string().contains(CONFIG_FILE_NAME));
}

#[test]
fn test_semantic_problems_are_all_listed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(
        &path,
        r#"
[bridge]
worker_threads = 0
protocol_requirement = "not a version"

[refresh]
working_dir = "/tmp/markers"
"#,
    )
    .unwrap();

    match load_from_path(&path).unwrap_err() {
        ConfigError::Validation { path: Some(p), source } => {
            assert_eq!(p, path);
            assert_eq!(source.issues.len(), 3);
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn test_missing_explicit_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = discover(Some(&missing), dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
