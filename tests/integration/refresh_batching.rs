//! Batch coalescing against the file-backed marker sink.

use hostbridge::config::RefreshSettings;
use hostbridge::refresh::{MarkerSink, Mutation, Notified, RefreshCoordinator, RefreshOptions};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn coordinator(dir: &Path, idle_timeout_ms: u64) -> (RefreshCoordinator, PathBuf) {
    let working = dir.join("Temp/HostBridge");
    let sink = MarkerSink::new(&working, Duration::from_millis(1_500));
    let settings = RefreshSettings {
        idle_timeout_ms,
        ..RefreshSettings::default()
    };
    (
        RefreshCoordinator::new(Arc::new(sink), &settings).unwrap(),
        working,
    )
}

fn wait_for(path: &Path, limit: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if path.exists() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    path.exists()
}

#[test]
fn test_idle_timeout_flushes_one_covering_refresh() {
    let dir = TempDir::new().unwrap();
    let (coordinator, working) = coordinator(dir.path(), 150);
    let trigger = working.join("refresh_trigger.txt");

    assert!(!coordinator.start_batch());
    assert_eq!(
        coordinator.notify(Mutation::created("Assets/X.cs")),
        Notified::Queued { pending: 1 }
    );
    assert_eq!(
        coordinator.notify(Mutation::modified("Assets/Sub/Y.cs")),
        Notified::Queued { pending: 2 }
    );
    assert!(!trigger.exists());

    // No end_batch: the idle timer has to flush
    assert!(wait_for(&trigger, Duration::from_secs(3)));
    thread::sleep(Duration::from_millis(50));
    assert!(!coordinator.is_batching());
    assert_eq!(coordinator.queued(), 0);

    let text = fs::read_to_string(&trigger).unwrap();
    let mut lines = text.lines();
    let stamp = lines.next().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    let rest: Vec<&str> = lines.collect();
    assert!(rest.contains(&"forceRecompile"));
    assert!(rest.contains(&"folder: Assets"));
    assert!(rest.contains(&"folder: Assets/Sub"));

    let listing = fs::read_to_string(working.join("batch_operations.txt")).unwrap();
    assert_eq!(listing, "created: Assets/X.cs\nmodified: Assets/Sub/Y.cs\n");

    // Exactly one signal: the trigger is not rewritten later
    let first = fs::read_to_string(&trigger).unwrap();
    thread::sleep(Duration::from_millis(400));
    assert_eq!(fs::read_to_string(&trigger).unwrap(), first);
}

#[test]
fn test_idle_mutation_signals_immediately() {
    let dir = TempDir::new().unwrap();
    let (coordinator, working) = coordinator(dir.path(), 5_000);

    match coordinator.notify(Mutation::created("Assets/Textures/grass.png")) {
        Notified::Signaled(outcome) => assert!(outcome.signaled),
        other => panic!("expected a signal, got {other:?}"),
    }
    let text = fs::read_to_string(working.join("refresh_trigger.txt")).unwrap();
    assert!(!text.contains("forceRecompile"));
    assert!(text.contains("folder: Assets/Textures"));
    assert!(working.join("refresh.lock").exists());
    assert!(!working.join("batch_operations.txt").exists());
}

#[test]
fn test_explicit_refresh_reports_live_lock() {
    let dir = TempDir::new().unwrap();
    let (coordinator, working) = coordinator(dir.path(), 5_000);

    let first = coordinator.request_refresh(RefreshOptions {
        force_recompile: true,
        save_assets: true,
    });
    assert!(first.signaled);
    assert!(!first.already_pending);

    let second = coordinator.request_refresh(RefreshOptions::default());
    assert!(second.signaled);
    assert!(second.already_pending);

    let text = fs::read_to_string(working.join("refresh_trigger.txt")).unwrap();
    assert!(!text.contains("forceRecompile"));
}

#[test]
fn test_stale_lock_is_cleared() {
    let dir = TempDir::new().unwrap();
    let (coordinator, working) = coordinator(dir.path(), 5_000);
    fs::create_dir_all(&working).unwrap();
    let lock = working.join("refresh.lock");
    fs::write(&lock, "old\n").unwrap();
    let past = filetime::FileTime::from_unix_time(1_000_000, 0);
    filetime::set_file_mtime(&lock, past).unwrap();

    let outcome = coordinator.request_refresh(RefreshOptions::default());
    assert!(outcome.signaled);
    assert!(!outcome.already_pending);
    assert_ne!(fs::read_to_string(&lock).unwrap(), "old\n");
}
