//! The standard sources merged over one project directory.

use hostbridge::config::DiagnosticsSettings;
use hostbridge::diagnostics::{
    DiagnosticsAggregator, DiagnosticsQuery, RecompileTrigger, Severity, GENERIC_CODE,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn settings() -> DiagnosticsSettings {
    DiagnosticsSettings {
        session_log: Some(PathBuf::from("Logs/Editor.log")),
        cache_window_ms: 60_000,
        fresh_poll_delay_ms: 10,
        fresh_poll_attempts: 2,
        ..DiagnosticsSettings::default()
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_same_diagnostic_from_two_sources_is_reported_once() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "Temp/HostBridge/compile_results.json",
        r#"{"messages":[{"file":"A","line":10,"column":3,"code":"E1002","message":"expected ;","type":"error"}],
            "errorCount":1,"warningCount":0,"timestamp":"2024-05-01T10:00:00Z"}"#,
    );
    write(dir.path(), "Temp/build.log", "A(10,3): error E1002: expected ;\n");

    let aggregator = DiagnosticsAggregator::new(dir.path(), &settings());
    let report = aggregator.query(&DiagnosticsQuery::default());

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].source, "structured");
    assert_eq!(report.error_count, 1);
    let counts: Vec<(String, usize)> = report
        .sources
        .iter()
        .map(|s| (s.name.clone(), s.count))
        .collect();
    assert!(counts.contains(&("structured".to_string(), 1)));
    assert!(counts.contains(&("raw-log".to_string(), 1)));
}

#[test]
fn test_every_source_contributes_and_context_is_attached() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "Assets/Player.cs",
        "using UnityEngine;\n\npublic class Player {\n    int speed = 5\n}\n",
    );
    write(
        dir.path(),
        "Temp/HostBridge/compile_results.json",
        r#"{"messages":[{"file":"Assets/Player.cs","line":4,"column":18,"code":"CS1002","message":"; expected","type":"error"}]}"#,
    );
    write(
        dir.path(),
        "Logs/Editor.log",
        "-----CompilerOutput\nAssets/Enemy.cs(7,1): warning CS0168: unused variable\n-----EndCompilerOutput\n",
    );
    write(
        dir.path(),
        "Library/Bee/tundra.log.json",
        "{\"msg\":\"noop\"}\n{\"stdout\":\"Assets/Boss.cs:3:9: error CS0103: name 'hp' does not exist\\n\"}\n",
    );

    let aggregator = DiagnosticsAggregator::new(dir.path(), &settings());
    let report = aggregator.query(&DiagnosticsQuery::default());

    let by_source: Vec<(&str, &str)> = report
        .records
        .iter()
        .map(|r| (r.source.as_str(), r.file.as_str()))
        .collect();
    assert!(by_source.contains(&("structured", "Assets/Player.cs")));
    assert!(by_source.contains(&("session-log", "Assets/Enemy.cs")));
    assert!(by_source.contains(&("build-trace", "Assets/Boss.cs")));
    assert_eq!(report.error_count, 2);
    assert_eq!(report.warning_count, 1);

    let player = report
        .records
        .iter()
        .find(|r| r.file == "Assets/Player.cs")
        .unwrap();
    let context = player.context.as_ref().unwrap();
    let numbers: Vec<usize> = context.iter().map(|c| c.line).collect();
    assert_eq!(numbers, vec![2, 3, 4, 5]);
    assert_eq!(context[2].text, "    int speed = 5");

    // Files that do not exist locally get no context
    let enemy = report
        .records
        .iter()
        .find(|r| r.file == "Assets/Enemy.cs")
        .unwrap();
    assert!(enemy.context.is_none());
}

#[test]
fn test_malformed_source_is_swallowed() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Temp/HostBridge/compile_results.json", "{ not json");
    write(dir.path(), "Temp/editor.txt", "error CS0001: compiler crashed\n");

    let aggregator = DiagnosticsAggregator::new(dir.path(), &settings());
    let report = aggregator.query(&DiagnosticsQuery::default());

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].file, "");
    assert_eq!(report.records[0].line, 0);
    let structured = report.sources.iter().find(|s| s.name == "structured").unwrap();
    assert!(structured.error.is_some());
}

#[test]
fn test_cache_then_fresh_and_filters() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "Temp/build.log",
        "Assets/A.cs(1,1): warning CS0414: never used\nAssets/B.cs(2,1): error: broken\n",
    );

    let aggregator = DiagnosticsAggregator::new(dir.path(), &settings());
    let first = aggregator.query(&DiagnosticsQuery::default());
    assert!(!first.from_cache);
    assert_eq!(first.records.len(), 2);

    write(dir.path(), "Temp/build.log", "");
    let cached = aggregator.query(&DiagnosticsQuery::default());
    assert!(cached.from_cache);
    assert_eq!(cached.records.len(), 2);

    let errors_only = aggregator.query(&DiagnosticsQuery {
        min_severity: Some(Severity::Error),
        ..DiagnosticsQuery::default()
    });
    assert_eq!(errors_only.records.len(), 1);
    assert_eq!(errors_only.records[0].code, GENERIC_CODE);

    let one_file = aggregator.query(&DiagnosticsQuery {
        file: Some("A.cs".to_string()),
        ..DiagnosticsQuery::default()
    });
    assert_eq!(one_file.records.len(), 1);
    assert_eq!(one_file.records[0].file, "Assets/A.cs");

    let fresh = aggregator.query(&DiagnosticsQuery {
        fresh: true,
        ..DiagnosticsQuery::default()
    });
    assert!(!fresh.from_cache);
    assert!(fresh.records.is_empty());
}

#[derive(Default)]
struct CountingTrigger {
    calls: AtomicUsize,
}

impl RecompileTrigger for CountingTrigger {
    fn trigger_recompile(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_fresh_query_on_clean_project_nudges_one_recompile() {
    let dir = TempDir::new().unwrap();
    let trigger = Arc::new(CountingTrigger::default());
    let aggregator = DiagnosticsAggregator::new(dir.path(), &settings())
        .with_trigger(trigger.clone());

    let report = aggregator.query(&DiagnosticsQuery {
        fresh: true,
        ..DiagnosticsQuery::default()
    });
    assert!(report.records.is_empty());
    assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
}
