//! Client and server over a real socket, with the test thread standing in
//! for the host's main loop.

use hostbridge::bridge::{
    BridgeClient, BridgeServer, Dispatcher, Event, EventKind, MainLoop, ProjectContext,
    ServerHandle,
};
use hostbridge::config::{BridgeConfig, BridgeSettings};
use hostbridge::ErrorKind;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Fields drop in order: server first, temp dir last.
struct Host {
    server: ServerHandle,
    main_loop: MainLoop,
    root: std::path::PathBuf,
    _dir: TempDir,
}

fn start_host(main_thread_timeout_ms: u64) -> Host {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("Assets/Scripts")).unwrap();
    fs::write(dir.path().join("Assets/Scripts/Player.cs"), "class Player {}\n").unwrap();
    fs::write(dir.path().join("Assets/Scripts/Player.cs.meta"), "guid: 1\n").unwrap();
    fs::write(dir.path().join("Assets/Scripts.meta"), "guid: 2\n").unwrap();

    let mut config = BridgeConfig::default();
    config.bridge.main_thread_timeout_ms = main_thread_timeout_ms;
    config.refresh.idle_timeout_ms = 1_000;

    let ctx = ProjectContext::open(dir.path(), &config).unwrap();
    let root = ctx.project_root().to_path_buf();
    let main_loop = MainLoop::new();
    let dispatcher = Dispatcher::new(
        Arc::new(ctx),
        Arc::new(main_loop.handle()),
        config.bridge.main_thread_timeout(),
    );
    let server = BridgeServer::bind("127.0.0.1:0", dispatcher, 2)
        .unwrap()
        .start()
        .unwrap();

    Host {
        server,
        main_loop,
        root,
        _dir: dir,
    }
}

fn client_for(host: &Host, main_thread_timeout_ms: u64) -> BridgeClient {
    let settings = BridgeSettings {
        address: host.server.local_addr().to_string(),
        main_thread_timeout_ms,
        worker_timeout_ms: 2_000,
        connect_retries: 3,
        connect_backoff_ms: 20,
        protocol_requirement: Some("^1.0".to_string()),
        ..BridgeSettings::default()
    };
    BridgeClient::connect_with_retry(&settings).unwrap()
}

/// Call from a helper thread while the test thread pumps the main loop.
fn call_pumped(host: &Host, client: &Arc<BridgeClient>, method: &str, params: Value) -> Value {
    let caller = {
        let client = Arc::clone(client);
        let method = method.to_string();
        thread::spawn(move || client.call(&method, params))
    };
    while !caller.is_finished() {
        host.main_loop.pump_for(Duration::from_millis(20));
    }
    caller.join().unwrap().unwrap()
}

#[test]
fn test_worker_methods_answer_without_main_loop() {
    let host = start_host(5_000);
    let client = client_for(&host, 5_000);

    let pong = client.call("ping", Value::Null).unwrap();
    assert_eq!(pong["pong"], true);

    let read = client
        .call("script/read", json!({"path": "Assets/Scripts/Player.cs"}))
        .unwrap();
    assert_eq!(read["content"], "class Player {}\n");
    assert_eq!(read["lineCount"], 1);

    let listing = client
        .call("folder/list", json!({"path": "Assets", "recursive": true}))
        .unwrap();
    let paths: Vec<&str> = listing["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert!(paths.iter().any(|p| p.ends_with("Player.cs")));
    assert!(!paths.iter().any(|p| p.ends_with(".meta")));
    assert_eq!(host.main_loop.queued(), 0);
}

#[test]
fn test_main_thread_call_times_out_then_host_recovers() {
    let host = start_host(150);
    let client = client_for(&host, 1_000);

    // Nobody pumps the main loop: the host is unresponsive
    let err = client
        .call("script/create", json!({"path": "Assets/Late.cs", "content": "late"}))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TimeoutError);
    assert_eq!(err.details["outcome"], "unknown");
    assert_eq!(client.pending_count(), 0);

    // The host catches up and runs the queued job
    assert_eq!(host.main_loop.pump(), 1);
    let read = client
        .call("script/read", json!({"path": "Assets/Late.cs"}))
        .unwrap();
    assert_eq!(read["content"], "late");
}

#[test]
fn test_worker_calls_answer_while_main_calls_fill_the_pool() {
    let host = start_host(3_000);
    let client = Arc::new(client_for(&host, 5_000));

    // More stalled main-thread calls than the server has pool threads
    let callers: Vec<_> = (0..4)
        .map(|i| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                client.call("folder/create", json!({ "path": format!("Assets/Stalled{i}") }))
            })
        })
        .collect();
    let waiting = Instant::now();
    while host.main_loop.queued() < 4 {
        assert!(waiting.elapsed() < Duration::from_secs(2), "calls never queued");
        thread::sleep(Duration::from_millis(5));
    }

    let started = Instant::now();
    let pong = client.call("ping", Value::Null).unwrap();
    assert_eq!(pong["pong"], true);
    assert!(started.elapsed() < Duration::from_secs(1));
    let read = client
        .call("script/read", json!({"path": "Assets/Scripts/Player.cs"}))
        .unwrap();
    assert_eq!(read["lineCount"], 1);

    assert_eq!(host.main_loop.pump(), 4);
    for caller in callers {
        caller.join().unwrap().unwrap();
    }
    assert!(host.root.join("Assets/Stalled3").is_dir());
}

#[test]
fn test_main_thread_mutations_and_structured_errors() {
    let host = start_host(5_000);
    let client = Arc::new(client_for(&host, 5_000));

    call_pumped(&host, &client, "folder/create", json!({"path": "Assets/Archive"}));
    call_pumped(
        &host,
        &client,
        "folder/move",
        json!({"path": "Assets/Scripts", "destination": "Assets/Archive"}),
    );
    assert!(host.root.join("Assets/Archive/Scripts/Player.cs").is_file());
    assert!(host.root.join("Assets/Archive/Scripts.meta").is_file());
    assert!(!host.root.join("Assets/Scripts.meta").exists());

    let outcome = call_pumped(
        &host,
        &client,
        "script/applyDiff",
        json!({
            "path": "Assets/Archive/Scripts/Player.cs",
            "patches": [{"searchPattern": "class Player", "newContent": "class Hero {}"}]
        }),
    );
    assert_eq!(outcome["applied"], 1);
    assert_eq!(
        fs::read_to_string(host.root.join("Assets/Archive/Scripts/Player.cs")).unwrap(),
        "class Hero {}\n"
    );

    let err = client
        .call("script/read", json!({"path": "Assets/Missing.cs"}))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFoundError);

    let err = client
        .call("script/read", json!({"path": "../outside.cs"}))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PathRejected);

    let err = client.call("script/read", json!({"file": "x"})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParams);

    let err = client.call("project/explode", Value::Null).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MethodNotFound);
}

#[test]
fn test_batch_over_the_wire_signals_once() {
    let host = start_host(5_000);
    let client = Arc::new(client_for(&host, 5_000));

    let started = client.call("batch/start", Value::Null).unwrap();
    assert_eq!(started["joined"], false);

    call_pumped(&host, &client, "script/create", json!({"path": "Assets/A.cs"}));
    call_pumped(&host, &client, "script/create", json!({"path": "Assets/B.cs"}));
    let trigger = host.root.join("Temp/HostBridge/refresh_trigger.txt");
    assert!(!trigger.exists());

    let summary = client.call("batch/end", Value::Null).unwrap();
    assert_eq!(summary["mutations"], 2);
    assert_eq!(summary["signaled"], true);

    let text = fs::read_to_string(trigger).unwrap();
    assert!(text.contains("forceRecompile"));
    assert!(text.contains("folder: Assets"));
    let listing = fs::read_to_string(host.root.join("Temp/HostBridge/batch_operations.txt")).unwrap();
    assert_eq!(listing, "created: Assets/A.cs\ncreated: Assets/B.cs\n");
}

#[test]
fn test_events_reach_subscribers() {
    let host = start_host(5_000);
    let client = Arc::new(client_for(&host, 5_000));
    let subscription = client.subscribe();

    host.server
        .emit(Event::new(EventKind::CompileStarted, json!({"reason": "refresh"})));
    let event = subscription.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.event, EventKind::CompileStarted);
    assert_eq!(event.data["reason"], "refresh");

    // Mutations announce themselves
    call_pumped(&host, &client, "folder/create", json!({"path": "Assets/New"}));
    let changed = subscription.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(changed.event, EventKind::ProjectChanged);

    assert!(client.unsubscribe(subscription.id));
}

#[test]
fn test_server_shutdown_fails_pending_calls() {
    let host = start_host(500);
    let client = Arc::new(client_for(&host, 5_000));

    let caller = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.call("folder/create", json!({"path": "Assets/Never"})))
    };
    thread::sleep(Duration::from_millis(100));
    host.server.shutdown();

    let err = caller.join().unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionClosed);
    assert!(client.is_closed());
}
