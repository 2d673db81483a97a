//! Hostbridge: automation bridge for single-threaded editor hosts
//!
//! An external client drives a running host application over a local
//! socket. The host's project state may only be touched from its main
//! loop, so every request is routed by the method's thread affinity.
//!
//! # Architecture
//!
//! - [`bridge`]: wire protocol, method catalog, host server, serial main
//!   loop, client with id correlation and a typed event stream.
//! - [`refresh`]: coalesces file mutations into refresh signals, either
//!   immediately or once per batch.
//! - [`patch`]: localized line-oriented edits with context validation,
//!   applied all-or-nothing.
//! - [`diagnostics`]: merges compiler output from several artifacts into
//!   one deduplicated, enriched list.
//!
//! # Safety
//!
//! - Client paths never escape the project root
//! - Patched files are re-verified before an atomic rename
//! - Errors are structured ([`BridgeError`]) on every failure path
//!
//! # Example
//!
//! ```no_run
//! use hostbridge::patch::{Patch, PatchEngine, PatchRequest};
//! use std::path::Path;
//!
//! let request = PatchRequest::new(
//!     "Assets/Player.cs",
//!     vec![Patch::search("speed = 5", "    float speed = 7;")],
//! );
//!
//! match PatchEngine::default().apply(Path::new("Assets/Player.cs"), &request) {
//!     Ok(outcome) => println!("{}", outcome.diff),
//!     Err(e) => eprintln!("patch failed: {e}"),
//! }
//! ```

pub mod bridge;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod edit;
pub mod error;
pub mod logging;
pub mod patch;
pub mod pool;
pub mod refresh;
pub mod safety;

// Re-exports
pub use bridge::{
    BridgeClient, BridgeServer, Dispatcher, Event, EventKind, MainLoop, ProjectContext,
    ServerHandle,
};
pub use config::{
    discover, load_from_path, load_from_str, BridgeConfig, ConfigError, PROTOCOL_VERSION,
};
pub use diagnostics::{DiagnosticRecord, DiagnosticsAggregator, DiagnosticsQuery, Severity};
pub use error::{BridgeError, ErrorKind};
pub use patch::{Patch, PatchEngine, PatchError, PatchOutcome, PatchRequest};
pub use refresh::{MarkerSink, Mutation, RefreshCoordinator};
pub use safety::{ProjectGuard, SafetyError};
