//! RPC bridge between an automation client and the host application.
//!
//! ```text
//!  BridgeClient ──── newline-delimited JSON over TCP ────► BridgeServer
//!   (pending map,                                          │ reader thread per connection
//!    event bus)                                            ▼
//!                                                     WorkerPool ── worker-affine ──► handlers
//!                                                          │
//!                                                          └─ main-affine ─► MainLoop queue
//!                                                                            (pumped by the host)
//! ```
//!
//! Every method carries a static [`Affinity`]. Worker-affine methods run
//! on the pool immediately; main-affine methods mutate project state and
//! are marshaled onto the host's serial main loop, which makes them
//! mutually serialized without any other lock.
//! Queued main-affine calls never hold a pool thread, so a stalled host
//! cannot starve worker-affine calls.

pub mod catalog;
pub mod client;
pub mod dispatch;
pub mod events;
pub mod handlers;
pub mod main_loop;
pub mod protocol;
pub mod server;

pub use catalog::{Affinity, Method};
pub use client::BridgeClient;
pub use dispatch::Dispatcher;
pub use events::{EventBus, EventSink, Subscription};
pub use handlers::ProjectContext;
pub use main_loop::{run_blocking, run_deferred, Deadlines, MainLoop, MainLoopHandle, SerialExecutor};
pub use protocol::{Event, EventKind, Request, Response};
pub use server::{BridgeServer, ServerHandle};
