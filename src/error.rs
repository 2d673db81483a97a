//! Crate-wide error taxonomy.
//!
//! Every failure that crosses the bridge is reduced to a [`BridgeError`]
//! carrying a stable [`ErrorKind`]. Subsystem errors (`PatchError`,
//! `SafetyError`, ...) convert into it so a client always sees the same
//! shape regardless of which handler failed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;

/// Stable, serializable error kinds. Names never change between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bridge unreachable (no listener, refused handshake).
    ConnectionError,
    /// The connection dropped while the request was outstanding.
    ConnectionClosed,
    /// Main-thread call exceeded its deadline; the outcome is unknown.
    TimeoutError,
    /// Patch target not found or ambiguous.
    LocatorError,
    /// Patch precondition (surrounding context) failed.
    ContextMismatchError,
    NotFoundError,
    AlreadyExistsError,
    /// Unparseable input (diagnostics source, wire message, non-UTF-8 file).
    ParseError,
    InvalidParams,
    MethodNotFound,
    /// File changed between locator resolution and commit.
    ConcurrentModification,
    /// Path escapes the project root or targets a protected area.
    PathRejected,
    IoError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::ConnectionClosed => "ConnectionClosed",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::LocatorError => "LocatorError",
            ErrorKind::ContextMismatchError => "ContextMismatchError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::AlreadyExistsError => "AlreadyExistsError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::InvalidParams => "InvalidParams",
            ErrorKind::MethodNotFound => "MethodNotFound",
            ErrorKind::ConcurrentModification => "ConcurrentModification",
            ErrorKind::PathRejected => "PathRejected",
            ErrorKind::IoError => "IoError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by every bridge operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionError, message)
    }

    pub fn closed() -> Self {
        Self::new(
            ErrorKind::ConnectionClosed,
            "connection closed before a response arrived",
        )
    }

    /// Deadline exceeded. The operation may still complete later.
    pub fn timeout(method: &str, waited_ms: u128) -> Self {
        Self::new(
            ErrorKind::TimeoutError,
            format!("'{method}' did not complete within {waited_ms}ms; outcome unknown"),
        )
        .with_details(json!({ "method": method, "waitedMs": waited_ms, "outcome": "unknown" }))
    }

    pub fn not_found(path: &Path) -> Self {
        Self::new(
            ErrorKind::NotFoundError,
            format!("not found: {}", path.display()),
        )
        .with_details(json!({ "path": path.display().to_string() }))
    }

    pub fn already_exists(path: &Path) -> Self {
        Self::new(
            ErrorKind::AlreadyExistsError,
            format!("already exists: {}", path.display()),
        )
        .with_details(json!({ "path": path.display().to_string() }))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotFound,
            format!("unknown method '{method}'"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn io(path: &Path, source: &std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(path);
        }
        Self::new(
            ErrorKind::IoError,
            format!("I/O error on {}: {}", path.display(), source),
        )
    }

    /// True when the caller cannot know whether the operation took effect.
    pub fn is_ambiguous(&self) -> bool {
        self.kind == ErrorKind::TimeoutError
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::invalid_params(e.to_string())
    }
}
