//! Refresh/Batch Coordinator.
//!
//! The host re-imports the project whenever its filesystem watcher sees a
//! change to a marker file. That import is expensive, so mutations made
//! inside a batch session are queued and flushed as a single signal, either
//! on an explicit `end_batch` or after the session has been idle for the
//! configured timeout.
//!
//! The coordinator never learns whether the host acted on a signal. Every
//! uncertain path signals anyway; duplicate signals are harmless.

pub mod coordinator;
pub mod markers;

pub use coordinator::{BatchSummary, Notified, RefreshCoordinator};
pub use markers::MarkerSink;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Created,
    Modified,
    Deleted,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Created => "created",
            MutationKind::Modified => "modified",
            MutationKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One project change, path relative to the project root with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub path: String,
}

impl Mutation {
    pub fn new(kind: MutationKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into().replace('\\', "/"),
        }
    }

    pub fn created(path: impl Into<String>) -> Self {
        Self::new(MutationKind::Created, path)
    }

    pub fn modified(path: impl Into<String>) -> Self {
        Self::new(MutationKind::Modified, path)
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self::new(MutationKind::Deleted, path)
    }

    /// Parent folder, or `None` for a path at the project root.
    pub fn folder(&self) -> Option<&str> {
        self.path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .filter(|parent| !parent.is_empty())
    }

    /// Lowercased extension of the final path component.
    pub fn extension(&self) -> Option<String> {
        let name = self.path.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Why a signal is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshOrigin {
    /// A single mutation while idle
    Mutation,
    /// A batch session flushed (explicitly or on idle timeout)
    Batch,
    /// An explicit refresh request
    Explicit,
}

/// Everything one signal tells the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub origin: RefreshOrigin,
    pub force_recompile: bool,
    pub recompile_scripts: bool,
    pub save_assets: bool,
    /// Deduplicated parent folders, in first-seen order
    pub folders: Vec<String>,
    pub mutations: Vec<Mutation>,
}

impl RefreshRequest {
    pub fn explicit(options: RefreshOptions) -> Self {
        Self {
            origin: RefreshOrigin::Explicit,
            force_recompile: options.force_recompile,
            recompile_scripts: options.force_recompile,
            save_assets: options.save_assets,
            folders: Vec::new(),
            mutations: Vec::new(),
        }
    }

    /// Build a request covering `mutations`.
    pub fn covering(
        origin: RefreshOrigin,
        mutations: Vec<Mutation>,
        compiled_extensions: &[String],
        save_assets: bool,
    ) -> Self {
        let compiled = mutations.iter().any(|m| {
            m.extension()
                .is_some_and(|ext| compiled_extensions.iter().any(|c| c.eq_ignore_ascii_case(&ext)))
        });

        let mut folders: Vec<String> = Vec::new();
        for folder in mutations.iter().filter_map(Mutation::folder) {
            if !folders.iter().any(|f| f == folder) {
                folders.push(folder.to_string());
            }
        }

        Self {
            origin,
            force_recompile: compiled,
            recompile_scripts: compiled,
            save_assets,
            folders,
            mutations,
        }
    }
}

/// Options for an explicit refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RefreshOptions {
    pub force_recompile: bool,
    pub save_assets: bool,
}

/// What a sink observed while signaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalReport {
    /// A previous signal's lock was still live
    pub already_pending: bool,
}

/// Notification channel into the host's reactive watcher.
pub trait RefreshSink: Send + Sync {
    fn signal(&self, request: &RefreshRequest) -> io::Result<SignalReport>;

    /// Whether a recent signal may still be in flight.
    fn pending(&self) -> bool {
        false
    }

    /// How long after a signal its pending marker should be cleared, if the
    /// sink leaves one behind.
    fn marker_lifetime(&self) -> Option<Duration> {
        None
    }

    /// Clear the pending marker if it has outlived [`marker_lifetime`].
    /// Returns whether anything was removed.
    ///
    /// [`marker_lifetime`]: RefreshSink::marker_lifetime
    fn expire(&self) -> io::Result<bool> {
        Ok(false)
    }
}

/// Result of one signal attempt, as reported to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub signaled: bool,
    pub already_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
