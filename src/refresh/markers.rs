use chrono::{SecondsFormat, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::edit;
use crate::refresh::{RefreshOrigin, RefreshRequest, RefreshSink, SignalReport};

pub const TRIGGER_FILE: &str = "refresh_trigger.txt";
pub const LOCK_FILE: &str = "refresh.lock";
pub const BATCH_FILE: &str = "batch_operations.txt";

/// File-backed [`RefreshSink`]: writes marker files the host's watcher reacts to.
///
/// The trigger always carries a fresh timestamp so content-based change
/// detection never treats two signals as the same file.
#[derive(Debug, Clone)]
pub struct MarkerSink {
    working_dir: PathBuf,
    lock_expiry: Duration,
}

impl MarkerSink {
    /// `working_dir` must be absolute (already joined onto the project root).
    pub fn new(working_dir: impl Into<PathBuf>, lock_expiry: Duration) -> Self {
        Self {
            working_dir: working_dir.into(),
            lock_expiry,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn trigger_path(&self) -> PathBuf {
        self.working_dir.join(TRIGGER_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.working_dir.join(LOCK_FILE)
    }

    pub fn batch_path(&self) -> PathBuf {
        self.working_dir.join(BATCH_FILE)
    }

    fn lock_is_live(&self) -> bool {
        let modified = match fs::metadata(self.lock_path()).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < self.lock_expiry,
            // mtime in the future: treat as just written
            Err(_) => true,
        }
    }
}

impl RefreshSink for MarkerSink {
    fn signal(&self, request: &RefreshRequest) -> io::Result<SignalReport> {
        fs::create_dir_all(&self.working_dir)?;

        let already_pending = self.lock_is_live();
        if !already_pending {
            match fs::remove_file(self.lock_path()) {
                Ok(()) => tracing::debug!(target: "refresh", "removed stale refresh lock"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        let stamp = timestamp();
        fs::write(self.lock_path(), format!("{stamp}\n"))?;

        if request.origin == RefreshOrigin::Batch && !request.mutations.is_empty() {
            write_marker(&self.batch_path(), &render_batch(request))?;
        }

        write_marker(&self.trigger_path(), &render_trigger(&stamp, request))?;

        tracing::debug!(
            target: "refresh",
            "wrote refresh trigger ({:?}, {} folder(s), pending={already_pending})",
            request.origin,
            request.folders.len()
        );

        Ok(SignalReport { already_pending })
    }

    fn pending(&self) -> bool {
        self.lock_is_live()
    }

    fn marker_lifetime(&self) -> Option<Duration> {
        Some(self.lock_expiry)
    }

    fn expire(&self) -> io::Result<bool> {
        if self.lock_is_live() {
            return Ok(false);
        }
        match fs::remove_file(self.lock_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn write_marker(path: &Path, content: &str) -> io::Result<()> {
    edit::atomic_write(path, content.as_bytes()).map_err(|e| match e {
        edit::EditError::Io(source) => source,
        other => io::Error::other(other.to_string()),
    })
}

pub fn render_trigger(stamp: &str, request: &RefreshRequest) -> String {
    let mut out = format!("{stamp}\n");
    if request.force_recompile {
        out.push_str("forceRecompile\n");
    }
    if request.recompile_scripts {
        out.push_str("recompileScripts\n");
    }
    if request.save_assets {
        out.push_str("saveAssets\n");
    }
    for folder in &request.folders {
        out.push_str("folder: ");
        out.push_str(folder);
        out.push('\n');
    }
    out
}

pub fn render_batch(request: &RefreshRequest) -> String {
    request
        .mutations
        .iter()
        .map(|m| format!("{}: {}\n", m.kind, m.path))
        .collect()
}
