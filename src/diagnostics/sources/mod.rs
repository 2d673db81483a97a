//! Pluggable diagnostics sources.
//!
//! Each source reads one artifact the host or its toolchain leaves behind.
//! None of them is authoritative. A missing artifact yields no records; an
//! unreadable or malformed one is a [`SourceError`] that the aggregator logs
//! and drops.

mod build_trace;
mod raw_log;
mod session_log;
mod structured;

pub use build_trace::BuildTraceSource;
pub use raw_log::RawLogSource;
pub use session_log::{default_session_log, SessionLogSource};
pub use structured::StructuredArtifactSource;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::DiagnosticsSettings;
use crate::diagnostics::record::DiagnosticRecord;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl SourceError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub trait DiagnosticSource: Send + Sync {
    /// Stable name recorded on every record this source produces.
    fn name(&self) -> &'static str;

    fn collect(&self) -> Result<Vec<DiagnosticRecord>, SourceError>;
}

/// The four standard sources, configured for `project_root`.
pub fn from_settings(
    project_root: &Path,
    settings: &DiagnosticsSettings,
) -> Vec<Box<dyn DiagnosticSource>> {
    let session_log = settings
        .session_log
        .as_ref()
        .map(|p| project_root.join(p))
        .or_else(default_session_log);

    let mut sources: Vec<Box<dyn DiagnosticSource>> = vec![
        Box::new(StructuredArtifactSource::new(
            project_root.join(&settings.structured_artifact),
        )),
        Box::new(RawLogSource::new(
            project_root.join(&settings.raw_log_dir),
            settings.raw_log_extensions.clone(),
        )),
    ];
    if let Some(path) = session_log {
        sources.push(Box::new(SessionLogSource::new(
            path,
            settings.tail_lines,
            settings.begin_marker.clone(),
            settings.end_marker.clone(),
        )));
    }
    sources.push(Box::new(BuildTraceSource::new(
        project_root.join(&settings.build_trace),
    )));
    sources
}
