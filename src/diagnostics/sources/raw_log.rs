use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

use super::{DiagnosticSource, SourceError};
use crate::diagnostics::patterns;
use crate::diagnostics::record::DiagnosticRecord;

/// Files larger than this are not scanned.
const MAX_FILE_SIZE: u64 = 8 * 1024 * 1024;
const MAX_DEPTH: usize = 2;

/// Scrapes compiler text out of the host's transient working files.
pub struct RawLogSource {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl RawLogSource {
    pub fn new(dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            extensions,
        }
    }

    fn wanted(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|w| w.eq_ignore_ascii_case(ext)))
    }
}

impl DiagnosticSource for RawLogSource {
    fn name(&self) -> &'static str {
        "raw-log"
    }

    fn collect(&self) -> Result<Vec<DiagnosticRecord>, SourceError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(MAX_DEPTH)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.wanted(entry.path()))
            .filter(|entry| {
                entry
                    .metadata()
                    .map(|m| m.len() <= MAX_FILE_SIZE)
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        let mut records = Vec::new();
        for path in files {
            match fs::read(&path) {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    records.extend(patterns::parse_text(&text, self.name()));
                }
                Err(e) => {
                    tracing::debug!(target: "diagnostics", "skipping {}: {e}", path.display());
                }
            }
        }
        Ok(records)
    }
}
