use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;

use super::{DiagnosticSource, SourceError};
use crate::diagnostics::patterns;
use crate::diagnostics::record::DiagnosticRecord;

/// The build pipeline's newline-delimited JSON trace.
///
/// Each object may carry a `stdout` string holding the compiler's raw
/// output for one node; those lines go through the shared pattern family.
pub struct BuildTraceSource {
    path: PathBuf,
}

impl BuildTraceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DiagnosticSource for BuildTraceSource {
    fn name(&self) -> &'static str {
        "build-trace"
    }

    fn collect(&self) -> Result<Vec<DiagnosticRecord>, SourceError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SourceError::io(&self.path, e)),
        };
        let text = String::from_utf8_lossy(&raw);

        let mut records = Vec::new();
        let mut objects = 0usize;
        let mut malformed = 0usize;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let value: Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(_) => {
                    malformed += 1;
                    continue;
                }
            };
            objects += 1;
            if let Some(stdout) = value.get("stdout").and_then(Value::as_str) {
                records.extend(patterns::parse_text(stdout, self.name()));
            }
        }

        if objects == 0 && malformed > 0 {
            return Err(SourceError::Parse {
                path: self.path.clone(),
                message: format!("no JSON objects in {malformed} line(s)"),
            });
        }
        if malformed > 0 {
            tracing::debug!(target: "diagnostics", "build trace: skipped {malformed} malformed line(s)");
        }
        Ok(records)
    }
}
