use serde::Deserialize;
use std::fs;
use std::io;
use std::path::PathBuf;

use super::{DiagnosticSource, SourceError};
use crate::diagnostics::record::{DiagnosticRecord, Severity};

/// Result file written by the host's own post-compile instrumentation.
///
/// ```json
/// { "messages": [{ "file": "Assets/A.cs", "line": 10, "column": 5,
///                  "code": "CS1002", "message": "; expected", "type": "error" }],
///   "errorCount": 1, "warningCount": 0, "timestamp": "..." }
/// ```
pub struct StructuredArtifactSource {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    #[serde(default)]
    messages: Vec<ArtifactMessage>,
}

#[derive(Debug, Deserialize)]
struct ArtifactMessage {
    #[serde(default)]
    file: String,
    #[serde(default)]
    line: usize,
    column: Option<usize>,
    code: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl StructuredArtifactSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DiagnosticSource for StructuredArtifactSource {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn collect(&self) -> Result<Vec<DiagnosticRecord>, SourceError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SourceError::io(&self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let artifact: Artifact =
            serde_json::from_str(raw.trim_start_matches('\u{feff}')).map_err(|e| {
                SourceError::Parse {
                    path: self.path.clone(),
                    message: e.to_string(),
                }
            })?;

        Ok(artifact
            .messages
            .into_iter()
            .filter(|m| !m.message.trim().is_empty())
            .map(|m| {
                let severity = m
                    .kind
                    .as_deref()
                    .and_then(|k| k.parse().ok())
                    .unwrap_or(Severity::Error);
                DiagnosticRecord::new(
                    m.file,
                    m.line,
                    m.column,
                    m.code.as_deref(),
                    m.message,
                    severity,
                    self.name(),
                )
            })
            .collect())
    }
}
