use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::edit::EditError;
use crate::error::{BridgeError, ErrorKind};

/// Closest line to a failed search, offered as a hint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearMatch {
    /// 1-based
    pub line: usize,
    pub text: String,
    pub similarity: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    #[error("patch has no locator (startLine, searchPattern or originalContent)")]
    MissingLocator,

    #[error("line range {start}-{end} is outside file of {line_count} lines")]
    OutOfRange {
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("pattern '{pattern}' occurrence {occurrence} not found ({found} match(es))")]
    PatternNotFound {
        pattern: String,
        occurrence: usize,
        found: usize,
        near: Option<NearMatch>,
    },

    #[error("content block occurrence {occurrence} not found ({found} match(es))")]
    ContentNotFound {
        occurrence: usize,
        found: usize,
        near: Option<NearMatch>,
    },

    #[error("{what} matched {count} locations, expected exactly 1")]
    Ambiguous { what: String, count: usize },

    #[error("invalid regex '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("content block is empty")]
    EmptyContent,

    #[error("occurrence is 1-based; 0 is not a valid ordinal")]
    InvalidOccurrence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSide {
    Before,
    After,
}

impl fmt::Display for ContextSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextSide::Before => f.write_str("before"),
            ContextSide::After => f.write_str("after"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("patch {index}: {source}")]
    Locator {
        index: usize,
        #[source]
        source: LocatorError,
    },

    #[error("patch {index}: context {side} mismatch at line {line}: expected {expected:?}, found {actual:?}")]
    ContextMismatch {
        index: usize,
        side: ContextSide,
        /// 1-based line of the first compared context line
        line: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("patches {first} and {second} overlap (lines {first_start}-{first_end} and {second_start}-{second_end})")]
    Overlap {
        first: usize,
        second: usize,
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("no patches supplied")]
    Empty,

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("file is not valid UTF-8: {0}")]
    Encoding(PathBuf),

    #[error("{0} changed on disk while patching; nothing was written")]
    ConcurrentModification(PathBuf),

    #[error("edit error: {0}")]
    Edit(#[from] EditError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::Locator { .. } | PatchError::Overlap { .. } => ErrorKind::LocatorError,
            PatchError::ContextMismatch { .. } => ErrorKind::ContextMismatchError,
            PatchError::Empty => ErrorKind::InvalidParams,
            PatchError::NotFound(_) => ErrorKind::NotFoundError,
            PatchError::Encoding(_) => ErrorKind::ParseError,
            PatchError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            PatchError::Edit(_) => ErrorKind::InternalError,
            PatchError::Io { .. } => ErrorKind::IoError,
        }
    }
}

impl From<PatchError> for BridgeError {
    fn from(e: PatchError) -> Self {
        let details = match &e {
            PatchError::Locator { index, source } => {
                let near = match source {
                    LocatorError::PatternNotFound { near, .. }
                    | LocatorError::ContentNotFound { near, .. } => near.clone(),
                    _ => None,
                };
                json!({ "patchIndex": index, "near": near })
            }
            PatchError::ContextMismatch {
                index,
                side,
                line,
                expected,
                actual,
            } => json!({
                "patchIndex": index,
                "side": side,
                "line": line,
                "expected": expected,
                "actual": actual,
            }),
            PatchError::Overlap { first, second, .. } => {
                json!({ "patchIndices": [first, second] })
            }
            _ => serde_json::Value::Null,
        };
        BridgeError::new(e.kind(), e.to_string()).with_details(details)
    }
}
