use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Code assigned when a source reports none.
pub const GENERIC_CODE: &str = "GENERIC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" | "note" | "log" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    /// 1-based
    pub line: usize,
    pub text: String,
}

/// A normalized compiler error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRecord {
    /// Path as reported, with `/` separators; empty when unknown
    pub file: String,
    /// 1-based, 0 when unknown
    pub line: usize,
    pub column: usize,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    /// Name of the source that produced it
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<ContextLine>>,
}

/// Identity used for deduplication across sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosticKey {
    pub file: String,
    pub line: usize,
    pub code: String,
    pub message: String,
}

impl DiagnosticRecord {
    pub fn new(
        file: impl Into<String>,
        line: usize,
        column: Option<usize>,
        code: Option<&str>,
        message: impl Into<String>,
        severity: Severity,
        source: &str,
    ) -> Self {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(GENERIC_CODE);
        Self {
            file: normalize_file(&file.into()),
            line,
            column: column.unwrap_or(0),
            code: code.to_string(),
            message: message.into().trim().to_string(),
            severity,
            source: source.to_string(),
            context: None,
        }
    }

    pub fn key(&self) -> DiagnosticKey {
        DiagnosticKey {
            file: self.file.clone(),
            line: self.line,
            code: self.code.clone(),
            message: self.message.clone(),
        }
    }

    /// Whether a file/line exists to enrich with context.
    pub fn has_location(&self) -> bool {
        !self.file.is_empty() && self.line > 0
    }
}

fn normalize_file(file: &str) -> String {
    let file = file.trim().replace('\\', "/");
    file.strip_prefix("./").map(str::to_string).unwrap_or(file)
}
