use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::version::parse_requirement;
use crate::patch::ContextStrictness;

/// Top-level `hostbridge.toml`.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub refresh: RefreshSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
    #[serde(default)]
    pub patch: PatchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct BridgeSettings {
    pub address: String,
    pub worker_threads: usize,
    pub main_thread_timeout_ms: u64,
    pub worker_timeout_ms: u64,
    pub connect_retries: u32,
    pub connect_backoff_ms: u64,
    /// Semver requirement the server's protocol version must satisfy.
    pub protocol_requirement: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7777".to_string(),
            worker_threads: 4,
            main_thread_timeout_ms: 30_000,
            worker_timeout_ms: 10_000,
            connect_retries: 5,
            connect_backoff_ms: 250,
            protocol_requirement: None,
        }
    }
}

impl BridgeSettings {
    pub fn main_thread_timeout(&self) -> Duration {
        Duration::from_millis(self.main_thread_timeout_ms)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RefreshSettings {
    /// Marker directory, relative to the project root.
    pub working_dir: PathBuf,
    pub idle_timeout_ms: u64,
    pub lock_expiry_ms: u64,
    /// Extensions whose mutation forces a recompile.
    pub compiled_extensions: Vec<String>,
    pub save_assets_on_flush: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("Temp/HostBridge"),
            idle_timeout_ms: 2_000,
            lock_expiry_ms: 1_500,
            compiled_extensions: vec!["cs".to_string()],
            save_assets_on_flush: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct DiagnosticsSettings {
    pub cache_window_ms: u64,
    pub context_lines: usize,
    pub structured_artifact: PathBuf,
    pub raw_log_dir: PathBuf,
    pub raw_log_extensions: Vec<String>,
    pub session_log: Option<PathBuf>,
    pub tail_lines: usize,
    pub begin_marker: String,
    pub end_marker: String,
    pub build_trace: PathBuf,
    pub fresh_poll_delay_ms: u64,
    pub fresh_poll_attempts: u32,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            cache_window_ms: 5_000,
            context_lines: 2,
            structured_artifact: PathBuf::from("Temp/HostBridge/compile_results.json"),
            raw_log_dir: PathBuf::from("Temp"),
            raw_log_extensions: vec!["log".to_string(), "txt".to_string()],
            session_log: None,
            tail_lines: 1_000,
            begin_marker: "-----CompilerOutput".to_string(),
            end_marker: "-----EndCompilerOutput".to_string(),
            build_trace: PathBuf::from("Library/Bee/tundra.log.json"),
            fresh_poll_delay_ms: 1_500,
            fresh_poll_attempts: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct PatchSettings {
    pub context_strictness: ContextStrictness,
}

/// Log levels: a default plus per-module overrides (`RUST_LOG` wins).
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub default: String,
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: "warn".to_string(),
            modules: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.bridge.address.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "bridge.address",
            });
        }
        if self.bridge.worker_threads == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "bridge.worker_threads",
                message: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("bridge.main_thread_timeout_ms", self.bridge.main_thread_timeout_ms),
            ("bridge.worker_timeout_ms", self.bridge.worker_timeout_ms),
            ("refresh.idle_timeout_ms", self.refresh.idle_timeout_ms),
            ("refresh.lock_expiry_ms", self.refresh.lock_expiry_ms),
        ] {
            if value == 0 {
                issues.push(ValidationIssue::OutOfRange {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if let Some(req) = &self.bridge.protocol_requirement {
            if let Err(e) = parse_requirement(req) {
                issues.push(ValidationIssue::InvalidValue {
                    field: "bridge.protocol_requirement",
                    message: e.to_string(),
                });
            }
        }

        if !is_plain_relative(&self.refresh.working_dir) {
            issues.push(ValidationIssue::InvalidValue {
                field: "refresh.working_dir",
                message: "must be a relative path without '..'".to_string(),
            });
        }

        if self.diagnostics.begin_marker.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "diagnostics.begin_marker",
            });
        }
        if self.diagnostics.end_marker.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "diagnostics.end_marker",
            });
        }
        if self.diagnostics.tail_lines == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "diagnostics.tail_lines",
                message: "must be at least 1".to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    OutOfRange {
        field: &'static str,
        message: String,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::OutOfRange { field, message } => {
                write!(f, "'{field}' out of range: {message}")
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "'{field}' is invalid: {message}")
            }
        }
    }
}
