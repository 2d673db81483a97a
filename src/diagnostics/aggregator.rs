use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::DiagnosticsSettings;
use crate::diagnostics::record::{ContextLine, DiagnosticRecord, Severity};
use crate::diagnostics::sources::{self, DiagnosticSource};
use crate::refresh::{RefreshCoordinator, RefreshOptions};

/// Something that can make the host recompile.
pub trait RecompileTrigger: Send + Sync {
    fn trigger_recompile(&self);
}

impl RecompileTrigger for RefreshCoordinator {
    fn trigger_recompile(&self) {
        self.request_refresh(RefreshOptions {
            force_recompile: true,
            save_assets: false,
        });
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DiagnosticsQuery {
    /// Bypass the cache (and nudge a recompile if nothing is found)
    pub fresh: bool,
    pub min_severity: Option<Severity>,
    /// Only records whose file equals or ends with this path
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub records: Vec<DiagnosticRecord>,
    pub sources: Vec<SourceStatus>,
    pub from_cache: bool,
    pub collected_at: String,
    pub error_count: usize,
    pub warning_count: usize,
}

#[derive(Clone)]
struct Snapshot {
    taken: Instant,
    collected_at: DateTime<Utc>,
    records: Vec<DiagnosticRecord>,
    sources: Vec<SourceStatus>,
}

/// Merges every source into one deduplicated list.
pub struct DiagnosticsAggregator {
    project_root: PathBuf,
    sources: Vec<Box<dyn DiagnosticSource>>,
    context_lines: usize,
    cache_window: Duration,
    poll_delay: Duration,
    poll_attempts: u32,
    trigger: Option<Arc<dyn RecompileTrigger>>,
    cache: Mutex<Option<Snapshot>>,
}

impl DiagnosticsAggregator {
    /// Aggregator over the standard sources for `project_root`.
    pub fn new(project_root: impl Into<PathBuf>, settings: &DiagnosticsSettings) -> Self {
        let project_root = project_root.into();
        let sources = sources::from_settings(&project_root, settings);
        Self::with_sources(project_root, sources, settings)
    }

    pub fn with_sources(
        project_root: impl Into<PathBuf>,
        sources: Vec<Box<dyn DiagnosticSource>>,
        settings: &DiagnosticsSettings,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            sources,
            context_lines: settings.context_lines,
            cache_window: Duration::from_millis(settings.cache_window_ms),
            poll_delay: Duration::from_millis(settings.fresh_poll_delay_ms),
            poll_attempts: settings.fresh_poll_attempts,
            trigger: None,
            cache: Mutex::new(None),
        }
    }

    /// Let fresh queries that find nothing request a recompile.
    pub fn with_trigger(mut self, trigger: Arc<dyn RecompileTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn query(&self, query: &DiagnosticsQuery) -> DiagnosticsReport {
        let (snapshot, from_cache) = if query.fresh {
            (self.collect_fresh(), false)
        } else {
            match self.cached() {
                Some(snapshot) => (snapshot, true),
                None => (self.collect(), false),
            }
        };
        *self.cache.lock() = Some(snapshot.clone());

        let records: Vec<DiagnosticRecord> = snapshot
            .records
            .into_iter()
            .filter(|r| query.min_severity.map_or(true, |min| r.severity >= min))
            .filter(|r| query.file.as_deref().map_or(true, |f| file_matches(&r.file, f)))
            .collect();

        let error_count = records.iter().filter(|r| r.severity == Severity::Error).count();
        let warning_count = records.iter().filter(|r| r.severity == Severity::Warning).count();

        DiagnosticsReport {
            records,
            sources: snapshot.sources,
            from_cache,
            collected_at: snapshot.collected_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            error_count,
            warning_count,
        }
    }

    /// Drop any cached result.
    pub fn invalidate(&self) {
        self.cache.lock().take();
    }

    fn cached(&self) -> Option<Snapshot> {
        self.cache
            .lock()
            .as_ref()
            .filter(|s| s.taken.elapsed() < self.cache_window)
            .cloned()
    }

    fn collect_fresh(&self) -> Snapshot {
        let snapshot = self.collect();
        if !snapshot.records.is_empty() {
            return snapshot;
        }
        let Some(trigger) = &self.trigger else {
            return snapshot;
        };

        tracing::debug!(target: "diagnostics", "fresh query found nothing; requesting recompile");
        trigger.trigger_recompile();

        let mut snapshot = snapshot;
        for attempt in 1..=self.poll_attempts {
            thread::sleep(self.poll_delay);
            snapshot = self.collect();
            if !snapshot.records.is_empty() {
                tracing::debug!(target: "diagnostics", "records appeared after poll {attempt}");
                break;
            }
        }
        snapshot
    }

    fn collect(&self) -> Snapshot {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut statuses = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.collect() {
                Ok(found) => {
                    statuses.push(SourceStatus {
                        name: source.name().to_string(),
                        count: found.len(),
                        error: None,
                    });
                    for record in found {
                        if seen.insert(record.key()) {
                            records.push(record);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "diagnostics", "source '{}' failed: {e}", source.name());
                    statuses.push(SourceStatus {
                        name: source.name().to_string(),
                        count: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        self.enrich(&mut records);

        Snapshot {
            taken: Instant::now(),
            collected_at: Utc::now(),
            records,
            sources: statuses,
        }
    }

    fn enrich(&self, records: &mut [DiagnosticRecord]) {
        if self.context_lines == 0 {
            return;
        }
        let mut files: HashMap<String, Option<Vec<String>>> = HashMap::new();

        for record in records.iter_mut().filter(|r| r.has_location()) {
            let lines = files
                .entry(record.file.clone())
                .or_insert_with(|| read_lines(&self.project_root, &record.file));
            let Some(lines) = lines else {
                continue;
            };
            if record.line > lines.len() {
                continue;
            }

            let first = record.line.saturating_sub(self.context_lines).max(1);
            let last = (record.line + self.context_lines).min(lines.len());
            record.context = Some(
                (first..=last)
                    .map(|n| ContextLine {
                        line: n,
                        text: lines[n - 1].clone(),
                    })
                    .collect(),
            );
        }
    }
}

fn read_lines(root: &Path, file: &str) -> Option<Vec<String>> {
    let path = Path::new(file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let bytes = fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    Some(
        text.trim_start_matches('\u{feff}')
            .lines()
            .map(str::to_string)
            .collect(),
    )
}

fn file_matches(record_file: &str, wanted: &str) -> bool {
    let wanted = wanted.replace('\\', "/");
    record_file == wanted || record_file.ends_with(&format!("/{wanted}"))
}
