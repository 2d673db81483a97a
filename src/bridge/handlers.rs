//! Method handlers and the project state they share.
//!
//! Every params struct rejects unknown keys. Main-affine handlers are
//! plain synchronous functions; the dispatcher decides which thread they
//! run on.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::bridge::catalog::Method;
use crate::bridge::events::EventSink;
use crate::bridge::protocol::{Event, EventKind};
use crate::config::{BridgeConfig, PROTOCOL_VERSION};
use crate::diagnostics::{DiagnosticsAggregator, DiagnosticsQuery};
use crate::edit::{self, SourceText};
use crate::error::{BridgeError, ErrorKind};
use crate::patch::{PatchEngine, PatchRequest};
use crate::refresh::{MarkerSink, Mutation, MutationKind, RefreshCoordinator, RefreshOptions};
use crate::safety::ProjectGuard;

const META_SUFFIX: &str = ".meta";

/// Everything a handler may touch, owned once and shared by reference.
pub struct ProjectContext {
    name: String,
    guard: ProjectGuard,
    coordinator: Arc<RefreshCoordinator>,
    aggregator: DiagnosticsAggregator,
    engine: PatchEngine,
    events: RwLock<Option<Arc<dyn EventSink>>>,
}

impl ProjectContext {
    /// Open `project_root` with the file-backed refresh sink.
    pub fn open(project_root: &Path, config: &BridgeConfig) -> Result<Self, BridgeError> {
        let guard = ProjectGuard::new(project_root, &config.refresh.working_dir)?;
        let sink = MarkerSink::new(
            guard.project_root().join(&config.refresh.working_dir),
            std::time::Duration::from_millis(config.refresh.lock_expiry_ms),
        );
        let coordinator = RefreshCoordinator::new(Arc::new(sink), &config.refresh)
            .map_err(|e| BridgeError::internal(format!("failed to start refresh timer: {e}")))?;
        Ok(Self::with_coordinator(guard, Arc::new(coordinator), config))
    }

    pub fn with_coordinator(
        guard: ProjectGuard,
        coordinator: Arc<RefreshCoordinator>,
        config: &BridgeConfig,
    ) -> Self {
        let aggregator = DiagnosticsAggregator::new(guard.project_root(), &config.diagnostics)
            .with_trigger(coordinator.clone());
        let name = guard
            .project_root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            name,
            guard,
            coordinator,
            aggregator,
            engine: PatchEngine::new(config.patch.context_strictness),
            events: RwLock::new(None),
        }
    }

    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.events.write() = Some(sink);
    }

    pub fn project_root(&self) -> &Path {
        self.guard.project_root()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn aggregator(&self) -> &DiagnosticsAggregator {
        &self.aggregator
    }

    fn relative(&self, path: &Path) -> String {
        self.guard
            .relative(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn changed(&self, mutations: Vec<Mutation>) {
        for mutation in &mutations {
            self.coordinator.notify(mutation.clone());
        }
        if let Some(sink) = self.events.read().as_ref() {
            sink.emit(Event::new(
                EventKind::ProjectChanged,
                json!({ "mutations": mutations }),
            ));
        }
    }
}

/// Run `method` with raw `params` on the current thread.
pub fn handle(ctx: &ProjectContext, method: Method, params: Value) -> Result<Value, BridgeError> {
    match method {
        Method::Ping => ping(),
        Method::ProjectInfo => project_info(ctx),
        Method::ProjectRefresh => project_refresh(ctx, parse(params)?),
        Method::ScriptRead => script_read(ctx, parse(params)?),
        Method::ScriptCreate => script_create(ctx, parse(params)?),
        Method::ScriptDelete => script_delete(ctx, parse(params)?),
        Method::ScriptApplyDiff => script_apply_diff(ctx, parse(params)?),
        Method::FolderList => folder_list(ctx, parse(params)?),
        Method::FolderCreate => folder_create(ctx, parse(params)?),
        Method::FolderRename => folder_rename(ctx, parse(params)?),
        Method::FolderMove => folder_move(ctx, parse(params)?),
        Method::FolderDelete => folder_delete(ctx, parse(params)?),
        Method::DiagnosticsGet => diagnostics_get(ctx, parse(params)?),
        Method::BatchStart => {
            parse::<Empty>(params)?;
            Ok(json!({ "joined": ctx.coordinator.start_batch() }))
        }
        Method::BatchEnd => {
            parse::<Empty>(params)?;
            to_value(ctx.coordinator.end_batch())
        }
    }
}

/// Decode params; a missing `params` field counts as `{}`.
fn parse<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, BridgeError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| BridgeError::invalid_params(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, BridgeError> {
    serde_json::to_value(value).map_err(|e| BridgeError::internal(e.to_string()))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Empty {}

fn ping() -> Result<Value, BridgeError> {
    Ok(json!({
        "pong": true,
        "protocolVersion": PROTOCOL_VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

fn project_info(ctx: &ProjectContext) -> Result<Value, BridgeError> {
    Ok(json!({
        "name": ctx.name,
        "root": ctx.project_root().display().to_string(),
        "protocolVersion": PROTOCOL_VERSION,
        "batching": ctx.coordinator.is_batching(),
        "refreshPending": ctx.coordinator.is_pending(),
    }))
}

fn project_refresh(ctx: &ProjectContext, options: RefreshOptions) -> Result<Value, BridgeError> {
    to_value(ctx.coordinator.request_refresh(options))
}

fn diagnostics_get(ctx: &ProjectContext, query: DiagnosticsQuery) -> Result<Value, BridgeError> {
    to_value(ctx.aggregator.query(&query))
}

// ---------------------------------------------------------------------------
// scripts
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadParams {
    pub path: String,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
}

fn script_read(ctx: &ProjectContext, params: ReadParams) -> Result<Value, BridgeError> {
    let path = ctx.guard.resolve_existing(&params.path)?;
    if path.is_dir() {
        return Err(BridgeError::invalid_params(format!("{} is a folder", params.path)));
    }
    let text = SourceText::read(&path).map_err(|e| match e {
        edit::EditError::Io(source) => BridgeError::io(&path, &source),
        other => BridgeError::new(ErrorKind::ParseError, other.to_string()),
    })?;

    let line_count = text.line_count();
    let content = match (params.start_line, params.end_line) {
        (None, None) => text.body(),
        (start, end) => {
            let start = start.unwrap_or(1);
            let end = end.unwrap_or(line_count).min(line_count);
            if start == 0 || start > end {
                return Err(BridgeError::invalid_params(format!(
                    "invalid line range {start}-{end} for a file of {line_count} lines"
                )));
            }
            (start - 1..end)
                .filter_map(|i| text.raw_line(i))
                .collect::<String>()
        }
    };

    Ok(json!({
        "path": params.path,
        "content": content,
        "lineCount": line_count,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateParams {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub overwrite: bool,
}

fn script_create(ctx: &ProjectContext, params: CreateParams) -> Result<Value, BridgeError> {
    let path = ctx.guard.resolve_new(&params.path)?;
    let existed = path.exists();
    if existed && (path.is_dir() || !params.overwrite) {
        return Err(BridgeError::already_exists(Path::new(&params.path)));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BridgeError::io(parent, &e))?;
    }
    edit::atomic_write(&path, params.content.as_bytes()).map_err(|e| match e {
        edit::EditError::Io(source) => BridgeError::io(&path, &source),
        other => BridgeError::internal(other.to_string()),
    })?;

    let relative = ctx.relative(&path);
    let kind = if existed {
        MutationKind::Modified
    } else {
        MutationKind::Created
    };
    tracing::info!(target: "bridge", "script {kind}: {relative}");
    ctx.changed(vec![Mutation::new(kind, relative.clone())]);

    Ok(json!({
        "path": relative,
        "created": !existed,
        "bytes": params.content.len(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PathParams {
    pub path: String,
}

fn script_delete(ctx: &ProjectContext, params: PathParams) -> Result<Value, BridgeError> {
    let path = ctx.guard.resolve_existing(&params.path)?;
    if path.is_dir() {
        return Err(BridgeError::invalid_params(format!(
            "{} is a folder; use folder/delete",
            params.path
        )));
    }
    fs::remove_file(&path).map_err(|e| BridgeError::io(&path, &e))?;
    let meta_removed = remove_meta(&path)?;

    let relative = ctx.relative(&path);
    tracing::info!(target: "bridge", "script deleted: {relative}");
    ctx.changed(vec![Mutation::deleted(relative.clone())]);

    Ok(json!({ "path": relative, "deleted": true, "metaRemoved": meta_removed }))
}

fn script_apply_diff(ctx: &ProjectContext, request: PatchRequest) -> Result<Value, BridgeError> {
    let path = ctx.guard.resolve_existing(&request.path)?;
    let outcome = ctx.engine.apply(&path, &request)?;
    if outcome.applied > 0 {
        ctx.changed(vec![Mutation::modified(ctx.relative(&path))]);
    }
    to_value(outcome)
}

// ---------------------------------------------------------------------------
// folders
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ListParams {
    pub path: String,
    pub recursive: bool,
    pub include_meta: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

#[derive(Debug, Serialize)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
}

fn folder_list(ctx: &ProjectContext, params: ListParams) -> Result<Value, BridgeError> {
    let root = ctx.guard.resolve_existing(&params.path)?;
    if !root.is_dir() {
        return Err(BridgeError::invalid_params(format!("{} is not a folder", params.path)));
    }

    let depth = if params.recursive { usize::MAX } else { 1 };
    let mut entries = Vec::new();
    for entry in WalkDir::new(&root).min_depth(1).max_depth(depth).sort_by_file_name() {
        let entry = entry.map_err(|e| BridgeError::io(&root, &io::Error::from(e)))?;
        let is_meta = entry.file_name().to_string_lossy().ends_with(META_SUFFIX);
        if is_meta && !params.include_meta {
            continue;
        }
        let (kind, size) = if entry.file_type().is_dir() {
            (EntryKind::Folder, 0)
        } else {
            (EntryKind::File, entry.metadata().map(|m| m.len()).unwrap_or(0))
        };
        entries.push(Entry {
            path: ctx.relative(entry.path()),
            kind,
            size,
        });
    }

    Ok(json!({ "entries": entries }))
}

fn folder_create(ctx: &ProjectContext, params: PathParams) -> Result<Value, BridgeError> {
    let path = ctx.guard.resolve_new(&params.path)?;
    if path.exists() {
        return Err(BridgeError::already_exists(Path::new(&params.path)));
    }
    fs::create_dir_all(&path).map_err(|e| BridgeError::io(&path, &e))?;

    let relative = ctx.relative(&path);
    tracing::info!(target: "bridge", "folder created: {relative}");
    ctx.changed(vec![Mutation::created(relative.clone())]);
    Ok(json!({ "path": relative, "created": true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenameParams {
    pub path: String,
    pub new_name: String,
}

fn folder_rename(ctx: &ProjectContext, params: RenameParams) -> Result<Value, BridgeError> {
    let name = params.new_name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(BridgeError::invalid_params(format!(
            "'{}' is not a plain folder name",
            params.new_name
        )));
    }
    let source = existing_folder(ctx, &params.path)?;
    let parent = source
        .parent()
        .ok_or_else(|| BridgeError::invalid_params("cannot rename the project root"))?;
    let destination = ctx.guard.resolve_new(parent.join(name))?;
    relocate(ctx, &source, &destination)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MoveParams {
    pub path: String,
    /// Folder to move into
    pub destination: String,
}

fn folder_move(ctx: &ProjectContext, params: MoveParams) -> Result<Value, BridgeError> {
    let source = existing_folder(ctx, &params.path)?;
    let target_parent = ctx.guard.resolve_existing(&params.destination)?;
    if !target_parent.is_dir() {
        return Err(BridgeError::invalid_params(format!(
            "{} is not a folder",
            params.destination
        )));
    }
    if target_parent.starts_with(&source) {
        return Err(BridgeError::invalid_params(format!(
            "cannot move {} into itself",
            params.path
        )));
    }
    let name = source
        .file_name()
        .ok_or_else(|| BridgeError::invalid_params("cannot move the project root"))?;
    let destination = ctx.guard.resolve_new(target_parent.join(name))?;
    relocate(ctx, &source, &destination)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeleteFolderParams {
    pub path: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
}

fn default_true() -> bool {
    true
}

fn folder_delete(ctx: &ProjectContext, params: DeleteFolderParams) -> Result<Value, BridgeError> {
    let path = existing_folder(ctx, &params.path)?;
    let result = if params.recursive {
        fs::remove_dir_all(&path)
    } else {
        fs::remove_dir(&path)
    };
    result.map_err(|e| BridgeError::io(&path, &e))?;
    let meta_removed = remove_meta(&path)?;

    let relative = ctx.relative(&path);
    tracing::info!(target: "bridge", "folder deleted: {relative}");
    ctx.changed(vec![Mutation::deleted(relative.clone())]);
    Ok(json!({ "path": relative, "deleted": true, "metaRemoved": meta_removed }))
}

fn existing_folder(ctx: &ProjectContext, path: &str) -> Result<PathBuf, BridgeError> {
    let resolved = ctx.guard.resolve_existing(path)?;
    if resolved == ctx.project_root() {
        return Err(BridgeError::new(
            ErrorKind::PathRejected,
            "the project root itself cannot be modified",
        ));
    }
    if !resolved.is_dir() {
        return Err(BridgeError::invalid_params(format!("{path} is not a folder")));
    }
    Ok(resolved)
}

/// Rename `source` to `destination`, carrying its `.meta` sidecar along.
fn relocate(ctx: &ProjectContext, source: &Path, destination: &Path) -> Result<Value, BridgeError> {
    if destination.exists() {
        return Err(BridgeError::already_exists(&ctx.guard.relative(destination)));
    }
    fs::rename(source, destination).map_err(|e| BridgeError::io(source, &e))?;

    let source_meta = meta_path(source);
    let meta_moved = if source_meta.exists() {
        let destination_meta = meta_path(destination);
        fs::rename(&source_meta, &destination_meta)
            .map_err(|e| BridgeError::io(&source_meta, &e))?;
        true
    } else {
        false
    };

    let from = ctx.relative(source);
    let to = ctx.relative(destination);
    tracing::info!(target: "bridge", "folder moved: {from} -> {to}");
    ctx.changed(vec![Mutation::deleted(from.clone()), Mutation::created(to.clone())]);

    Ok(json!({ "from": from, "to": to, "metaMoved": meta_moved }))
}

fn meta_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

fn remove_meta(path: &Path) -> Result<bool, BridgeError> {
    let meta = meta_path(path);
    match fs::remove_file(&meta) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BridgeError::io(&meta, &e)),
    }
}
