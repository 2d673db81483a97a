use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use hostbridge::bridge::{BridgeClient, BridgeServer, Dispatcher, MainLoop, ProjectContext};
use hostbridge::config::{self, BridgeConfig};
use hostbridge::diagnostics::{DiagnosticsAggregator, DiagnosticsQuery, Severity};
use hostbridge::logging;
use hostbridge::patch::{Patch, PatchEngine, PatchOutcome, PatchRequest};
use hostbridge::refresh::{MarkerSink, RefreshCoordinator};
use serde::Deserialize;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

const PROJECT_ENV: &str = "HOSTBRIDGE_PROJECT";

#[derive(Parser)]
#[command(name = "hostbridge")]
#[command(about = "Automation bridge for single-threaded editor hosts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a headless host: bridge server plus a main loop on this thread
    Serve {
        /// Project root (HOSTBRIDGE_PROJECT or the current directory if not specified)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Config file (otherwise <project>/hostbridge.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address, overriding [bridge] address
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Send one request to a running host and print the result
    Call {
        /// Method name, e.g. ping or script/read
        method: String,

        /// Params as a JSON object
        params: Option<String>,

        /// Host address, overriding [bridge] address
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Apply a patch list to a local file
    Patch {
        /// File to patch
        file: PathBuf,

        /// JSON file holding a patch array or a full request
        #[arg(short, long)]
        patches: PathBuf,

        /// Validate and preview without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Collect compiler diagnostics for a project
    Diagnostics {
        /// Project root (HOSTBRIDGE_PROJECT or the current directory if not specified)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Skip the cache and nudge a recompile if nothing is found
        #[arg(short, long)]
        fresh: bool,

        /// Drop records below this severity (info, warning, error)
        #[arg(long)]
        min_severity: Option<Severity>,

        /// Print the raw report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            project,
            config,
            address,
        } => cmd_serve(project, config, address),

        Commands::Call {
            method,
            params,
            address,
        } => cmd_call(&method, params.as_deref(), address),

        Commands::Patch {
            file,
            patches,
            dry_run,
            diff,
        } => cmd_patch(&file, &patches, dry_run, diff),

        Commands::Diagnostics {
            project,
            fresh,
            min_severity,
            json,
        } => cmd_diagnostics(project, fresh, min_severity, json),
    }
}

/// Resolve the project root
///
/// Priority order:
/// 1. Explicit --project flag
/// 2. HOSTBRIDGE_PROJECT environment variable
/// 3. Current directory
fn resolve_project(cli_project: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_project {
        return path
            .canonicalize()
            .with_context(|| format!("project not found: {}", path.display()));
    }

    if let Ok(env_path) = env::var(PROJECT_ENV) {
        let path = PathBuf::from(&env_path);
        if path.is_dir() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: {PROJECT_ENV} is set but path doesn't exist: {env_path}").yellow()
        );
    }

    Ok(env::current_dir()?)
}

fn load_config(explicit: Option<&Path>, project: &Path) -> Result<BridgeConfig> {
    let config = config::discover(explicit, project)?;
    logging::init_with_config(&config.logging);
    Ok(config)
}

fn cmd_serve(
    project: Option<PathBuf>,
    config_path: Option<PathBuf>,
    address: Option<String>,
) -> Result<()> {
    let project = resolve_project(project)?;
    let config = load_config(config_path.as_deref(), &project)?;
    let address = address.unwrap_or_else(|| config.bridge.address.clone());

    let ctx = ProjectContext::open(&project, &config)?;
    let main_loop = MainLoop::new();
    let dispatcher = Dispatcher::new(
        Arc::new(ctx),
        Arc::new(main_loop.handle()),
        config.bridge.main_thread_timeout(),
    );
    let server = BridgeServer::bind(address.as_str(), dispatcher, config.bridge.worker_threads)
        .with_context(|| format!("failed to bind {address}"))?;
    let handle = server.start()?;

    println!("Project: {}", project.display());
    println!(
        "{}",
        format!("Listening on {} (protocol {})", handle.local_addr(), config::PROTOCOL_VERSION)
            .green()
    );

    // The process main thread is the host's main loop
    loop {
        main_loop.pump_for(Duration::from_millis(100));
    }
}

fn cmd_call(method: &str, params: Option<&str>, address: Option<String>) -> Result<()> {
    let cwd = env::current_dir()?;
    let config = load_config(None, &cwd)?;

    let mut settings = config.bridge;
    if let Some(address) = address {
        settings.address = address;
    }

    let params: Value = match params {
        Some(raw) => serde_json::from_str(raw).context("params must be valid JSON")?,
        None => Value::Object(Default::default()),
    };

    let client = BridgeClient::connect_with_retry(&settings)?;
    match client.call(method, params) {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            client.disconnect();
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("✗ {method} failed: {}", e.kind).red());
            eprintln!("{}", serde_json::to_string_pretty(&e)?);
            client.disconnect();
            process::exit(1);
        }
    }
}

/// Patch file contents: a bare list or a full request.
#[derive(Deserialize)]
#[serde(untagged)]
enum PatchFile {
    List(Vec<Patch>),
    Request(PatchRequest),
}

fn cmd_patch(file: &Path, patches: &Path, dry_run: bool, show_diff: bool) -> Result<()> {
    let cwd = env::current_dir()?;
    let config = load_config(None, &cwd)?;

    let raw = fs::read_to_string(patches)
        .with_context(|| format!("failed to read {}", patches.display()))?;
    let parsed: PatchFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", patches.display()))?;

    let display = file.display().to_string();
    let mut request = match parsed {
        PatchFile::List(list) => PatchRequest::new(display, list),
        PatchFile::Request(mut request) => {
            request.path = display;
            request
        }
    };
    request.dry_run |= dry_run;

    let before = if show_diff {
        fs::read_to_string(file).ok()
    } else {
        None
    };

    let engine = PatchEngine::new(config.patch.context_strictness);
    let outcome = match engine.apply(file, &request) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", format!("✗ {}: {e}", file.display()).red());
            process::exit(1);
        }
    };

    print_outcome(&outcome);

    if show_diff {
        if outcome.dry_run {
            println!("\n{}", outcome.diff);
        } else if let (Some(before), Ok(after)) = (before, fs::read_to_string(file)) {
            display_diff(file, &before, &after);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &PatchOutcome) {
    if outcome.dry_run {
        println!("{}", "[DRY RUN - nothing written]".cyan());
    }
    for report in &outcome.patches {
        let verb = if outcome.dry_run { "would replace" } else { "replaced" };
        println!(
            "  {} patch {} ({:?}): {} lines {}-{} with {} line(s)",
            "✓".green(),
            report.index,
            report.locator,
            verb,
            report.start_line,
            report.end_line,
            report.after.len()
        );
    }

    println!();
    if outcome.dry_run {
        println!("Summary: {} previewed", outcome.previewed);
    } else {
        println!("Summary: {} applied", outcome.applied.to_string().green());
    }
}

/// Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_diagnostics(
    project: Option<PathBuf>,
    fresh: bool,
    min_severity: Option<Severity>,
    json: bool,
) -> Result<()> {
    let project = resolve_project(project)?;
    let config = load_config(None, &project)?;

    let mut aggregator = DiagnosticsAggregator::new(&project, &config.diagnostics);
    if fresh {
        let sink = MarkerSink::new(
            project.join(&config.refresh.working_dir),
            Duration::from_millis(config.refresh.lock_expiry_ms),
        );
        let coordinator = RefreshCoordinator::new(Arc::new(sink), &config.refresh)?;
        aggregator = aggregator.with_trigger(Arc::new(coordinator));
    }

    let report = aggregator.query(&DiagnosticsQuery {
        fresh,
        min_severity,
        file: None,
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for status in &report.sources {
        let line = match &status.error {
            Some(error) => format!("  {}: {}", status.name, error).yellow(),
            None => format!("  {}: {} record(s)", status.name, status.count).dimmed(),
        };
        println!("{line}");
    }
    println!();

    for record in &report.records {
        let label = match record.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".cyan(),
        };
        let location = if record.has_location() {
            format!("{}({},{})", record.file, record.line, record.column)
        } else {
            "<unknown>".to_string()
        };
        println!("{} {} {}: {}", location.bold(), label, record.code, record.message);

        for context in record.context.iter().flatten() {
            let gutter = format!("{:>5} |", context.line);
            if context.line == record.line {
                println!("  {} {}", gutter.dimmed(), context.text.bold());
            } else {
                println!("  {} {}", gutter.dimmed(), context.text.dimmed());
            }
        }
    }

    println!();
    println!(
        "Summary: {} error(s), {} warning(s){}",
        report.error_count.to_string().red(),
        report.warning_count.to_string().yellow(),
        if report.from_cache { " (cached)" } else { "" }
    );

    if report.error_count > 0 {
        process::exit(1);
    }
    Ok(())
}
