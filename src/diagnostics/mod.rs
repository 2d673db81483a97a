//! Diagnostics Aggregator.
//!
//! There is no single live channel for compiler output, so several
//! artifacts are read and reconciled:
//!
//! 1. the structured result file the host's instrumentation writes
//! 2. raw compiler text left in the host's transient working files
//! 3. the tail of the host's session log, inside the compiler-output bracket
//! 4. the build pipeline's trace file
//!
//! Records are merged by (file, line, code, message), first occurrence
//! winning, then enriched with surrounding source lines. A failing source
//! contributes nothing; the aggregator itself never fails.

pub mod aggregator;
pub mod patterns;
pub mod record;
pub mod sources;

pub use aggregator::{
    DiagnosticsAggregator, DiagnosticsQuery, DiagnosticsReport, RecompileTrigger, SourceStatus,
};
pub use record::{ContextLine, DiagnosticKey, DiagnosticRecord, Severity, GENERIC_CODE};
pub use sources::{DiagnosticSource, SourceError};
