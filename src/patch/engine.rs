//! All-or-nothing application of a patch list to one file.
//!
//! Every patch is resolved and its context checked against the unmodified
//! text before the first splice. Any failure aborts the whole call and the
//! file is left byte-identical.

use similar::TextDiff;
use std::fs;
use std::path::Path;

use crate::edit::{self, EditError, LineSplice, SourceText};
use crate::patch::context;
use crate::patch::errors::PatchError;
use crate::patch::locator::{self, ResolvedRange};
use crate::patch::schema::{ContextStrictness, Patch, PatchOutcome, PatchReport, PatchRequest};

/// Resolved, validated patch ready to splice.
#[derive(Debug, Clone)]
struct Planned {
    index: usize,
    range: ResolvedRange,
    splice: LineSplice,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchEngine {
    default_strictness: ContextStrictness,
}

impl PatchEngine {
    pub fn new(default_strictness: ContextStrictness) -> Self {
        Self { default_strictness }
    }

    /// Apply (or preview) `request` against the file at `path`.
    ///
    /// `path` must already be resolved and vetted by the caller;
    /// `request.path` is only echoed back in the outcome.
    pub fn apply(&self, path: &Path, request: &PatchRequest) -> Result<PatchOutcome, PatchError> {
        let bytes = fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                PatchError::NotFound(path.to_path_buf())
            } else {
                PatchError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let original = SourceText::from_bytes(&bytes).map_err(|e| match e {
            EditError::Utf8(_) => PatchError::Encoding(path.to_path_buf()),
            other => io_error(path, other),
        })?;

        let strictness = request.context_strictness.unwrap_or(self.default_strictness);
        let (patched, reports) =
            self.patch_text(&original, &request.patches, request.validate_context, strictness)?;

        let diff = unified_diff(&request.path, &original, &patched);
        let count = reports.len();

        if request.dry_run {
            tracing::debug!(target: "patch", "previewed {count} patch(es) on {}", request.path);
            return Ok(PatchOutcome {
                path: request.path.clone(),
                dry_run: true,
                applied: 0,
                previewed: count,
                patches: reports,
                diff,
            });
        }

        edit::commit(path, original.original_hash(), &patched).map_err(|e| match e {
            EditError::ContentChanged(_) => PatchError::ConcurrentModification(path.to_path_buf()),
            other => io_error(path, other),
        })?;

        tracing::info!(target: "patch", "applied {count} patch(es) to {}", request.path);

        Ok(PatchOutcome {
            path: request.path.clone(),
            dry_run: false,
            applied: count,
            previewed: count,
            patches: reports,
            diff,
        })
    }

    /// Pure form of [`PatchEngine::apply`]: returns the patched text and
    /// per-patch reports without touching disk.
    pub fn patch_text(
        &self,
        original: &SourceText,
        patches: &[Patch],
        validate_context: bool,
        strictness: ContextStrictness,
    ) -> Result<(SourceText, Vec<PatchReport>), PatchError> {
        if patches.is_empty() {
            return Err(PatchError::Empty);
        }

        let mut planned = Vec::with_capacity(patches.len());
        for (index, patch) in patches.iter().enumerate() {
            let range = locator::resolve(patch, original)
                .map_err(|source| PatchError::Locator { index, source })?;

            if validate_context {
                context::validate(index, patch, &range, original, strictness)?;
            }

            planned.push(Planned {
                index,
                range,
                splice: LineSplice::new(range.start, range.end, &patch.new_content),
            });
        }

        check_overlaps(&planned)?;

        let reports = planned
            .iter()
            .map(|p| PatchReport {
                index: p.index,
                locator: p.range.kind,
                start_line: p.range.start + 1,
                end_line: p.range.end + 1,
                before: (p.range.start..=p.range.end)
                    .filter_map(|i| original.line(i).map(str::to_string))
                    .collect(),
                after: p.splice.new_lines.clone(),
            })
            .collect();

        let splices: Vec<LineSplice> = planned.into_iter().map(|p| p.splice).collect();
        let mut patched = original.clone();
        patched.apply(&splices)?;

        Ok((patched, reports))
    }
}

fn check_overlaps(planned: &[Planned]) -> Result<(), PatchError> {
    let mut by_start: Vec<&Planned> = planned.iter().collect();
    by_start.sort_by_key(|p| p.range.start);

    for window in by_start.windows(2) {
        let (first, second) = (window[0], window[1]);
        if first.range.end >= second.range.start {
            let (a, b) = if first.index < second.index {
                (first, second)
            } else {
                (second, first)
            };
            return Err(PatchError::Overlap {
                first: a.index,
                second: b.index,
                first_start: a.range.start + 1,
                first_end: a.range.end + 1,
                second_start: b.range.start + 1,
                second_end: b.range.end + 1,
            });
        }
    }
    Ok(())
}

fn unified_diff(label: &str, before: &SourceText, after: &SourceText) -> String {
    let before = before.body();
    let after = after.body();
    TextDiff::from_lines(&before, &after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("{label} (original)"), &format!("{label} (patched)"))
        .to_string()
}

fn io_error(path: &Path, error: EditError) -> PatchError {
    let source = match error {
        EditError::Io(source) => source,
        other => std::io::Error::other(other.to_string()),
    };
    PatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}
