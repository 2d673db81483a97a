//! Context precondition: the lines around a resolved range must be what
//! the caller saw when it built the patch.

use crate::edit::SourceText;
use crate::patch::errors::{ContextSide, PatchError};
use crate::patch::locator::ResolvedRange;
use crate::patch::schema::{ContextStrictness, Patch};

pub fn validate(
    index: usize,
    patch: &Patch,
    range: &ResolvedRange,
    text: &SourceText,
    strictness: ContextStrictness,
) -> Result<(), PatchError> {
    if !patch.context_before.is_empty() {
        let wanted = patch.context_before.len();
        // Fewer lines than requested above the range is a mismatch, not a panic
        let first = range.start.saturating_sub(wanted);
        let actual: Vec<&str> = (first..range.start).filter_map(|i| text.line(i)).collect();
        check(
            index,
            ContextSide::Before,
            first + 1,
            &patch.context_before,
            &actual,
            strictness,
        )?;
    }

    if !patch.context_after.is_empty() {
        let first = range.end + 1;
        let last = (first + patch.context_after.len()).min(text.line_count());
        let actual: Vec<&str> = (first..last).filter_map(|i| text.line(i)).collect();
        check(
            index,
            ContextSide::After,
            first + 1,
            &patch.context_after,
            &actual,
            strictness,
        )?;
    }

    Ok(())
}

fn check(
    index: usize,
    side: ContextSide,
    line: usize,
    expected: &[String],
    actual: &[&str],
    strictness: ContextStrictness,
) -> Result<(), PatchError> {
    let ok = expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual.iter())
            .all(|(want, have)| strictness.equal(want, have));

    if ok {
        return Ok(());
    }

    Err(PatchError::ContextMismatch {
        index,
        side,
        line,
        expected: expected.to_vec(),
        actual: actual.iter().map(|s| s.to_string()).collect(),
    })
}
