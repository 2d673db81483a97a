//! Locator resolution: which lines does a patch apply to?
//!
//! Resolution happens against the unmodified file for every patch of a call
//! before anything is spliced, so all line numbers here are original-file
//! coordinates.

use regex::Regex;

use crate::cache;
use crate::edit::SourceText;
use crate::patch::errors::{LocatorError, NearMatch};
use crate::patch::schema::{LocatorKind, MatchMode, Patch};

/// Minimum normalized similarity for a near-match hint.
const NEAR_MATCH_THRESHOLD: f64 = 0.5;

/// 0-based inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: usize,
    pub end: usize,
    pub kind: LocatorKind,
}

pub fn resolve(patch: &Patch, text: &SourceText) -> Result<ResolvedRange, LocatorError> {
    if let Some(start) = patch.start_line {
        return resolve_lines(start, patch.end_line.unwrap_or(start), text);
    }
    if let Some(pattern) = &patch.search_pattern {
        return resolve_pattern(pattern, patch, text);
    }
    if let Some(block) = &patch.original_content {
        return resolve_content(block, patch, text);
    }
    Err(LocatorError::MissingLocator)
}

fn resolve_lines(start: usize, end: usize, text: &SourceText) -> Result<ResolvedRange, LocatorError> {
    let line_count = text.line_count();
    if start == 0 || end < start || end > line_count {
        return Err(LocatorError::OutOfRange {
            start,
            end,
            line_count,
        });
    }
    Ok(ResolvedRange {
        start: start - 1,
        end: end - 1,
        kind: LocatorKind::Lines,
    })
}

enum LineMatcher {
    Substring(String),
    Folded(String),
    Regex(Regex),
}

impl LineMatcher {
    fn new(pattern: &str, mode: MatchMode) -> Result<Self, LocatorError> {
        Ok(match mode {
            MatchMode::Exact => LineMatcher::Substring(pattern.to_string()),
            MatchMode::CaseInsensitive => LineMatcher::Folded(pattern.to_lowercase()),
            MatchMode::Regex => {
                let re = cache::get_or_compile(pattern, false).map_err(|e| {
                    LocatorError::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    }
                })?;
                LineMatcher::Regex(re)
            }
        })
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            LineMatcher::Substring(needle) => line.contains(needle.as_str()),
            LineMatcher::Folded(needle) => line.to_lowercase().contains(needle.as_str()),
            LineMatcher::Regex(re) => re.is_match(line),
        }
    }
}

fn resolve_pattern(
    pattern: &str,
    patch: &Patch,
    text: &SourceText,
) -> Result<ResolvedRange, LocatorError> {
    let occurrence = occurrence(patch)?;
    let matcher = LineMatcher::new(pattern, patch.match_mode)?;

    let hits: Vec<usize> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| matcher.matches(line))
        .map(|(i, _)| i)
        .collect();

    if patch.require_unique && hits.len() > 1 {
        return Err(LocatorError::Ambiguous {
            what: format!("pattern '{pattern}'"),
            count: hits.len(),
        });
    }

    match hits.get(occurrence - 1) {
        Some(&line) => Ok(ResolvedRange {
            start: line,
            end: line,
            kind: LocatorKind::Pattern,
        }),
        None => Err(LocatorError::PatternNotFound {
            pattern: pattern.to_string(),
            occurrence,
            found: hits.len(),
            near: if hits.is_empty() {
                near_match(text, pattern)
            } else {
                None
            },
        }),
    }
}

fn resolve_content(
    block: &str,
    patch: &Patch,
    text: &SourceText,
) -> Result<ResolvedRange, LocatorError> {
    let occurrence = occurrence(patch)?;
    let wanted = block_lines(block);
    if wanted.is_empty() {
        return Err(LocatorError::EmptyContent);
    }

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let hits: Vec<usize> = if lines.len() < wanted.len() {
        Vec::new()
    } else {
        (0..=lines.len() - wanted.len())
            .filter(|&start| {
                wanted
                    .iter()
                    .enumerate()
                    .all(|(offset, want)| lines[start + offset] == *want)
            })
            .collect()
    };

    if patch.require_unique && hits.len() > 1 {
        return Err(LocatorError::Ambiguous {
            what: "content block".to_string(),
            count: hits.len(),
        });
    }

    match hits.get(occurrence - 1) {
        Some(&start) => Ok(ResolvedRange {
            start,
            end: start + wanted.len() - 1,
            kind: LocatorKind::Content,
        }),
        None => Err(LocatorError::ContentNotFound {
            occurrence,
            found: hits.len(),
            near: if hits.is_empty() {
                near_match(text, wanted[0])
            } else {
                None
            },
        }),
    }
}

/// Trimmed block lines with leading/trailing blank lines dropped.
fn block_lines(block: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = block.lines().map(str::trim).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.is_empty()).count();
    lines.drain(..leading);
    lines
}

fn occurrence(patch: &Patch) -> Result<usize, LocatorError> {
    match patch.occurrence {
        Some(0) => Err(LocatorError::InvalidOccurrence),
        Some(n) => Ok(n),
        None => Ok(1),
    }
}

fn near_match(text: &SourceText, needle: &str) -> Option<NearMatch> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let similarity = strsim::normalized_levenshtein(line.trim(), needle);
            (i, line, similarity)
        })
        .filter(|(_, _, similarity)| *similarity >= NEAR_MATCH_THRESHOLD)
        .max_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(i, line, similarity)| NearMatch {
            line: i + 1,
            text: line.to_string(),
            similarity,
        })
}
