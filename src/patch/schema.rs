use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// How a search pattern is matched against each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Substring match
    #[default]
    Exact,
    /// Substring match after Unicode lowercasing both sides
    CaseInsensitive,
    /// `regex` crate syntax, evaluated per line
    Regex,
}

/// How strictly context lines are compared with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextStrictness {
    /// Byte-equal apart from the line terminator
    Exact,
    /// Leading and trailing whitespace ignored
    #[default]
    Trimmed,
    /// All whitespace ignored
    WhitespaceInsensitive,
}

impl ContextStrictness {
    pub fn normalize<'a>(&self, line: &'a str) -> Cow<'a, str> {
        match self {
            ContextStrictness::Exact => Cow::Borrowed(line),
            ContextStrictness::Trimmed => Cow::Borrowed(line.trim()),
            ContextStrictness::WhitespaceInsensitive => {
                Cow::Owned(line.chars().filter(|c| !c.is_whitespace()).collect())
            }
        }
    }

    pub fn equal(&self, expected: &str, actual: &str) -> bool {
        self.normalize(expected) == self.normalize(actual)
    }
}

/// One localized edit.
///
/// Locator priority: explicit `startLine`/`endLine`, then `searchPattern`,
/// then `originalContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Patch {
    /// 1-based, inclusive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    /// 1-based, inclusive; defaults to `start_line`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_pattern: Option<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
    /// 1-based ordinal of the match to use; defaults to the first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<usize>,
    /// Verbatim multi-line block, compared line by line after trimming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    /// Fail instead of picking the first of several matches
    #[serde(default)]
    pub require_unique: bool,
    #[serde(default)]
    pub context_before: Vec<String>,
    #[serde(default)]
    pub context_after: Vec<String>,
    /// Replaces every line of the resolved range; empty deletes it
    pub new_content: String,
}

impl Patch {
    fn empty(new_content: impl Into<String>) -> Self {
        Self {
            start_line: None,
            end_line: None,
            search_pattern: None,
            match_mode: MatchMode::Exact,
            occurrence: None,
            original_content: None,
            require_unique: false,
            context_before: Vec::new(),
            context_after: Vec::new(),
            new_content: new_content.into(),
        }
    }

    pub fn lines(start: usize, end: usize, new_content: impl Into<String>) -> Self {
        Self {
            start_line: Some(start),
            end_line: Some(end),
            ..Self::empty(new_content)
        }
    }

    pub fn search(pattern: impl Into<String>, new_content: impl Into<String>) -> Self {
        Self {
            search_pattern: Some(pattern.into()),
            ..Self::empty(new_content)
        }
    }

    pub fn content(block: impl Into<String>, new_content: impl Into<String>) -> Self {
        Self {
            original_content: Some(block.into()),
            ..Self::empty(new_content)
        }
    }

    #[must_use]
    pub fn occurrence(mut self, n: usize) -> Self {
        self.occurrence = Some(n);
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.require_unique = true;
        self
    }

    #[must_use]
    pub fn before<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.context_before = lines.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn after<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.context_after = lines.into_iter().map(Into::into).collect();
        self
    }
}

fn default_true() -> bool {
    true
}

/// `script/applyDiff` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatchRequest {
    pub path: String,
    pub patches: Vec<Patch>,
    #[serde(default = "default_true")]
    pub validate_context: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Overrides the configured strictness for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_strictness: Option<ContextStrictness>,
}

impl PatchRequest {
    pub fn new(path: impl Into<String>, patches: Vec<Patch>) -> Self {
        Self {
            path: path.into(),
            patches,
            validate_context: true,
            dry_run: false,
            context_strictness: None,
        }
    }

    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Which locator resolved a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    Lines,
    Pattern,
    Content,
}

/// Per-patch resolved location and preview, in original-file line numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub index: usize,
    pub locator: LocatorKind,
    pub start_line: usize,
    pub end_line: usize,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    pub path: String,
    pub dry_run: bool,
    pub applied: usize,
    pub previewed: usize,
    pub patches: Vec<PatchReport>,
    /// Unified diff of the whole change
    pub diff: String,
}
