use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// UTF-8 byte-order mark.
pub const BOM: &str = "\u{feff}";

/// Line-oriented view of a text file.
///
/// Each line keeps its own terminator so an untouched line is written back
/// byte-for-byte. The byte-order mark, if any, is stripped from the first
/// line and remembered so it can be restored on render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    bom: bool,
    lines: Vec<String>,
    newline: &'static str,
    hash: u64,
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Invalid line range: [{start}, {end}] in file of {line_count} lines")]
    InvalidLineRange {
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("Overlapping edits: lines {first_start}-{first_end} and {second_start}-{second_end}")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("File changed on disk since it was read: {0}")]
    ContentChanged(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl SourceText {
    /// Parse raw bytes, detecting a BOM and the dominant line terminator.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EditError> {
        let text = std::str::from_utf8(bytes)?;
        let (bom, body) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let lines: Vec<String> = body.split_inclusive('\n').map(str::to_string).collect();
        let crlf = lines.iter().filter(|l| l.ends_with("\r\n")).count();
        let lf = lines.iter().filter(|l| l.ends_with('\n')).count() - crlf;
        let newline = if crlf > lf { "\r\n" } else { "\n" };

        Ok(Self {
            bom,
            lines,
            newline,
            hash: xxh3_64(bytes),
        })
    }

    pub fn read(path: &Path) -> Result<Self, EditError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn has_bom(&self) -> bool {
        self.bom
    }

    pub fn newline(&self) -> &'static str {
        self.newline
    }

    /// xxh3 of the exact bytes this text was parsed from.
    pub fn original_hash(&self) -> u64 {
        self.hash
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Raw line (0-based) including its terminator.
    pub fn raw_line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Line (0-based) with its terminator removed.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.raw_line(index).map(strip_terminator)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| strip_terminator(l))
    }

    /// Render back to bytes, restoring the BOM when the original had one.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(String::len).sum::<usize>() + 3);
        if self.bom {
            out.push_str(BOM);
        }
        for line in &self.lines {
            out.push_str(line);
        }
        out
    }

    /// Render without the BOM (used for previews and diffs).
    pub fn body(&self) -> String {
        self.lines.concat()
    }

    /// Apply splices bottom-to-top so earlier offsets stay valid.
    ///
    /// All splices are range-checked and overlap-checked before any line is
    /// touched; on error `self` is unchanged.
    pub fn apply(&mut self, splices: &[LineSplice]) -> Result<(), EditError> {
        let mut ordered: Vec<&LineSplice> = splices.iter().collect();
        ordered.sort_by(|a, b| b.start.cmp(&a.start));

        for splice in &ordered {
            if splice.start > splice.end || splice.end >= self.lines.len() {
                return Err(EditError::InvalidLineRange {
                    start: splice.start + 1,
                    end: splice.end + 1,
                    line_count: self.lines.len(),
                });
            }
        }

        // Sorted descending: the earlier splice must end before the later starts
        for window in ordered.windows(2) {
            let (later, earlier) = (window[0], window[1]);
            if earlier.end >= later.start {
                return Err(EditError::Overlap {
                    first_start: earlier.start + 1,
                    first_end: earlier.end + 1,
                    second_start: later.start + 1,
                    second_end: later.end + 1,
                });
            }
        }

        for splice in ordered {
            let drops_unterminated_tail = splice.new_lines.is_empty()
                && splice.end + 1 == self.lines.len()
                && terminator(&self.lines[splice.end]).is_empty();
            let replacement = self.replacement_lines(splice);
            self.lines.splice(splice.start..=splice.end, replacement);

            // The new last line inherits the missing trailing newline
            if drops_unterminated_tail {
                if let Some(last) = self.lines.last_mut() {
                    let kept = strip_terminator(last).len();
                    last.truncate(kept);
                }
            }
        }
        Ok(())
    }

    fn replacement_lines(&self, splice: &LineSplice) -> Vec<String> {
        if splice.new_lines.is_empty() {
            return Vec::new();
        }
        let last_terminator = terminator(&self.lines[splice.end]);
        let count = splice.new_lines.len();
        splice
            .new_lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let ending = if i + 1 == count {
                    last_terminator
                } else {
                    self.newline
                };
                format!("{line}{ending}")
            })
            .collect()
    }
}

/// Replace 0-based inclusive line range `[start, end]` with `new_lines`.
///
/// An empty `new_lines` deletes the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSplice {
    pub start: usize,
    pub end: usize,
    pub new_lines: Vec<String>,
}

impl LineSplice {
    pub fn new(start: usize, end: usize, replacement: &str) -> Self {
        Self {
            start,
            end,
            new_lines: split_replacement(replacement),
        }
    }
}

/// Split replacement text into terminator-free lines.
///
/// A single trailing newline does not produce an extra empty line.
pub fn split_replacement(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let trimmed = text.strip_suffix('\n').unwrap_or(text);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    trimmed
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect()
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn terminator(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Commit `text` over `path` if the file still holds the bytes it was parsed from.
pub fn commit(path: &Path, original_hash: u64, text: &SourceText) -> Result<(), EditError> {
    let current = fs::read(path)?;
    if xxh3_64(&current) != original_hash {
        return Err(EditError::ContentChanged(path.display().to_string()));
    }

    atomic_write(path, text.render().as_bytes())?;

    // Bump mtime so the host's watcher sees a change even on coarse clocks
    let now = filetime::FileTime::now();
    filetime::set_file_mtime(path, now)?;
    Ok(())
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the original file is untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Tempfile in the same directory keeps the rename on one filesystem
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_detected_and_restored() {
        let raw = format!("{BOM}line1\nline2\n");
        let text = SourceText::from_bytes(raw.as_bytes()).unwrap();
        assert!(text.has_bom());
        assert_eq!(text.line(0), Some("line1"));
        assert_eq!(text.render(), raw);
        assert_eq!(text.body(), "line1\nline2\n");
    }

    #[test]
    fn test_crlf_dominant_newline() {
        let text = SourceText::from_bytes(b"a\r\nb\r\nc\n").unwrap();
        assert_eq!(text.newline(), "\r\n");
        assert_eq!(text.line(1), Some("b"));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let result = SourceText::from_bytes(&[0x66, 0xff, 0x0a]);
        assert!(matches!(result, Err(EditError::Utf8(_))));
    }

    #[test]
    fn test_splices_apply_bottom_to_top() {
        let mut text = SourceText::from_bytes(b"one\ntwo\nthree\nfour\n").unwrap();
        text.apply(&[
            LineSplice::new(0, 0, "ONE\nONE-B"),
            LineSplice::new(2, 3, "TAIL"),
        ])
        .unwrap();
        assert_eq!(text.render(), "ONE\nONE-B\ntwo\nTAIL\n");
    }

    #[test]
    fn test_overlap_rejected_without_mutation() {
        let mut text = SourceText::from_bytes(b"a\nb\nc\n").unwrap();
        let before = text.clone();
        let result = text.apply(&[LineSplice::new(0, 1, "x"), LineSplice::new(1, 2, "y")]);
        assert!(matches!(result, Err(EditError::Overlap { .. })));
        assert_eq!(text, before);
    }

    #[test]
    fn test_last_line_without_newline_keeps_shape() {
        let mut text = SourceText::from_bytes(b"a\nb").unwrap();
        text.apply(&[LineSplice::new(1, 1, "B1\nB2")]).unwrap();
        assert_eq!(text.render(), "a\nB1\nB2");
    }

    #[test]
    fn test_empty_replacement_deletes() {
        let mut text = SourceText::from_bytes(b"a\nb\nc\n").unwrap();
        text.apply(&[LineSplice::new(1, 1, "")]).unwrap();
        assert_eq!(text.render(), "a\nc\n");
    }

    #[test]
    fn test_deleting_unterminated_last_line_adds_no_newline() {
        let mut text = SourceText::from_bytes(b"a\nb").unwrap();
        text.apply(&[LineSplice::new(1, 1, "")]).unwrap();
        assert_eq!(text.render(), "a");

        let mut text = SourceText::from_bytes(b"a\r\nb\r\nc").unwrap();
        text.apply(&[LineSplice::new(0, 0, "A"), LineSplice::new(1, 2, "")])
            .unwrap();
        assert_eq!(text.render(), "A");

        // A terminated file keeps its trailing newline
        let mut text = SourceText::from_bytes(b"a\nb\n").unwrap();
        text.apply(&[LineSplice::new(1, 1, "")]).unwrap();
        assert_eq!(text.render(), "a\n");
    }

    #[test]
    fn test_commit_detects_concurrent_change() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, b"original\n").unwrap();

        let mut text = SourceText::read(&file_path).unwrap();
        let hash = text.original_hash();
        text.apply(&[LineSplice::new(0, 0, "patched")]).unwrap();

        fs::write(&file_path, b"someone else\n").unwrap();
        let result = commit(&file_path, hash, &text);
        assert!(matches!(result, Err(EditError::ContentChanged(_))));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "someone else\n");
    }

    #[test]
    fn test_atomic_write_integration() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, b"original content").unwrap();

        atomic_write(&file_path, b"modified content").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }
}
