use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use super::{DiagnosticSource, SourceError};
use crate::diagnostics::patterns;
use crate::diagnostics::record::DiagnosticRecord;

/// Bytes read from the end of the log before splitting into lines.
const TAIL_BYTES: u64 = 4 * 1024 * 1024;

/// Tail of the host's persistent session log.
///
/// Only lines inside the most recent begin/end compiler-output bracket are
/// parsed. A bracket still open at the end of the window counts.
pub struct SessionLogSource {
    path: PathBuf,
    tail_lines: usize,
    begin_marker: String,
    end_marker: String,
}

impl SessionLogSource {
    pub fn new(path: impl Into<PathBuf>, tail_lines: usize, begin_marker: String, end_marker: String) -> Self {
        Self {
            path: path.into(),
            tail_lines,
            begin_marker,
            end_marker,
        }
    }

    fn read_tail(&self) -> io::Result<String> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let start = len.saturating_sub(TAIL_BYTES);
        file.seek(SeekFrom::Start(start))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if start > 0 {
            // first line is almost certainly partial
            match text.find('\n') {
                Some(nl) => {
                    text.drain(..=nl);
                }
                None => text.clear(),
            }
        }
        Ok(text)
    }

    /// Lines of the last bracket within the final `tail_lines` lines.
    fn bracket<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let lines: Vec<&str> = text.lines().collect();
        let window = &lines[lines.len().saturating_sub(self.tail_lines)..];

        let Some(begin) = window
            .iter()
            .rposition(|l| l.contains(self.begin_marker.as_str()))
        else {
            return Vec::new();
        };

        window[begin + 1..]
            .iter()
            .take_while(|l| !l.contains(self.end_marker.as_str()))
            .copied()
            .collect()
    }
}

impl DiagnosticSource for SessionLogSource {
    fn name(&self) -> &'static str {
        "session-log"
    }

    fn collect(&self) -> Result<Vec<DiagnosticRecord>, SourceError> {
        let text = match self.read_tail() {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SourceError::io(&self.path, e)),
        };

        Ok(self
            .bracket(&text)
            .into_iter()
            .filter_map(|line| patterns::parse_line(line, self.name()))
            .collect())
    }
}

/// The host's per-user session log location on this platform.
pub fn default_session_log() -> Option<PathBuf> {
    let home = home::home_dir()?;
    let path = if cfg!(target_os = "macos") {
        home.join("Library/Logs/Unity/Editor.log")
    } else if cfg!(target_os = "windows") {
        home.join("AppData/Local/Unity/Editor/Editor.log")
    } else {
        home.join(".config/unity3d/Editor.log")
    };
    Some(path)
}
