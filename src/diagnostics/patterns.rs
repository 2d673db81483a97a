//! Line-oriented patterns for the compiler message shapes seen in logs.
//!
//! ```text
//! Assets/A.cs(10,5): error CS1002: ; expected
//! Assets/A.cs(10): warning CS0168: variable declared but never used
//! Assets/A.cs:10:5: error CS1002: ; expected
//! Assets/A.cs:10: error[E1002]: ; expected
//! error CS5001: Program does not contain a static 'Main' method
//! ```

use regex::Captures;

use crate::cache;
use crate::diagnostics::record::{DiagnosticRecord, Severity};

const PAREN_FORM: &str = r"^\s*(?P<file>[^()\r\n]+?)\((?P<line>\d+)(?:,\s*(?P<col>\d+))?\)\s*:\s*(?P<sev>(?i:error|warning|info))(?:\s+(?P<code>[A-Za-z]{1,8}\d+))?\s*:\s*(?P<msg>.+)$";

const COLON_FORM: &str = r"^\s*(?P<file>(?:[A-Za-z]:)?[^:\r\n]+):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<sev>(?i:error|warning|info))(?:\s*\[?(?P<code>[A-Za-z]{1,8}\d+)\]?)?\s*:\s*(?P<msg>.+)$";

const BARE_FORM: &str = r"^\s*(?P<sev>(?i:error|warning))\s+(?P<code>[A-Za-z]{1,8}\d+)\s*:\s*(?P<msg>.+)$";

const FAMILY: [&str; 3] = [PAREN_FORM, COLON_FORM, BARE_FORM];

/// Parse one log line; the first matching shape wins.
pub fn parse_line(line: &str, source: &str) -> Option<DiagnosticRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    for pattern in FAMILY {
        let re = match cache::get_or_compile(pattern, false) {
            Ok(re) => re,
            Err(e) => {
                tracing::error!(target: "diagnostics", "bad diagnostic pattern: {e}");
                continue;
            }
        };
        if let Some(caps) = re.captures(line) {
            if let Some(record) = to_record(&caps, source) {
                return Some(record);
            }
        }
    }
    None
}

/// Parse every line of `text`, in order.
pub fn parse_text(text: &str, source: &str) -> Vec<DiagnosticRecord> {
    text.lines().filter_map(|l| parse_line(l, source)).collect()
}

fn to_record(caps: &Captures<'_>, source: &str) -> Option<DiagnosticRecord> {
    let severity: Severity = caps.name("sev")?.as_str().parse().ok()?;
    let file = caps.name("file").map(|m| m.as_str()).unwrap_or("");
    let line = match caps.name("line") {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let column = caps.name("col").and_then(|m| m.as_str().parse().ok());
    let code = caps.name("code").map(|m| m.as_str());
    let message = caps.name("msg")?.as_str();

    Some(DiagnosticRecord::new(
        file, line, column, code, message, severity, source,
    ))
}
