//! Patch engine against real files: locator outcomes, atomicity and the
//! apply-then-invert round trip.

use hostbridge::patch::{Patch, PatchEngine, PatchError, PatchRequest};
use hostbridge::{BridgeError, ErrorKind};
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// 50-line script with exactly one `Start()` line (line 12).
fn fifty_line_script() -> String {
    let mut lines = Vec::new();
    for i in 1..=50 {
        let line = match i {
            1 => "using UnityEngine;".to_string(),
            10 => "public class Player : MonoBehaviour {".to_string(),
            12 => "    void Start()".to_string(),
            50 => "}".to_string(),
            n => format!("    // line {n}"),
        };
        lines.push(line);
    }
    lines.join("\n") + "\n"
}

fn write_script(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("Player.cs");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_single_match_is_replaced_and_previewed() {
    let dir = TempDir::new().unwrap();
    let original = fifty_line_script();
    let path = write_script(&dir, &original);

    let request = PatchRequest::new(
        "Player.cs",
        vec![Patch::search("Start()", "Start() { Init(); }")],
    );
    let outcome = PatchEngine::default().apply(&path, &request).unwrap();

    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.patches[0].start_line, 12);
    assert_eq!(outcome.patches[0].end_line, 12);
    assert_eq!(outcome.patches[0].before, vec!["    void Start()".to_string()]);
    assert_eq!(outcome.patches[0].after, vec!["Start() { Init(); }".to_string()]);

    let patched = fs::read_to_string(&path).unwrap();
    assert_eq!(patched.lines().count(), 50);
    assert_eq!(patched.lines().nth(11), Some("Start() { Init(); }"));
    assert!(outcome.diff.contains("+Start() { Init(); }"));
}

#[test]
fn test_missing_second_occurrence_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let original = fifty_line_script();
    let path = write_script(&dir, &original);

    let request = PatchRequest::new(
        "Player.cs",
        vec![Patch::search("Start()", "Start() { Init(); }").occurrence(2)],
    );
    let err = PatchEngine::default().apply(&path, &request).unwrap_err();
    assert!(matches!(err, PatchError::Locator { index: 0, .. }));
    assert_eq!(BridgeError::from(err).kind, ErrorKind::LocatorError);

    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_one_bad_patch_aborts_the_whole_list() {
    let dir = TempDir::new().unwrap();
    let original = fifty_line_script();
    let path = write_script(&dir, &original);

    let request = PatchRequest::new(
        "Player.cs",
        vec![
            Patch::lines(1, 1, "using System;"),
            Patch::search("Start()", "void Awake()").before(["    // not the line above"]),
        ],
    );
    let err = BridgeError::from(PatchEngine::default().apply(&path, &request).unwrap_err());
    assert_eq!(err.kind, ErrorKind::ContextMismatchError);
    assert_eq!(err.details["patchIndex"], 1);
    assert_eq!(err.details["side"], "before");

    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_dry_run_reports_without_writing() {
    let dir = TempDir::new().unwrap();
    let original = fifty_line_script();
    let path = write_script(&dir, &original);

    let request = PatchRequest::new(
        "Player.cs",
        vec![Patch::content("public class Player : MonoBehaviour {", "public class Hero : MonoBehaviour {")],
    )
    .dry_run();
    let outcome = PatchEngine::default().apply(&path, &request).unwrap();

    assert!(outcome.dry_run);
    assert_eq!(outcome.applied, 0);
    assert_eq!(outcome.previewed, 1);
    assert_eq!(outcome.patches[0].start_line, 10);
    assert!(outcome.diff.contains("+public class Hero"));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_crlf_and_missing_trailing_newline_survive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Win.cs");
    fs::write(&path, "a\r\nb\r\nc").unwrap();

    let request = PatchRequest::new("Win.cs", vec![Patch::lines(2, 3, "x\ny")]);
    PatchEngine::default().apply(&path, &request).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "a\r\nx\r\ny");
}

#[test]
fn test_deleting_last_line_keeps_missing_trailing_newline() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Tail.cs");
    fs::write(&path, "a\nb").unwrap();

    let request = PatchRequest::new("Tail.cs", vec![Patch::lines(2, 2, "")]);
    PatchEngine::default().apply(&path, &request).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "a");
}

fn numbered(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("line {i}")).collect()
}

/// Lines that never contain one another, so a literal search is unique.
fn tagged(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("row {i:03};")).collect()
}

/// One generated edit in 1-based inclusive line coordinates.
#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    style: u8,
    new_block: String,
}

/// Lay generated edits out top to bottom without overlap. Edits that would
/// run past the end of the file are dropped.
fn lay_out(count: usize, seeds: &[(usize, usize, u8, Vec<String>)]) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut cursor = 1;
    for (n, (gap, span, style, replacement)) in seeds.iter().enumerate() {
        let start = cursor + gap;
        // A search pattern resolves to a single line
        let span = if *style == 1 { 1 } else { *span };
        let end = start + span - 1;
        if end > count {
            break;
        }
        let new_block = replacement
            .iter()
            .enumerate()
            .map(|(i, text)| format!("new {n}-{i} {text}"))
            .collect::<Vec<_>>()
            .join("\n");
        edits.push(Edit {
            start,
            end,
            style: *style,
            new_block,
        });
        cursor = end + 1;
    }
    edits
}

fn forward_patch(edit: &Edit, lines: &[String]) -> Patch {
    match edit.style {
        0 => Patch::lines(edit.start, edit.end, edit.new_block.clone()),
        1 => Patch::search(lines[edit.start - 1].clone(), edit.new_block.clone()),
        _ => Patch::content(
            lines[edit.start - 1..edit.end].join("\n"),
            edit.new_block.clone(),
        ),
    }
}

fn edit_seeds() -> impl Strategy<Value = Vec<(usize, usize, u8, Vec<String>)>> {
    prop::collection::vec(
        (
            0usize..3,
            1usize..4,
            0u8..3,
            prop::collection::vec("[a-z ]{0,10}", 1..4),
        ),
        1..6,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Replacing a line range and then replacing the new block with the old
    /// one restores the file byte for byte.
    #[test]
    fn prop_apply_then_inverse_restores(
        count in 3usize..40,
        start_seed in 0usize..1000,
        span in 1usize..4,
        replacement in prop::collection::vec("[a-z ]{0,12}", 1..4),
    ) {
        let dir = TempDir::new().unwrap();
        let lines = numbered(count);
        let original = lines.join("\n") + "\n";
        let path = dir.path().join("Round.cs");
        fs::write(&path, &original).unwrap();

        let start = start_seed % count + 1;
        let end = (start + span - 1).min(count);
        let old_block = lines[start - 1..end].join("\n");
        let new_block = replacement
            .iter()
            .enumerate()
            .map(|(i, text)| format!("new {i} {text}"))
            .collect::<Vec<_>>()
            .join("\n");

        let engine = PatchEngine::default();
        let forward = PatchRequest::new("Round.cs", vec![Patch::lines(start, end, new_block.clone())]);
        engine.apply(&path, &forward).unwrap();

        let inverse = PatchRequest::new("Round.cs", vec![Patch::content(new_block, old_block)]);
        engine.apply(&path, &inverse).unwrap();

        prop_assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    /// Several non-overlapping patches mixing line, pattern and content
    /// locators, undone by the swapped set, restore the file byte for byte.
    #[test]
    fn prop_patch_set_then_swapped_set_restores(
        count in 6usize..40,
        terminated in any::<bool>(),
        seeds in edit_seeds(),
    ) {
        let lines = tagged(count);
        let edits = lay_out(count, &seeds);
        prop_assume!(!edits.is_empty());

        let dir = TempDir::new().unwrap();
        let mut original = lines.join("\n");
        if terminated {
            original.push('\n');
        }
        let path = dir.path().join("Many.cs");
        fs::write(&path, &original).unwrap();

        let engine = PatchEngine::default();
        let forward: Vec<Patch> = edits.iter().map(|e| forward_patch(e, &lines)).collect();
        let outcome = engine.apply(&path, &PatchRequest::new("Many.cs", forward)).unwrap();
        prop_assert_eq!(outcome.applied, edits.len());

        let inverse: Vec<Patch> = edits
            .iter()
            .map(|e| Patch::content(e.new_block.clone(), lines[e.start - 1..e.end].join("\n")))
            .collect();
        engine.apply(&path, &PatchRequest::new("Many.cs", inverse)).unwrap();

        prop_assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    /// One unresolvable or context-mismatched patch anywhere in the set
    /// leaves the file byte-identical.
    #[test]
    fn prop_one_bad_patch_leaves_file_identical(
        count in 6usize..40,
        seeds in edit_seeds(),
        victim_seed in 0usize..100,
        fault in 0u8..4,
    ) {
        let lines = tagged(count);
        let edits = lay_out(count, &seeds);
        prop_assume!(!edits.is_empty());

        let dir = TempDir::new().unwrap();
        let original = lines.join("\n") + "\n";
        let path = dir.path().join("Atomic.cs");
        fs::write(&path, &original).unwrap();

        let victim = victim_seed % edits.len();
        let mut patches: Vec<Patch> = edits.iter().map(|e| forward_patch(e, &lines)).collect();
        patches[victim] = match fault {
            0 => Patch::lines(count + 1, count + 2, "past the end"),
            1 => Patch::search("no such row", "unreachable"),
            2 => Patch::content("row 999;\nrow 998;", "unreachable"),
            _ => forward_patch(&edits[victim], &lines).before(["not the line above"]),
        };

        let err = PatchEngine::default()
            .apply(&path, &PatchRequest::new("Atomic.cs", patches))
            .unwrap_err();
        let expected_kind = if fault == 3 {
            ErrorKind::ContextMismatchError
        } else {
            ErrorKind::LocatorError
        };
        prop_assert_eq!(BridgeError::from(err).kind, expected_kind);
        prop_assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }
}
