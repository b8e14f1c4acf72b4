//! Merge-conflict markers in the JSONL log.
//!
//! The log is append-only, so a conflict block is two lists of records that
//! were appended independently. Resolution picks lines; it never merges
//! records. Duplicate ids left behind are collapsed by the engine's
//! last-write-wins import.

use beadmem_bd::Issue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const OURS_MARKER: &str = "<<<<<<<";
const BASE_MARKER: &str = "|||||||";
const SPLIT_MARKER: &str = "=======";
const THEIRS_MARKER: &str = ">>>>>>>";

/// One conflict block, with 1-based line numbers of its outer markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub start_line: usize,
    pub end_line: usize,
    pub ours_label: String,
    pub theirs_label: String,
    pub ours: Vec<String>,
    pub theirs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed conflict markers at line {line}: {reason}")]
pub struct MalformedConflict {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Both sides, ours first.
    #[default]
    Concatenate,
    Ours,
    Theirs,
    /// The side holding the most recently updated record.
    Newest,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictStrategy::Concatenate => "concatenate",
            ConflictStrategy::Ours => "ours",
            ConflictStrategy::Theirs => "theirs",
            ConflictStrategy::Newest => "newest",
        })
    }
}

enum Segment<'a> {
    Clean(&'a str),
    Conflict(ConflictInfo),
}

enum Side {
    Ours,
    Base,
    Theirs,
}

fn marker_label<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.strip_prefix(marker).map(str::trim)
}

fn split(text: &str) -> Result<Vec<Segment<'_>>, MalformedConflict> {
    let mut segments = Vec::new();
    let mut open: Option<(ConflictInfo, Side)> = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let malformed = |reason: &str| MalformedConflict {
            line: line_no,
            reason: reason.to_string(),
        };

        match open.as_mut() {
            None => {
                if let Some(label) = marker_label(line, OURS_MARKER) {
                    let info = ConflictInfo {
                        start_line: line_no,
                        end_line: line_no,
                        ours_label: label.to_string(),
                        theirs_label: String::new(),
                        ours: Vec::new(),
                        theirs: Vec::new(),
                    };
                    open = Some((info, Side::Ours));
                } else if line.starts_with(SPLIT_MARKER) || line.starts_with(THEIRS_MARKER) {
                    return Err(malformed("marker outside a conflict block"));
                } else {
                    segments.push(Segment::Clean(line));
                }
            }
            Some((info, side)) => {
                if line.starts_with(OURS_MARKER) {
                    return Err(malformed("nested conflict block"));
                }
                match side {
                    Side::Ours | Side::Base if line.starts_with(BASE_MARKER) => {
                        *side = Side::Base;
                    }
                    Side::Ours | Side::Base if line.starts_with(SPLIT_MARKER) => {
                        *side = Side::Theirs;
                    }
                    Side::Ours => info.ours.push(line.to_string()),
                    Side::Base => {}
                    Side::Theirs => {
                        if let Some(label) = marker_label(line, THEIRS_MARKER) {
                            info.theirs_label = label.to_string();
                            info.end_line = line_no;
                            if let Some((info, _)) = open.take() {
                                segments.push(Segment::Conflict(info));
                            }
                        } else if line.starts_with(SPLIT_MARKER) {
                            return Err(malformed("second separator in one block"));
                        } else {
                            info.theirs.push(line.to_string());
                        }
                    }
                }
            }
        }
    }

    if let Some((info, _)) = open {
        return Err(MalformedConflict {
            line: info.start_line,
            reason: "conflict block is never closed".to_string(),
        });
    }
    Ok(segments)
}

/// Every conflict block in `text`.
pub fn detect_conflicts(text: &str) -> Result<Vec<ConflictInfo>, MalformedConflict> {
    Ok(split(text)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Conflict(info) => Some(info),
            Segment::Clean(_) => None,
        })
        .collect())
}

/// Rewrite `text` with every block replaced by the lines `strategy` keeps.
/// Blank lines are dropped; the result ends with a newline unless empty.
pub fn resolve(text: &str, strategy: ConflictStrategy) -> Result<String, MalformedConflict> {
    let mut lines: Vec<String> = Vec::new();
    for segment in split(text)? {
        match segment {
            Segment::Clean(line) => lines.push(line.to_string()),
            Segment::Conflict(info) => lines.extend(pick(info, strategy)),
        }
    }
    lines.retain(|line| !line.trim().is_empty());
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

fn pick(info: ConflictInfo, strategy: ConflictStrategy) -> Vec<String> {
    let concatenate = |info: ConflictInfo| {
        let mut lines = info.ours;
        lines.extend(info.theirs);
        lines
    };
    match strategy {
        ConflictStrategy::Concatenate => concatenate(info),
        ConflictStrategy::Ours => info.ours,
        ConflictStrategy::Theirs => info.theirs,
        ConflictStrategy::Newest => match (newest(&info.ours), newest(&info.theirs)) {
            (Some(ours), Some(theirs)) if ours > theirs => info.ours,
            (Some(ours), Some(theirs)) if theirs > ours => info.theirs,
            _ => concatenate(info),
        },
    }
}

/// Latest `updated_at` on one side; `None` if any line is not a record.
fn newest(lines: &[String]) -> Option<DateTime<Utc>> {
    let mut latest = None;
    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let issue: Issue = serde_json::from_str(line).ok()?;
        latest = latest.max(Some(issue.updated_at));
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
{\"id\":\"bd-1\",\"title\":\"base\",\"updated_at\":\"2026-01-01T00:00:00Z\"}
<<<<<<< HEAD
{\"id\":\"bd-2\",\"title\":\"ours\",\"updated_at\":\"2026-01-03T00:00:00Z\"}
=======
{\"id\":\"bd-3\",\"title\":\"theirs\",\"updated_at\":\"2026-01-02T00:00:00Z\"}
{\"id\":\"bd-4\",\"title\":\"theirs too\",\"updated_at\":\"2026-01-02T00:00:00Z\"}
>>>>>>> origin/main
{\"id\":\"bd-5\",\"title\":\"tail\",\"updated_at\":\"2026-01-01T00:00:00Z\"}
";

    fn ids(text: &str) -> Vec<String> {
        text.lines()
            .map(|line| {
                let issue: Issue = serde_json::from_str(line).expect("record");
                issue.id
            })
            .collect()
    }

    #[test]
    fn detects_block_with_labels_and_lines() {
        let conflicts = detect_conflicts(LOG).expect("well formed");
        assert_eq!(conflicts.len(), 1);
        let block = &conflicts[0];
        assert_eq!(block.start_line, 2);
        assert_eq!(block.end_line, 7);
        assert_eq!(block.ours_label, "HEAD");
        assert_eq!(block.theirs_label, "origin/main");
        assert_eq!(block.ours.len(), 1);
        assert_eq!(block.theirs.len(), 2);
    }

    #[test]
    fn clean_log_has_no_conflicts() {
        assert!(detect_conflicts("{\"id\":\"bd-1\"}\n").expect("ok").is_empty());
        assert!(detect_conflicts("").expect("ok").is_empty());
    }

    #[test]
    fn strategies_pick_expected_sides() {
        let cases = [
            (
                ConflictStrategy::Concatenate,
                vec!["bd-1", "bd-2", "bd-3", "bd-4", "bd-5"],
            ),
            (ConflictStrategy::Ours, vec!["bd-1", "bd-2", "bd-5"]),
            (ConflictStrategy::Theirs, vec!["bd-1", "bd-3", "bd-4", "bd-5"]),
            (ConflictStrategy::Newest, vec!["bd-1", "bd-2", "bd-5"]),
        ];
        for (strategy, expected) in cases {
            let resolved = resolve(LOG, strategy).expect("resolve");
            assert_eq!(ids(&resolved), expected, "{strategy}");
            assert!(detect_conflicts(&resolved).expect("ok").is_empty());
        }
    }

    #[test]
    fn newest_falls_back_to_concatenate_on_garbage() {
        let text = "<<<<<<< a\nnot json\n=======\n{\"id\":\"bd-9\",\"title\":\"t\"}\n>>>>>>> b\n";
        let resolved = resolve(text, ConflictStrategy::Newest).expect("resolve");
        assert_eq!(resolved, "not json\n{\"id\":\"bd-9\",\"title\":\"t\"}\n");
    }

    #[test]
    fn diff3_base_section_is_discarded() {
        let text = "<<<<<<< ours\nA\n||||||| base\nB\n=======\nC\n>>>>>>> theirs\n";
        let block = &detect_conflicts(text).expect("ok")[0];
        assert_eq!(block.ours, vec!["A".to_string()]);
        assert_eq!(block.theirs, vec!["C".to_string()]);
    }

    #[test]
    fn malformed_blocks_are_rejected() {
        let unclosed = "<<<<<<< HEAD\nA\n=======\nB\n";
        assert_eq!(detect_conflicts(unclosed).expect_err("unclosed").line, 1);

        let nested = "<<<<<<< HEAD\n<<<<<<< again\n";
        assert_eq!(detect_conflicts(nested).expect_err("nested").line, 2);

        let stray = "A\n>>>>>>> theirs\n";
        assert_eq!(detect_conflicts(stray).expect_err("stray").line, 2);
    }

    #[test]
    fn strategy_names_deserialize_lowercase() {
        let parsed: ConflictStrategy = serde_json::from_str("\"newest\"").expect("parse");
        assert_eq!(parsed, ConflictStrategy::Newest);
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::Concatenate);
    }
}
