//! JSONL storage: one line per issue.
//!
//! The append-only log the engine writes and git versions. The sync
//! coordinator rebuilds an index from it after a pull and rewrites it only
//! to resolve merge conflicts.

use crate::issue::Issue;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, Write};
use std::path::Path;
use tempfile::NamedTempFile;

fn io_error(path: &Path, err: std::io::Error) -> JsonlError {
    JsonlError::Io(0, format!("{}: {err}", path.display()))
}

fn encode_line(issue: &Issue) -> Result<String, JsonlError> {
    let mut line =
        serde_json::to_string(issue).map_err(|e| JsonlError::Serialize(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Records from `reader`. Blank lines and `#` comments are skipped; errors
/// carry the 1-based line number.
pub fn read_issues(reader: impl BufRead) -> Result<Vec<Issue>, JsonlError> {
    let mut issues = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| JsonlError::Io(line_no, e.to_string()))?;
        let record = line.trim();
        if record.is_empty() || record.starts_with('#') {
            continue;
        }
        issues.push(
            serde_json::from_str(record).map_err(|e| JsonlError::Parse(line_no, e.to_string()))?,
        );
    }
    Ok(issues)
}

pub fn write_issues(writer: &mut impl Write, issues: &[Issue]) -> Result<(), JsonlError> {
    for issue in issues {
        writer
            .write_all(encode_line(issue)?.as_bytes())
            .map_err(|e| JsonlError::Io(0, e.to_string()))?;
    }
    Ok(())
}

/// Read a whole log, refusing NUL bytes and invalid UTF-8 before parsing.
pub fn read_issues_from_path(path: impl AsRef<Path>) -> Result<Vec<Issue>, JsonlError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let text = checked_text(path, &bytes)?;
    read_issues(text.as_bytes())
}

/// Replace the file at `path` with `issues`, one per line.
pub fn write_issues_to_path(path: impl AsRef<Path>, issues: &[Issue]) -> Result<(), JsonlError> {
    let mut buffer = Vec::new();
    write_issues(&mut buffer, issues)?;
    write_bytes_atomic(path, &buffer)
}

/// Append one record to the end of the log and sync it.
pub fn append_issue_to_path(path: impl AsRef<Path>, issue: &Issue) -> Result<(), JsonlError> {
    let path = path.as_ref();
    create_parent(path)?;
    let line = encode_line(issue)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_error(path, e))?;
    file.write_all(line.as_bytes())
        .and_then(|()| file.sync_data())
        .map_err(|e| io_error(path, e))
}

/// Write `bytes` to a temp file beside `path`, sync it, then rename over
/// `path`. Readers see the old file or the new one, never a prefix.
pub fn write_bytes_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), JsonlError> {
    let path = path.as_ref();
    let dir = create_parent(path)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

/// Create the parent directory of `path` and return it (`.` when bare).
fn create_parent(path: &Path) -> Result<&Path, JsonlError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            Ok(parent)
        }
        None => Ok(Path::new(".")),
    }
}

fn checked_text<'a>(path: &Path, bytes: &'a [u8]) -> Result<&'a str, JsonlError> {
    if bytes.contains(&0) {
        return Err(JsonlError::Corrupt(format!("{}: NUL byte in log", path.display())));
    }
    std::str::from_utf8(bytes)
        .map_err(|_| JsonlError::Corrupt(format!("{}: log is not valid UTF-8", path.display())))
}

/// Errors from JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("line {0}: I/O error: {1}")]
    Io(usize, String),

    #[error("line {0}: parse error: {1}")]
    Parse(usize, String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupted log: {0}")]
    Corrupt(String),
}
