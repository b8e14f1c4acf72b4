use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Copy `path` to a sibling `<name>.<timestamp>.bak` and return the copy's path.
///
/// Microsecond timestamps keep repeated backups of the same file distinct.
pub fn backup_file(path: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%6f");
    let mut backup_name = name.to_os_string();
    backup_name.push(format!(".{stamp}.bak"));
    let backup = path.with_file_name(backup_name);
    fs::copy(path, &backup)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_sits_next_to_original_with_same_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("issues.jsonl");
        fs::write(&log, "{\"id\":\"bd-1\"}\n").expect("write");

        let backup = backup_file(&log).expect("backup");
        assert_eq!(backup.parent(), log.parent());
        let name = backup.file_name().and_then(|n| n.to_str()).expect("utf8 name");
        assert!(name.starts_with("issues.jsonl."));
        assert!(name.ends_with(".bak"));
        assert_eq!(fs::read(&backup).expect("read"), fs::read(&log).expect("read"));
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(backup_file(&dir.path().join("absent.jsonl")).is_err());
    }
}
