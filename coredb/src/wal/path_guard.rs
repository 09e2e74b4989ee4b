//! WAL path validation.
//!
//! Rejects empty paths, paths over 255 bytes, paths containing a NUL byte,
//! absolute paths (Unix `/...` or Windows drive `C:...`), and any `..`
//! component — splitting on both `/` and `\` so a Windows-style traversal
//! string is caught on Unix too.

use std::path::Path;

use crate::error::{CResult, Error};

const MAX_PATH_LEN: usize = 255;

pub fn validate_wal_path(raw: &str) -> CResult<()> {
    if raw.is_empty() {
        return Err(Error::InvalidWalPath("path is empty".to_string()));
    }
    if raw.len() > MAX_PATH_LEN {
        return Err(Error::WalPathTooLong(raw.len()));
    }
    if raw.contains('\0') {
        return Err(Error::InvalidWalPath("path contains a NUL byte".to_string()));
    }
    if is_absolute(raw) {
        return Err(Error::AbsolutePathNotAllowed(raw.to_string()));
    }
    if has_traversal_component(raw) {
        return Err(Error::PathTraversalNotAllowed(raw.to_string()));
    }
    Ok(())
}

fn is_absolute(raw: &str) -> bool {
    if raw.starts_with('/') || raw.starts_with('\\') {
        return true;
    }
    // Windows drive letter, e.g. "C:\x" or "C:/x".
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn has_traversal_component(raw: &str) -> bool {
    raw.split(['/', '\\']).any(|component| component == "..")
}

/// Fails if `path` exists and is a symlink. Mandatory on POSIX; best-effort
/// elsewhere, since `symlink_metadata` behaves uniformly across platforms
/// in std but Windows junction points are out of scope here.
pub fn reject_symlink(path: &Path) -> CResult<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(Error::SymlinkNotAllowed(path.display().to_string()))
        }
        Ok(_) | Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod path_guard_test {
    use super::*;
    use serial_test::serial;

    #[test]
    fn rejects_known_bad_paths() {
        let cases = ["/tmp", "C:\\x", "../a", "a/../b", "a\0b"];
        for case in cases {
            assert!(validate_wal_path(case).is_err(), "expected rejection for {case:?}");
        }
    }

    #[test]
    fn rejects_overlong_path() {
        let long = "a".repeat(MAX_PATH_LEN + 1);
        assert!(matches!(validate_wal_path(&long), Err(Error::WalPathTooLong(_))));
    }

    #[test]
    fn accepts_ordinary_relative_path() {
        assert!(validate_wal_path("wal/wal.000001").is_ok());
    }

    #[test]
    #[serial]
    fn rejects_symlinked_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real_file");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link).unwrap();
        #[cfg(unix)]
        assert!(reject_symlink(&link).is_err());
        assert!(reject_symlink(&target).is_ok());
    }
}
