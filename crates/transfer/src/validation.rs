//! Confinement of client-supplied upload names.

use std::path::{Component, Path};

use crate::TransferError;

/// Checks a name taken from an upload form (`filename`, `relativePath`, or
/// the `webkitRelativePath` a browser directory picker fills in) before it
/// is joined onto the upload root.
///
/// The name must be relative and may only descend. `..` segments, a leading
/// `/`, drive or UNC prefixes and NUL bytes are refused. Backslashes count as
/// separators when looking for `..`, since Windows browsers send them.
pub fn validate_upload_path(name: &str) -> Result<(), TransferError> {
    let reject = |why: &str| Err(TransferError::InvalidPath(format!("{why}: {name}")));

    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }
    if name.contains('\0') {
        return reject("NUL byte in path");
    }
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return reject("parent directory traversal not allowed");
    }

    let path = Path::new(name);
    if path.has_root() || matches!(path.components().next(), Some(Component::Prefix(_))) {
        return reject("rooted path not allowed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(validate_upload_path("").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_upload_path("..").is_err());
        assert!(validate_upload_path("../secret.txt").is_err());
        assert!(validate_upload_path("photos/../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_absolute() {
        assert!(validate_upload_path("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_backslash_traversal() {
        assert!(validate_upload_path("..\\..\\evil.sh").is_err());
        assert!(validate_upload_path("photos\\..\\..\\evil.sh").is_err());
    }

    #[test]
    fn rejects_nul_byte() {
        assert!(matches!(
            validate_upload_path("a\0b.txt"),
            Err(TransferError::InvalidPath(_))
        ));
    }

    #[test]
    fn dots_inside_names_are_fine() {
        assert!(validate_upload_path("archive..tar").is_ok());
        assert!(validate_upload_path("v1.../x").is_ok());
    }

    #[test]
    fn accepts_browser_relative_paths() {
        // webkitRelativePath values sent by directory pickers.
        assert!(validate_upload_path("holiday/day1/beach.jpg").is_ok());
        assert!(validate_upload_path("notes.txt").is_ok());
        assert!(validate_upload_path("./notes.txt").is_ok());
        assert!(validate_upload_path(".hidden/config").is_ok());
    }
}
