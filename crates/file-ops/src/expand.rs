//! Expansion of an operator-supplied path into individual files.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::{FileOpsError, SkippedEntry, walk_error_entry};

/// Files found under a path, plus what the walk could not read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Non-directory entries in walk order.
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
}

/// Resolves `path` into the files to enqueue.
///
/// A file yields itself. A directory yields every non-directory entry
/// beneath it, depth-first and sorted by name; symlinks are not followed
/// and are listed as-is. Unreadable entries are logged and skipped.
pub fn expand_path(path: &Path) -> Result<Expansion, FileOpsError> {
    let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FileOpsError::NotFound(path.to_path_buf()),
        _ => FileOpsError::Io(e),
    })?;

    if !meta.is_dir() {
        return Ok(Expansion {
            files: vec![path.to_path_buf()],
            skipped: Vec::new(),
        });
    }

    let mut expansion = Expansion::default();
    for entry in WalkDir::new(path).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {}
            Ok(entry) => expansion.files.push(entry.into_path()),
            Err(e) => {
                let skipped = walk_error_entry(path, &e);
                warn!(path = %skipped.path.display(), "error walking path: {e}");
                expansion.skipped.push(skipped);
            }
        }
    }

    Ok(expansion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn single_file_expands_to_itself() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("movie.mkv");
        std::fs::write(&file, b"frames").unwrap();

        let exp = expand_path(&file).unwrap();
        assert_eq!(exp.files, vec![file]);
        assert!(exp.skipped.is_empty());
    }

    #[test]
    fn directory_expands_to_sorted_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        std::fs::create_dir_all(base.join("sub/deeper")).unwrap();
        std::fs::write(base.join("z.txt"), b"z").unwrap();
        std::fs::write(base.join("a.txt"), b"a").unwrap();
        std::fs::write(base.join("sub/b.txt"), b"b").unwrap();
        std::fs::write(base.join("sub/deeper/c.txt"), b"c").unwrap();

        let exp = expand_path(base).unwrap();
        let rel: Vec<_> = exp
            .files
            .iter()
            .map(|p| p.strip_prefix(base).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rel, ["a.txt", "sub/b.txt", "sub/deeper/c.txt", "z.txt"]);
    }

    #[test]
    fn empty_directory_expands_to_nothing() {
        let dir = TempDir::new().unwrap();
        let exp = expand_path(dir.path()).unwrap();
        assert!(exp.files.is_empty());
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = expand_path(&dir.path().join("ghost"));
        assert!(matches!(result, Err(FileOpsError::NotFound(_))));
    }
}
