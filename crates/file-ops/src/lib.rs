//! Filesystem walks behind webshare downloads.
//!
//! - [`expand_path`] turns a file or directory root into the list of regular
//!   files to enqueue, one download each.
//! - [`archive_directory`] serializes a directory tree into a tar stream,
//!   one file's bytes at a time, and reports which entries were skipped.

mod archive;
mod expand;

use std::path::{Path, PathBuf};

pub use archive::{ArchiveReport, ArchivedEntry, EntryKind, EntryOutcome, archive_directory};
pub use expand::{Expansion, expand_path};

/// Media type of the archives produced by [`archive_directory`].
pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-tar";

/// File extension appended to a directory name to name its archive.
pub const ARCHIVE_EXTENSION: &str = "tar";

/// Errors produced by filesystem walks.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// An entry the walk could not include, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedEntry {
    fn new(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Maps a walk error to the path it concerns (falling back to `root`).
fn walk_error_entry(root: &Path, err: &walkdir::Error) -> SkippedEntry {
    let path = err.path().unwrap_or(root);
    SkippedEntry::new(path, err)
}
