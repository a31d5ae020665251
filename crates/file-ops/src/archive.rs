//! Streaming tar serialization of a directory tree.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path};

use tar::{Builder, Header};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{FileOpsError, SkippedEntry, walk_error_entry};

/// Kind of an archived entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// An entry written to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEntry {
    /// Path relative to the archive root, `/`-separated.
    pub relative_path: String,
    pub kind: EntryKind,
    /// Payload size (0 for directories).
    pub size: u64,
}

/// Per-entry result of an archive walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Archived(ArchivedEntry),
    Skipped(SkippedEntry),
}

/// Everything the walk visited, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub outcomes: Vec<EntryOutcome>,
}

impl ArchiveReport {
    /// Entries that made it into the archive.
    pub fn archived(&self) -> impl Iterator<Item = &ArchivedEntry> {
        self.outcomes.iter().filter_map(|o| match o {
            EntryOutcome::Archived(e) => Some(e),
            EntryOutcome::Skipped(_) => None,
        })
    }

    /// Entries left out, with reasons.
    pub fn skipped(&self) -> impl Iterator<Item = &SkippedEntry> {
        self.outcomes.iter().filter_map(|o| match o {
            EntryOutcome::Skipped(s) => Some(s),
            EntryOutcome::Archived(_) => None,
        })
    }

    /// Total payload bytes written.
    pub fn total_bytes(&self) -> u64 {
        self.archived().map(|e| e.size).sum()
    }

    fn skip(&mut self, entry: SkippedEntry) {
        warn!(path = %entry.path.display(), reason = %entry.reason, "skipping archive entry");
        self.outcomes.push(EntryOutcome::Skipped(entry));
    }
}

/// Writes every descendant of `root` (not `root` itself) to `sink` as tar.
///
/// The walk is depth-first with entries sorted by name within each
/// directory. Symlinks are followed. Entries that cannot be read (walk
/// errors, open or stat failures, special files) are skipped and reported;
/// only failures writing to `sink`, or reading a file already half-written
/// into the stream, abort the archive.
pub fn archive_directory<W: Write>(root: &Path, sink: W) -> Result<ArchiveReport, FileOpsError> {
    let meta = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FileOpsError::NotFound(root.to_path_buf()),
        _ => FileOpsError::Io(e),
    })?;
    if !meta.is_dir() {
        return Err(FileOpsError::NotADirectory(root.to_path_buf()));
    }

    let mut builder = Builder::new(sink);
    let mut report = ArchiveReport::default();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.skip(walk_error_entry(root, &e));
                continue;
            }
        };

        let path = entry.path();
        let Some(relative_path) = relative_name(root, path) else {
            report.skip(SkippedEntry::new(path, "path is not valid UTF-8"));
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    report.skip(SkippedEntry::new(path, e));
                    continue;
                }
            };
            let mut header = Header::new_gnu();
            header.set_metadata(&meta);
            header.set_size(0);
            builder.append_data(&mut header, &relative_path, std::io::empty())?;

            report.outcomes.push(EntryOutcome::Archived(ArchivedEntry {
                relative_path,
                kind: EntryKind::Directory,
                size: 0,
            }));
        } else if file_type.is_file() {
            let (file, meta) = match File::open(path).and_then(|f| {
                let meta = f.metadata()?;
                Ok((f, meta))
            }) {
                Ok(pair) => pair,
                Err(e) => {
                    report.skip(SkippedEntry::new(path, e));
                    continue;
                }
            };

            let size = meta.len();
            let mut header = Header::new_gnu();
            header.set_metadata(&meta);
            header.set_size(size);
            builder.append_data(&mut header, &relative_path, SizedReader::new(file, size))?;

            debug!(path = %relative_path, size, "archived file");
            report.outcomes.push(EntryOutcome::Archived(ArchivedEntry {
                relative_path,
                kind: EntryKind::File,
                size,
            }));
        } else {
            report.skip(SkippedEntry::new(path, "unsupported file type"));
        }
    }

    let mut sink = builder.into_inner()?;
    sink.flush()?;

    Ok(report)
}

/// Yields exactly `size` bytes of `inner`: a longer source is cut off and a
/// shorter one fails with `UnexpectedEof`, so a file that changed after its
/// header was written can never misalign the entries that follow.
struct SizedReader<R> {
    inner: std::io::Take<R>,
    remaining: u64,
}

impl<R: Read> SizedReader<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner: inner.take(size),
            remaining: size,
        }
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file shrank while archiving, {} bytes missing", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// `/`-joined path of `path` relative to `root`.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
