use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{info, warn};

use webshare_file_ops::{ARCHIVE_CONTENT_TYPE, ARCHIVE_EXTENSION};

use crate::DispatchError;
use crate::queue::TransferQueue;

/// Content type for single-file downloads.
pub const FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// A popped queue entry resolved to what will be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A regular file, sent verbatim.
    File {
        path: PathBuf,
        name: String,
        size: u64,
    },
    /// A directory, sent as a tar archive of its contents.
    Archive { root: PathBuf, name: String },
}

impl Delivery {
    /// Filesystem path behind this delivery.
    pub fn path(&self) -> &Path {
        match self {
            Delivery::File { path, .. } => path,
            Delivery::Archive { root, .. } => root,
        }
    }

    /// Download name offered to the client.
    pub fn file_name(&self) -> &str {
        match self {
            Delivery::File { name, .. } | Delivery::Archive { name, .. } => name,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Delivery::File { .. } => FILE_CONTENT_TYPE,
            Delivery::Archive { .. } => ARCHIVE_CONTENT_TYPE,
        }
    }

    /// Exact body length, when known up front.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Delivery::File { size, .. } => Some(*size),
            Delivery::Archive { .. } => None,
        }
    }
}

/// Drains the transfer queue, one entry per pull.
///
/// Delivery is at-most-once: the head is popped before it is inspected, so
/// an entry that vanished, or whose stream later fails, is gone for good.
/// The operator re-enqueues by hand.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    queue: Arc<TransferQueue>,
}

impl Dispatcher {
    pub fn new(queue: Arc<TransferQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<TransferQueue> {
        &self.queue
    }

    /// Current head of the queue, without side effects.
    pub fn status(&self) -> Option<PathBuf> {
        self.queue.peek()
    }

    /// Pops the head entry and resolves it to a [`Delivery`].
    pub async fn dispatch(&self) -> Result<Delivery, DispatchError> {
        // The lock is released once pop() returns; the stat below runs
        // without it.
        let path = self.queue.pop().ok_or(DispatchError::Empty)?;

        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(source) => {
                warn!(path = %path.display(), "queued path vanished, dropping: {source}");
                return Err(DispatchError::Vanished { path, source });
            }
        };

        let name = display_name(&path).await;
        let delivery = if meta.is_file() {
            Delivery::File {
                path,
                name,
                size: meta.len(),
            }
        } else if meta.is_dir() {
            Delivery::Archive {
                root: path,
                name: format!("{name}.{ARCHIVE_EXTENSION}"),
            }
        } else {
            warn!(path = %path.display(), "queued path is not a regular file or directory, dropping");
            return Err(DispatchError::Unsupported(path));
        };

        info!(
            path = %delivery.path().display(),
            name = delivery.file_name(),
            remaining = self.queue.len(),
            "dispatching download"
        );
        Ok(delivery)
    }
}

/// Base name used to label a download.
///
/// Paths without a final component (`.`, `/`) fall back to the
/// canonicalized name, then to `"download"`.
pub async fn display_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        return name.to_string_lossy().into_owned();
    }
    fs::canonicalize(path)
        .await
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "download".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(TransferQueue::new()))
    }

    #[tokio::test]
    async fn empty_queue_is_empty_error() {
        let d = dispatcher();
        assert!(d.status().is_none());
        assert!(matches!(d.dispatch().await, Err(DispatchError::Empty)));
    }

    #[tokio::test]
    async fn file_entry_resolves_to_file_delivery() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("song.mp3");
        std::fs::write(&file, b"0123456789").unwrap();

        let d = dispatcher();
        d.queue().enqueue(&file);
        assert_eq!(d.status(), Some(file.clone()));

        let delivery = d.dispatch().await.unwrap();
        assert_eq!(
            delivery,
            Delivery::File {
                path: file,
                name: "song.mp3".into(),
                size: 10
            }
        );
        assert_eq!(delivery.content_type(), FILE_CONTENT_TYPE);
        assert_eq!(delivery.content_length(), Some(10));
        assert!(d.queue().is_empty());
    }

    #[tokio::test]
    async fn directory_entry_resolves_to_archive() {
        let dir = TempDir::new().unwrap();
        let photos = dir.path().join("photos");
        std::fs::create_dir(&photos).unwrap();

        let d = dispatcher();
        d.queue().enqueue(&photos);

        let delivery = d.dispatch().await.unwrap();
        assert_eq!(delivery.file_name(), "photos.tar");
        assert_eq!(delivery.content_type(), ARCHIVE_CONTENT_TYPE);
        assert_eq!(delivery.content_length(), None);
    }

    #[tokio::test]
    async fn vanished_entry_is_dropped_not_requeued() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("deleted.txt");
        let kept = dir.path().join("kept.txt");
        std::fs::write(&kept, b"k").unwrap();

        let d = dispatcher();
        d.queue().enqueue(&gone);
        d.queue().enqueue(&kept);

        let err = d.dispatch().await.unwrap_err();
        assert!(matches!(err, DispatchError::Vanished { ref path, .. } if *path == gone));
        assert_eq!(d.queue().snapshot(), vec![kept.clone()]);

        let next = d.dispatch().await.unwrap();
        assert_eq!(next.path(), kept);
    }

    #[tokio::test]
    async fn display_name_variants() {
        assert_eq!(
            display_name(Path::new("/srv/share/report.pdf")).await,
            "report.pdf"
        );
        assert_eq!(display_name(Path::new("music/")).await, "music");
        assert_eq!(display_name(Path::new("/")).await, "download");
    }

    #[tokio::test]
    async fn dot_entry_is_named_after_resolved_directory() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        let expected = cwd.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(display_name(Path::new(".")).await, expected);
    }
}
