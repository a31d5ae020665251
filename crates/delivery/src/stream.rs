//! Byte streams for dispatched deliveries.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use webshare_file_ops::{ArchiveReport, FileOpsError, archive_directory};

use crate::dispatch::Delivery;
use crate::{ARCHIVE_CHANNEL_DEPTH, DispatchError, STREAM_BUFFER_SIZE};

/// A boxed stream of body frames.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// A delivery whose bytes are ready to flow.
pub struct OpenedDelivery {
    pub delivery: Delivery,
    pub body: ByteStream,
    /// Walk result for archives; resolves once the archive is fully written
    /// or aborted.
    pub archive: Option<JoinHandle<Result<ArchiveReport, FileOpsError>>>,
}

impl Delivery {
    /// Opens the underlying file or starts the archive walk.
    ///
    /// Opening a file that disappeared after dispatch counts as vanished.
    pub async fn open(self) -> Result<OpenedDelivery, DispatchError> {
        let (body, archive) = match &self {
            Delivery::File { path, .. } => {
                let file = match tokio::fs::File::open(path).await {
                    Ok(f) => f,
                    Err(source) => {
                        warn!(path = %path.display(), "failed to open queued file: {source}");
                        return Err(DispatchError::Vanished {
                            path: path.clone(),
                            source,
                        });
                    }
                };
                (
                    Box::pin(ReaderStream::with_capacity(file, STREAM_BUFFER_SIZE)) as ByteStream,
                    None,
                )
            }
            Delivery::Archive { root, .. } => {
                let (body, handle) = spawn_archive(root.clone());
                (body, Some(handle))
            }
        };

        Ok(OpenedDelivery {
            delivery: self,
            body,
            archive,
        })
    }
}

/// Runs the blocking tar walk on the blocking pool, feeding a bounded
/// channel the client drains.
fn spawn_archive(root: PathBuf) -> (ByteStream, JoinHandle<Result<ArchiveReport, FileOpsError>>) {
    let (tx, rx) = mpsc::channel(ARCHIVE_CHANNEL_DEPTH);

    let handle = tokio::task::spawn_blocking(move || {
        let writer = BufWriter::with_capacity(STREAM_BUFFER_SIZE, ChannelWriter { tx: tx.clone() });
        let result = archive_directory(&root, writer);
        match &result {
            Ok(report) => {
                info!(
                    root = %root.display(),
                    entries = report.archived().count(),
                    skipped = report.skipped().count(),
                    bytes = report.total_bytes(),
                    "archive streamed"
                );
            }
            Err(e) => {
                warn!(root = %root.display(), "archive aborted: {e}");
                // Fails the body so the connection is cut instead of ending
                // with a truncated but well-formed response.
                let _ = tx.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
        result
    });

    (Box::pin(ReceiverStream::new(rx)), handle)
}

/// `Write` adapter that forwards each buffer to an async channel.
///
/// Blocks while the channel is full; fails with `BrokenPipe` once the
/// receiving side (the client connection) is gone.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
