//! Transfer queue and download dispatch.
//!
//! The [`TransferQueue`] is the only shared mutable state in webshare. The
//! [`Dispatcher`] pops its head on every pull, resolves the path to a file
//! or a directory *after* releasing the lock, and produces the byte stream
//! sent to the client.

mod dispatch;
mod queue;
mod stream;

pub use dispatch::{Delivery, Dispatcher, display_name};
pub use queue::TransferQueue;
pub use stream::{ByteStream, OpenedDelivery};

use std::path::PathBuf;

/// Read size for file downloads and archive frames.
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Archive frames buffered between the directory walk and the client.
///
/// Bounded so a slow client throttles the walk.
pub const ARCHIVE_CHANNEL_DEPTH: usize = 8;

/// Errors produced when dispatching a download.
///
/// Every variant means "nothing to send": the entry, if any, has already
/// been removed from the queue and is not restored.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no file available for download")]
    Empty,

    #[error("queued path no longer exists: {}", path.display())]
    Vanished {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("queued path is neither a file nor a directory: {}", .0.display())]
    Unsupported(PathBuf),
}
