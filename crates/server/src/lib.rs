//! HTTP surface for webshare.
//!
//! Serves four endpoints on top of the transfer and delivery crates:
//!
//! | Method | Path            | Purpose                                   |
//! |--------|-----------------|-------------------------------------------|
//! | POST   | `/upload-chunk` | one numbered fragment of a chunked upload |
//! | POST   | `/upload`       | one whole file under a relative path      |
//! | GET    | `/check-file`   | peek at the head of the transfer queue    |
//! | GET    | `/download`     | pop the head and stream it                |
//!
//! Everything else falls through to the static asset directory, when one
//! is configured.

mod error;
mod handlers;
mod responses;
mod server;

pub use error::ApiError;
pub use handlers::{AppState, router};
pub use responses::{CheckFileResponse, ErrorResponse, UploadResponse};
pub use server::{ServerConfig, ShareServer, bind_first_available};

/// Default cap on a single `/upload-chunk` request body.
///
/// Chunk bodies are buffered in memory; whole-file `/upload` bodies are
/// streamed to disk and are not capped by default.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 20 * 1024 * 1024;

/// Errors produced by the share server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no free port in {start}..={end}")]
    NoAvailablePort { start: u16, end: u16 },

    #[error("server already running")]
    AlreadyRunning,
}
