//! Upload handling for webshare.
//!
//! Two ways a file reaches the upload root:
//! - [`ChunkAssembler`] stages numbered fragments and concatenates them once
//!   the declared count is present.
//! - [`stage_upload`] streams a single multipart file part to disk, and
//!   [`StagedUpload::commit`] moves it under a root-confined relative path
//!   once that path is known.
//!
//! Neither path enqueues anything for download; that is an explicit
//! operator action.

mod chunked;
mod types;
mod upload;
mod validation;

pub use chunked::{ChunkAssembler, calculate_file_checksum};
pub use types::{ChunkOutcome, ChunkSubmission, StoredUpload};
pub use upload::{StagedUpload, resolve_upload_path, stage_upload};
pub use validation::validate_upload_path;

/// Suffix appended to a filename to form its staging directory.
pub const CHUNK_DIR_SUFFIX: &str = "_chunks";

/// Prefix of every staged fragment file (`chunk_1`, `chunk_2`, ...).
pub const CHUNK_FILE_PREFIX: &str = "chunk_";

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("missing metadata: {0}")]
    MissingField(&'static str),
}

impl TransferError {
    /// Returns `true` when the request itself was at fault and no server
    /// state was changed.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, TransferError::Io(_))
    }
}
