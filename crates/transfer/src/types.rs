use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::TransferError;
use crate::validation::validate_upload_path;

/// One numbered fragment of a chunked upload.
#[derive(Debug, Clone)]
pub struct ChunkSubmission {
    /// Target filename, relative to the upload root.
    pub filename: String,
    /// 1-based position of this fragment.
    pub chunk_number: u32,
    /// Declared number of fragments for the file.
    pub total_chunks: u32,
    /// Fragment payload.
    pub data: Bytes,
}

impl ChunkSubmission {
    /// Builds a submission from raw form values.
    ///
    /// Every value is required. `chunk_number` and `total_chunks` must be
    /// positive integers and `chunk_number` may not exceed `total_chunks`.
    pub fn from_form(
        filename: Option<&str>,
        chunk_number: Option<&str>,
        total_chunks: Option<&str>,
        data: Option<Bytes>,
    ) -> Result<Self, TransferError> {
        let filename = filename
            .filter(|s| !s.is_empty())
            .ok_or(TransferError::MissingField("filename"))?;
        let chunk_number = chunk_number
            .filter(|s| !s.is_empty())
            .ok_or(TransferError::MissingField("chunkNumber"))?;
        let total_chunks = total_chunks
            .filter(|s| !s.is_empty())
            .ok_or(TransferError::MissingField("totalChunks"))?;
        let data = data.ok_or(TransferError::MissingField("file"))?;

        let chunk_number = parse_positive(chunk_number)
            .ok_or_else(|| TransferError::InvalidChunk(format!("chunk number {chunk_number:?}")))?;
        let total_chunks = parse_positive(total_chunks)
            .ok_or_else(|| TransferError::InvalidChunk(format!("total chunks {total_chunks:?}")))?;

        Self::new(filename.to_string(), chunk_number, total_chunks, data)
    }

    /// Creates a validated submission.
    pub fn new(
        filename: String,
        chunk_number: u32,
        total_chunks: u32,
        data: Bytes,
    ) -> Result<Self, TransferError> {
        validate_upload_path(&filename)?;
        if Path::new(&filename).file_name().is_none() {
            return Err(TransferError::InvalidPath(format!(
                "filename has no final component: {filename}"
            )));
        }

        if chunk_number == 0 || total_chunks == 0 {
            return Err(TransferError::InvalidChunk(
                "chunk numbering starts at 1".into(),
            ));
        }
        if chunk_number > total_chunks {
            return Err(TransferError::InvalidChunk(format!(
                "chunk {chunk_number} exceeds total {total_chunks}"
            )));
        }

        Ok(Self {
            filename,
            chunk_number,
            total_chunks,
            data,
        })
    }
}

fn parse_positive(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n >= 1)
}

/// Result of accepting one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The fragment is staged; the set is not complete yet (or a concurrent
    /// submission already merged it).
    Stored {
        chunk_number: u32,
        received: usize,
        total: u32,
    },
    /// This fragment completed the set and the file was assembled.
    Assembled {
        chunk_number: u32,
        path: PathBuf,
        size: u64,
        sha256: String,
    },
}

impl ChunkOutcome {
    /// The fragment number this outcome acknowledges.
    pub fn chunk_number(&self) -> u32 {
        match self {
            ChunkOutcome::Stored { chunk_number, .. }
            | ChunkOutcome::Assembled { chunk_number, .. } => *chunk_number,
        }
    }
}

/// A file written by a single-shot upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Absolute or root-relative destination path.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
}
