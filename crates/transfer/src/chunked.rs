use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::types::{ChunkOutcome, ChunkSubmission};
use crate::{CHUNK_DIR_SUFFIX, CHUNK_FILE_PREFIX, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub async fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Fragment naming
// ---------------------------------------------------------------------------

fn fragment_name(chunk_number: u32) -> String {
    format!("{CHUNK_FILE_PREFIX}{chunk_number}")
}

/// Parses `chunk_<n>`; in-flight `.part` files and strays don't count.
fn parse_fragment_name(name: &str) -> Option<u32> {
    name.strip_prefix(CHUNK_FILE_PREFIX)?
        .parse::<u32>()
        .ok()
        .filter(|n| *n >= 1)
}

/// Counts staged fragments. A missing staging directory counts as zero:
/// a concurrent submission may have merged and removed it.
async fn count_fragments(staging: &Path) -> Result<usize, TransferError> {
    let mut entries = match fs::read_dir(staging).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if parse_fragment_name(name).is_some() {
                count += 1;
            }
        }
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// ChunkAssembler
// ---------------------------------------------------------------------------

/// Stages numbered upload fragments and assembles them in numeric order.
///
/// Fragments for `name` live in `<root>/<name>_chunks/chunk_<n>`. When the
/// number of staged fragments equals the declared total, they are
/// concatenated `1..=N` into `<root>/<name>` and the staging directory is
/// removed.
///
/// Submissions for different filenames are independent. Submissions for the
/// same filename are not locked against each other: the merge goes through a
/// uniquely named temporary file and a rename, and a caller that loses the
/// race to a concurrent merge simply reports its fragment as stored.
#[derive(Debug, Clone)]
pub struct ChunkAssembler {
    upload_root: PathBuf,
}

impl ChunkAssembler {
    /// Creates an assembler writing under `upload_root`.
    pub fn new(upload_root: &Path) -> Self {
        Self {
            upload_root: upload_root.to_path_buf(),
        }
    }

    /// Returns the upload root.
    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Staging directory for `filename`.
    pub fn staging_dir(&self, filename: &str) -> PathBuf {
        self.upload_root
            .join(format!("{filename}{CHUNK_DIR_SUFFIX}"))
    }

    /// Final path of the assembled `filename`.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.upload_root.join(filename)
    }

    /// Stages one fragment and merges the set if it is now complete.
    ///
    /// On a merge failure the staging directory is left in place so the
    /// client can retry.
    pub async fn submit(&self, chunk: ChunkSubmission) -> Result<ChunkOutcome, TransferError> {
        let staging = self.staging_dir(&chunk.filename);
        fs::create_dir_all(&staging).await?;

        // Write under a temporary name so a concurrent count never sees a
        // half-written fragment.
        let slot = staging.join(fragment_name(chunk.chunk_number));
        let part = staging.join(format!(
            "{}.part-{}",
            fragment_name(chunk.chunk_number),
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&part, &chunk.data).await?;
        if let Err(e) = fs::rename(&part, &slot).await {
            let _ = fs::remove_file(&part).await;
            return Err(e.into());
        }

        let received = count_fragments(&staging).await?;
        debug!(
            file = %chunk.filename,
            chunk = chunk.chunk_number,
            received,
            total = chunk.total_chunks,
            "chunk staged"
        );

        if received != chunk.total_chunks as usize {
            return Ok(ChunkOutcome::Stored {
                chunk_number: chunk.chunk_number,
                received,
                total: chunk.total_chunks,
            });
        }

        match self.merge(&chunk.filename, &staging, chunk.total_chunks).await? {
            Some((path, size)) => {
                let sha256 = calculate_file_checksum(&path).await?;
                info!(
                    file = %chunk.filename,
                    size,
                    sha256 = %sha256,
                    "chunked upload assembled"
                );
                Ok(ChunkOutcome::Assembled {
                    chunk_number: chunk.chunk_number,
                    path,
                    size,
                    sha256,
                })
            }
            None => Ok(ChunkOutcome::Stored {
                chunk_number: chunk.chunk_number,
                received,
                total: chunk.total_chunks,
            }),
        }
    }

    /// Concatenates fragments `1..=total` into the output path.
    ///
    /// Returns `None` when another caller merged the set first.
    async fn merge(
        &self,
        filename: &str,
        staging: &Path,
        total: u32,
    ) -> Result<Option<(PathBuf, u64)>, TransferError> {
        let output = self.output_path(filename);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }

        let base = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = output.with_file_name(format!(
            ".{base}.merging-{}",
            uuid::Uuid::new_v4().simple()
        ));

        let size = match concat_fragments(staging, total, &tmp).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                // The count said the set was complete, so a vanished fragment
                // means a concurrent submission merged and cleaned it up.
                if e.kind() == ErrorKind::NotFound {
                    debug!(file = %filename, "chunk set already merged by a concurrent submission");
                    return Ok(None);
                }
                return Err(e.into());
            }
        };

        if let Err(e) = fs::rename(&tmp, &output).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        match fs::remove_dir_all(staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(staging = %staging.display(), "failed to remove staging directory: {e}");
            }
        }

        Ok(Some((output, size)))
    }
}

async fn concat_fragments(staging: &Path, total: u32, dest: &Path) -> std::io::Result<u64> {
    let mut out = fs::File::create(dest).await?;
    let mut written = 0u64;
    for n in 1..=total {
        let mut src = fs::File::open(staging.join(fragment_name(n))).await?;
        written += tokio::io::copy(&mut src, &mut out).await?;
    }
    out.flush().await?;
    Ok(written)
}
