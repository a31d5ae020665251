use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::TransferError;
use crate::types::StoredUpload;
use crate::validation::validate_upload_path;

/// Joins `relative_path` onto `root` after validating it stays inside.
pub fn resolve_upload_path(root: &Path, relative_path: &str) -> Result<PathBuf, TransferError> {
    validate_upload_path(relative_path)?;
    if Path::new(relative_path).file_name().is_none() {
        return Err(TransferError::InvalidPath(format!(
            "path has no file name: {relative_path}"
        )));
    }
    Ok(root.join(relative_path))
}

/// Streams an upload body into a hidden temp file under `root`.
///
/// Used when the destination is only known after the body has been read,
/// e.g. a multipart form whose path field trails the file part. The temp
/// file is removed if the [`StagedUpload`] is dropped without a commit.
pub async fn stage_upload<S, E>(root: &Path, body: S) -> Result<StagedUpload, TransferError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    fs::create_dir_all(root).await?;
    let mut staged = StagedUpload {
        root: root.to_path_buf(),
        temp: root.join(format!(".upload-{}.part", Uuid::new_v4())),
        size: 0,
        committed: false,
    };

    let mut file = fs::File::create(&staged.temp).await?;
    let mut body = std::pin::pin!(body);
    while let Some(piece) = body.next().await {
        let piece = piece.map_err(std::io::Error::other)?;
        file.write_all(&piece).await?;
        staged.size += piece.len() as u64;
    }
    file.flush().await?;
    debug!(temp = %staged.temp.display(), size = staged.size, "upload body staged");
    Ok(staged)
}

/// An upload body on disk, waiting for its final name.
#[derive(Debug)]
pub struct StagedUpload {
    root: PathBuf,
    temp: PathBuf,
    size: u64,
    committed: bool,
}

impl StagedUpload {
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Moves the staged body to `<root>/<relative_path>`, replacing any
    /// existing file.
    pub async fn commit(mut self, relative_path: &str) -> Result<StoredUpload, TransferError> {
        let dest = resolve_upload_path(&self.root, relative_path)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&self.temp, &dest).await?;
        self.committed = true;

        info!(path = %dest.display(), size = self.size, "upload stored");
        Ok(StoredUpload {
            path: dest,
            size: self.size,
        })
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}
