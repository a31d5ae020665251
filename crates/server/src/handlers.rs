//! Route table and request handlers.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{self, header};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use webshare_delivery::{Dispatcher, TransferQueue};
use webshare_transfer::{ChunkAssembler, ChunkOutcome, ChunkSubmission, TransferError, stage_upload};

use crate::error::ApiError;
use crate::responses::{CheckFileResponse, UploadResponse};
use crate::server::ServerConfig;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub assembler: Arc<ChunkAssembler>,
}

impl AppState {
    pub fn new(queue: Arc<TransferQueue>, upload_root: &Path) -> Self {
        Self {
            dispatcher: Dispatcher::new(queue),
            assembler: Arc::new(ChunkAssembler::new(upload_root)),
        }
    }

    fn upload_root(&self) -> &Path {
        self.assembler.upload_root()
    }
}

/// Builds the full application router.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let upload_limit = match config.max_upload_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    let mut app = Router::new()
        .route(
            "/upload-chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(config.max_chunk_bytes)),
        )
        .route("/upload", post(upload).layer(upload_limit))
        .route("/check-file", get(check_file))
        .route("/download", get(download))
        .with_state(state);

    if let Some(dir) = &config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
}

/// `POST /upload-chunk`: stores one fragment, merging when the set is
/// complete.
async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut filename = None;
    let mut chunk_number = None;
    let mut total_chunks = None;
    let mut data = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "filename" => filename = Some(field.text().await?),
            "chunkNumber" => chunk_number = Some(field.text().await?),
            "totalChunks" => total_chunks = Some(field.text().await?),
            "file" => data = Some(field.bytes().await?),
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    let submission = ChunkSubmission::from_form(
        filename.as_deref(),
        chunk_number.as_deref(),
        total_chunks.as_deref(),
        data,
    )?;
    let outcome = state.assembler.submit(submission).await?;
    if let ChunkOutcome::Assembled { path, size, .. } = &outcome {
        info!(path = %path.display(), size, "chunked upload complete");
    }

    Ok(Json(UploadResponse::chunk(outcome.chunk_number())))
}

/// `POST /upload`: stores one whole file at `relativePath`, or under its
/// own name when no path is given.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut staged = None;
    let mut original_name = None;
    let mut relative_path = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "file" => {
                original_name = field.file_name().map(str::to_owned);
                staged = Some(stage_upload(state.upload_root(), field).await?);
            }
            "relativePath" => relative_path = Some(field.text().await?),
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    let staged = staged.ok_or(TransferError::MissingField("file"))?;
    let target = relative_path
        .filter(|p| !p.is_empty())
        .or_else(|| original_name.clone())
        .filter(|p| !p.is_empty())
        .ok_or(TransferError::MissingField("relativePath"))?;

    let stored = staged.commit(&target).await?;
    let filename = original_name.unwrap_or_else(|| {
        stored
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Ok(Json(UploadResponse::file(filename)))
}

/// `GET /check-file`: reports the head of the queue without removing it.
async fn check_file(State(state): State<AppState>) -> Json<CheckFileResponse> {
    let head = state.dispatcher.status();
    Json(CheckFileResponse {
        file_available: head.is_some(),
        file: head.map(|p| p.display().to_string()),
    })
}

/// `GET /download`: pops the head of the queue and streams it.
async fn download(State(state): State<AppState>) -> Result<Response, ApiError> {
    let opened = state.dispatcher.dispatch().await?.open().await?;
    let delivery = &opened.delivery;

    let mut response = http::Response::builder()
        .header(header::CONTENT_TYPE, delivery.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(delivery.file_name()),
        );
    if let Some(len) = delivery.content_length() {
        response = response.header(header::CONTENT_LENGTH, len);
    }

    response
        .body(Body::from_stream(opened.body))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Bytes escaped in `filename*`: everything but alphanumerics and `-._~`.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `attachment` disposition for `name`.
///
/// Names that are not plain printable ASCII get a sanitized `filename`
/// plus an RFC 5987 `filename*`.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == name {
        format!("attachment; filename=\"{name}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(name, FILENAME_ENCODE_SET)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_quoted_verbatim() {
        assert_eq!(
            content_disposition("report final.pdf"),
            "attachment; filename=\"report final.pdf\""
        );
    }

    #[test]
    fn unicode_and_quotes_get_encoded_form() {
        assert_eq!(
            content_disposition("naïve \"x\".txt"),
            "attachment; filename=\"na_ve _x_.txt\"; filename*=UTF-8''na%C3%AFve%20%22x%22.txt"
        );
    }

    #[test]
    fn encoded_form_keeps_unreserved_punctuation() {
        assert_eq!(
            content_disposition("写真_2024-01.v2~final.jpg"),
            "attachment; filename=\"__2024-01.v2~final.jpg\"; \
             filename*=UTF-8''%E5%86%99%E7%9C%9F_2024-01.v2~final.jpg"
        );
    }
}
