use serde::{Deserialize, Serialize};

/// Body returned by both upload endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    /// Original name of the uploaded file; `/upload` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl UploadResponse {
    pub fn chunk(chunk_number: u32) -> Self {
        Self {
            message: format!("Chunk {chunk_number} uploaded successfully"),
            filename: None,
        }
    }

    pub fn file(filename: impl Into<String>) -> Self {
        Self {
            message: "File uploaded successfully".into(),
            filename: Some(filename.into()),
        }
    }
}

/// Body returned by `/check-file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFileResponse {
    pub file_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
