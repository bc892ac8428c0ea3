use crate::services::reconciler::{BatchResult, RejectedUpload};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const UPLOAD_SUCCESS_MESSAGE: &str = "Upload successful";

/// Response contract shared by every outcome of `POST /upload`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub is_success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UploadData>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    /// Storage names of the retained files
    pub file_url: Vec<String>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RejectedFile {
    /// Original client-supplied file name
    pub file: String,
    pub reason: String,
}

impl UploadResponse {
    pub fn success(result: BatchResult) -> Self {
        Self {
            is_success: true,
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            data: Some(result.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl From<BatchResult> for UploadData {
    fn from(result: BatchResult) -> Self {
        Self {
            file_url: result.accepted,
            rejected: result.rejected.into_iter().map(RejectedFile::from).collect(),
        }
    }
}

impl From<RejectedUpload> for RejectedFile {
    fn from(rejected: RejectedUpload) -> Self {
        Self {
            file: rejected.original_name,
            reason: rejected.reason,
        }
    }
}
