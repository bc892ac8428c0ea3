use crate::models::UploadResponse;
use crate::services::reconciler::ReconcileError;
use crate::services::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) | AppError::Storage(StorageError::TooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Storage(StorageError::Io(e)) if is_body_limit_error(e) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Storage(_) | AppError::Reconcile(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// axum's body limit shows up somewhere in the multipart error's source chain.
pub(crate) fn is_body_limit_error(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(e);
    while let Some(err) = current {
        if err.to_string().contains("length limit exceeded") {
            return true;
        }
        current = err.source();
    }
    false
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Upload pipeline error: {:?}", self);
        } else {
            tracing::debug!("Upload request rejected: {}", self);
        }

        (status, Json(UploadResponse::failure(self.to_string()))).into_response()
    }
}
