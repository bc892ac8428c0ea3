use crate::AppState;
use crate::api::error::{AppError, is_body_limit_error};
use crate::models::UploadResponse;
use crate::services::storage::{StorageService, StoredUpload};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

/// The only multipart field accepted by the upload endpoint.
pub const UPLOAD_FIELD: &str = "file";

pub const NO_FILE_MESSAGE: &str = "No file uploaded";

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "One or more files in the `file` field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Batch processed; rejected files are listed with reasons", body = UploadResponse),
        (status = 400, description = "No file, unexpected file field, or too many files", body = UploadResponse),
        (status = 413, description = "File or request too large", body = UploadResponse),
        (status = 500, description = "Storage failure", body = UploadResponse)
    ),
    tag = "upload"
)]
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Upload request is not multipart: {}", e);
        AppError::BadRequest(NO_FILE_MESSAGE.to_string())
    })?;

    let mut stored: Vec<StoredUpload> = Vec::new();

    // Stream each file to storage while the body is read; stop at the first bad field.
    let intake: Result<(), AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            // Parts without a filename are plain form values, not uploads.
            let Some(original_name) = field.file_name().map(str::to_string) else {
                tracing::debug!("Ignoring text field {}", name);
                continue;
            };

            if name != UPLOAD_FIELD {
                return Err(AppError::BadRequest(format!("Invalid field: {}", name)));
            }

            if stored.len() >= state.config.max_files_per_request {
                return Err(AppError::BadRequest(format!(
                    "Too many files: at most {} per request",
                    state.config.max_files_per_request
                )));
            }

            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            let upload = state
                .storage
                .store_stream(&original_name, Box::new(reader))
                .await?;
            stored.push(upload);
        }
        Ok(())
    }
    .await;

    if let Err(e) = intake {
        tracing::warn!(
            "Upload intake failed: {}. Purging {} stored file(s) and consuming remaining stream...",
            e,
            stored.len()
        );
        purge_unreported(state.storage.as_ref(), &stored).await;
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
        return Err(e);
    }

    if stored.is_empty() {
        return Err(AppError::BadRequest(NO_FILE_MESSAGE.to_string()));
    }

    tracing::info!("📦 Received {} file(s), validating...", stored.len());
    let result = state.reconciler.reconcile(stored).await?;

    Ok(Json(UploadResponse::success(result)))
}

fn multipart_error(e: MultipartError) -> AppError {
    if is_body_limit_error(&e) {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Files stored before intake failed were never validated or reported.
async fn purge_unreported(storage: &dyn StorageService, stored: &[StoredUpload]) {
    for upload in stored {
        if let Err(e) = storage.delete(&upload.storage_name).await {
            tracing::error!(
                "Failed to purge unreported upload {}: {}",
                upload.storage_name,
                e
            );
        }
    }
}
