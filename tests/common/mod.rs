#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Body,
    extract::Multipart,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use http_body_util::BodyExt;
use image_upload_backend::AppState;
use image_upload_backend::config::UploadConfig;
use image_upload_backend::services::storage::{LocalStorageService, StorageService};
use image_upload_backend::services::validation::{HttpImageValidator, ImageValidator};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

pub const BOUNDARY: &str = "------------------------upload-test-boundary";

/// Local stand-in for the image validation service.
///
/// The verdict is picked from the uploaded bytes:
/// `blurry` is rejected with a reason, `no-reason` is rejected without one,
/// `explode` answers 500, `garbage` answers a non-JSON body, anything else is valid.
pub async fn spawn_fake_validator() -> String {
    let app = Router::new().route("/validate-image", post(fake_validate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn fake_validate(mut multipart: Multipart) -> Response {
    let mut content = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            assert!(field.file_name().is_some(), "file part must carry a name");
            content = Some(field.bytes().await.unwrap().to_vec());
        }
    }

    let Some(content) = content else {
        return (StatusCode::BAD_REQUEST, "missing file").into_response();
    };

    match content.as_slice() {
        b"blurry" => Json(json!({ "isValid": false, "reason": "blurry" })).into_response(),
        b"no-reason" => Json(json!({ "isValid": false })).into_response(),
        b"explode" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        b"garbage" => "certainly not json".into_response(),
        _ => Json(json!({ "isValid": true })).into_response(),
    }
}

/// Base URL nothing is listening on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn test_config(upload_dir: &Path, validator_base_url: &str) -> UploadConfig {
    UploadConfig {
        upload_dir: upload_dir.to_path_buf(),
        validator_type: "http".to_string(),
        validator_base_url: validator_base_url.to_string(),
        validation_timeout_secs: 2,
        max_files_per_request: 5,
        max_file_size: 1024,
        ..UploadConfig::default()
    }
}

pub fn build_state(config: UploadConfig) -> AppState {
    let storage: Arc<dyn StorageService> = Arc::new(LocalStorageService::new(
        config.upload_dir.clone(),
        config.max_file_size,
    ));
    let validator: Arc<dyn ImageValidator> =
        Arc::new(HttpImageValidator::from_config(&config).unwrap());
    AppState::new(storage, validator, config)
}

/// `(field name, file name, content)` triples encoded as multipart/form-data.
pub fn multipart_body(parts: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, content) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Plain `(field name, value)` parts with no filename, followed by file parts.
pub fn multipart_body_with_text(
    text: &[(&str, &str)],
    files: &[(&str, &str, &str)],
) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, value) in text {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{field}\"\r\n\r\n\
                 {value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(&multipart_body(files));
    body
}

pub fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

pub fn stored_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
