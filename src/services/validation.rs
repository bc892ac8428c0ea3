use crate::config::UploadConfig;
use crate::services::storage::StoredUpload;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Reason reported when the validation service could not produce a verdict.
pub const VALIDATION_SERVICE_ERROR: &str = "ML service error";

/// Multipart field name the validation service reads the image from.
const FILE_FIELD: &str = "file";

/// Accept/reject decision for one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub is_valid: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }

    pub fn service_error() -> Self {
        Self::invalid(VALIDATION_SERVICE_ERROR)
    }
}

/// Trait for image validation implementations
#[async_trait]
pub trait ImageValidator: Send + Sync {
    /// Produce a verdict for a fully written file.
    ///
    /// Implementations never fail: anything that keeps the remote side from
    /// answering is reported as a rejecting verdict.
    async fn validate(&self, upload: &StoredUpload) -> ValidationVerdict;

    /// Check if the validation service is reachable
    async fn health_check(&self) -> bool;
}

/// Submits files to a remote validation service as multipart form data.
pub struct HttpImageValidator {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpImageValidator {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build validation HTTP client")?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        let endpoint = config
            .validator_endpoint()
            .context("Invalid validation service URL")?;
        Self::new(endpoint, config.validation_timeout())
    }

    async fn request_verdict(&self, upload: &StoredUpload) -> Result<ValidationVerdict> {
        let bytes = tokio::fs::read(&upload.path)
            .await
            .with_context(|| format!("Failed to read {}", upload.path.display()))?;

        let mime_type = infer::get(&bytes).map_or_else(
            || mime::APPLICATION_OCTET_STREAM.to_string(),
            |kind| kind.mime_type().to_string(),
        );

        let part = Part::bytes(bytes)
            .file_name(upload.storage_name.clone())
            .mime_str(&mime_type)?;
        let form = Form::new().part(FILE_FIELD, part);

        let verdict = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<ValidationVerdict>()
            .await?;

        Ok(verdict)
    }
}

#[async_trait]
impl ImageValidator for HttpImageValidator {
    async fn validate(&self, upload: &StoredUpload) -> ValidationVerdict {
        match self.request_verdict(upload).await {
            Ok(verdict) => {
                tracing::debug!(
                    "Verdict for {}: valid={} reason={:?}",
                    upload.storage_name,
                    verdict.is_valid,
                    verdict.reason
                );
                verdict
            }
            Err(e) => {
                tracing::warn!("ML validation error for {}: {:#}", upload.storage_name, e);
                ValidationVerdict::service_error()
            }
        }
    }

    async fn health_check(&self) -> bool {
        // Any HTTP answer means the service is up; only transport failures count.
        let mut base = self.endpoint.clone();
        base.set_path("/");
        self.client.get(base).send().await.is_ok()
    }
}

/// No-op validator for development/testing
pub struct NoOpValidator;

#[async_trait]
impl ImageValidator for NoOpValidator {
    async fn validate(&self, upload: &StoredUpload) -> ValidationVerdict {
        tracing::warn!(
            "NoOpValidator: Skipping image validation for {} (development mode)",
            upload.storage_name
        );
        ValidationVerdict::valid()
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Factory function to create the validator selected by config
pub fn create_validator(config: &UploadConfig) -> Result<Arc<dyn ImageValidator>> {
    match config.validator_type.to_lowercase().as_str() {
        "noop" | "none" | "disabled" => Ok(Arc::new(NoOpValidator)),
        "http" => Ok(Arc::new(HttpImageValidator::from_config(config)?)),
        other => {
            tracing::warn!("Unknown validator type '{}', using HTTP validator", other);
            Ok(Arc::new(HttpImageValidator::from_config(config)?))
        }
    }
}
