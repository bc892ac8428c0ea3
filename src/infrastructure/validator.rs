use crate::config::UploadConfig;
use crate::services::validation::{ImageValidator, create_validator};
use std::sync::Arc;
use tracing::info;

pub async fn setup_validator(config: &UploadConfig) -> anyhow::Result<Arc<dyn ImageValidator>> {
    let validator = create_validator(config)?;

    // Warm up: an unreachable service is not fatal, uploads are just rejected.
    if validator.health_check().await {
        info!("🔍 Image validation service reachable");
    } else {
        tracing::warn!(
            "⚠️  Image validation service unreachable at {}! Uploads will be rejected until it recovers.",
            config.validator_base_url
        );
    }

    Ok(validator)
}
