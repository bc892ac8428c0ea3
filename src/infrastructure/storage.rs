use crate::config::UploadConfig;
use crate::services::storage::LocalStorageService;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &UploadConfig) -> anyhow::Result<Arc<LocalStorageService>> {
    let storage = LocalStorageService::new(config.upload_dir.clone(), config.max_file_size);
    storage.init().await.with_context(|| {
        format!(
            "Failed to create upload directory {}",
            config.upload_dir.display()
        )
    })?;

    info!("📂 Local Storage: {}", storage.root().display());
    Ok(Arc::new(storage))
}
