use crate::services::storage::{StorageError, StorageService, StoredUpload};
use crate::services::validation::ImageValidator;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use thiserror::Error;

/// Reason used when the service rejects a file without saying why.
pub const DEFAULT_REJECTION_REASON: &str = "Rejected by validation service";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to delete rejected file {storage_name}: {source}")]
    Purge {
        storage_name: String,
        #[source]
        source: StorageError,
    },
}

/// Terminal state of one file in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Still stored; reported by storage name.
    Accepted { storage_name: String },
    /// Deleted from storage; reported by original name.
    Purged {
        original_name: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedUpload {
    pub original_name: String,
    pub reason: String,
}

/// Accepted storage names and rejected files, both in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedUpload>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<FileOutcome> for BatchResult {
    fn from_iter<I: IntoIterator<Item = FileOutcome>>(outcomes: I) -> Self {
        let mut result = BatchResult::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Accepted { storage_name } => result.accepted.push(storage_name),
                FileOutcome::Purged {
                    original_name,
                    reason,
                } => result.rejected.push(RejectedUpload {
                    original_name,
                    reason,
                }),
            }
        }
        result
    }
}

/// Validates stored uploads and purges the rejected ones.
pub struct BatchReconciler {
    storage: Arc<dyn StorageService>,
    validator: Arc<dyn ImageValidator>,
    concurrency: usize,
}

impl BatchReconciler {
    pub fn new(
        storage: Arc<dyn StorageService>,
        validator: Arc<dyn ImageValidator>,
        concurrency: usize,
    ) -> Self {
        Self {
            storage,
            validator,
            concurrency: concurrency.max(1),
        }
    }

    /// Resolves every upload to a terminal state.
    ///
    /// Up to `concurrency` validation calls run at once, but outcomes are
    /// collected in input order. A failed purge aborts the batch; files
    /// resolved before it keep their state, and files still in flight are
    /// left wherever their step had reached (a started delete may still land).
    pub async fn reconcile(&self, uploads: Vec<StoredUpload>) -> Result<BatchResult, ReconcileError> {
        let total = uploads.len();

        let outcomes: Vec<FileOutcome> = stream::iter(uploads)
            .map(|upload| self.resolve(upload))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let result: BatchResult = outcomes.into_iter().collect();
        debug_assert_eq!(result.len(), total);

        tracing::info!(
            "Batch reconciled: {} accepted, {} rejected",
            result.accepted.len(),
            result.rejected.len()
        );
        Ok(result)
    }

    async fn resolve(&self, upload: StoredUpload) -> Result<FileOutcome, ReconcileError> {
        let verdict = self.validator.validate(&upload).await;

        if verdict.is_valid {
            tracing::info!(
                "Accepted {} as {}",
                upload.original_name,
                upload.storage_name
            );
            return Ok(FileOutcome::Accepted {
                storage_name: upload.storage_name,
            });
        }

        let reason = verdict
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

        tracing::info!(
            "Rejected {} ({}), purging {}",
            upload.original_name,
            reason,
            upload.storage_name
        );

        self.storage
            .delete(&upload.storage_name)
            .await
            .map_err(|source| {
                tracing::error!(
                    "Failed to purge {} after rejection: {}",
                    upload.storage_name,
                    source
                );
                ReconcileError::Purge {
                    storage_name: upload.storage_name.clone(),
                    source,
                }
            })?;

        Ok(FileOutcome::Purged {
            original_name: upload.original_name,
            reason,
        })
    }
}
