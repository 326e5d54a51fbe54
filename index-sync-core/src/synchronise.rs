//! High-level pipeline: fetch → transform → batch → upload, once per run.
//!
//! A [`Synchroniser`] owns one full-refresh run from start to finish:
//!   - Fetches every document from the [`SourceClient`], page by page
//!   - Transforms each record exactly once into a [`SinkDocument`]
//!   - Splits the documents into batches of the configured size
//!   - Uploads batches one after the other through the [`Uploader`], retrying a
//!     failing batch with exponential backoff
//!   - Returns a [`SyncReport`] describing what was uploaded
//!
//! # Error Handling
//! A fetch failure aborts the run immediately. A batch that still fails after
//! `max_retries` attempts aborts the run too, leaving earlier batches in place
//! on the sink. Documents the sink rejects inside an otherwise successful batch
//! are logged and listed in the report but never retried.
//!
//! Retries re-submit the very same documents, so generated ids stay stable and
//! the sink's overwrite-by-id semantics make re-submission safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::batch::create_batches;
use crate::config::{RateLimitPolicy, RetryPolicy, SyncSettings};
use crate::contract::{BatchPutRequest, BatchPutResponse, FailedDocument, SinkTarget, SourceClient, Uploader};
use crate::document::SinkDocument;
use crate::download::fetch_all;
use crate::error::{SinkError, SyncError};
use crate::transform::DocumentTransformer;

/// Stages of a run, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Idle,
    Fetching,
    Transforming,
    Uploading,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitPolicy,
}

impl From<&SyncSettings> for SyncPolicy {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            retry: settings.retry,
            rate_limit: settings.rate_limit,
        }
    }
}

/// Result of one batch after however many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub documents: usize,
    pub attempts: u32,
    pub failed_documents: Vec<FailedDocument>,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub documents_fetched: usize,
    pub batches_uploaded: usize,
    pub documents_uploaded: usize,
    pub upload_attempts: u32,
    /// Rejections reported by the sink. Not retried.
    pub failed_documents: Vec<FailedDocument>,
    pub elapsed: Duration,
}

impl SyncReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            documents_fetched: 0,
            batches_uploaded: 0,
            documents_uploaded: 0,
            upload_attempts: 0,
            failed_documents: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

pub struct Synchroniser {
    source: Arc<dyn SourceClient>,
    uploader: Arc<dyn Uploader>,
    target: SinkTarget,
    policy: SyncPolicy,
    transformer: DocumentTransformer,
}

impl Synchroniser {
    pub fn new(
        source: Arc<dyn SourceClient>,
        uploader: Arc<dyn Uploader>,
        target: SinkTarget,
        policy: SyncPolicy,
        transformer: DocumentTransformer,
    ) -> Self {
        Self {
            source,
            uploader,
            target,
            policy,
            transformer,
        }
    }

    /// Run one full synchronisation pass.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "sync",
            %run_id,
            application_id = %self.target.application_id,
            data_source_id = %self.target.data_source_id
        );
        self.run(run_id).instrument(span).await
    }

    async fn run(&self, run_id: Uuid) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut report = SyncReport::new(run_id);
        debug!(stage = ?SyncStage::Idle, policy = ?self.policy, "[SYNC] Run created");

        info!(stage = ?SyncStage::Fetching, "[SYNC] Fetching documents from source");
        let raw = match fetch_all(self.source.as_ref(), self.policy.rate_limit.page_delay).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(stage = ?SyncStage::Failed, error = %e, "[SYNC][ERROR] Fetch failed");
                return Err(e.into());
            }
        };
        report.documents_fetched = raw.len();

        if raw.is_empty() {
            report.elapsed = started.elapsed();
            info!(stage = ?SyncStage::Done, "[SYNC] No documents fetched, nothing to upload");
            return Ok(report);
        }

        info!(stage = ?SyncStage::Transforming, documents = raw.len(), "[SYNC] Transforming documents");
        let documents: Vec<SinkDocument> = raw
            .iter()
            .map(|record| self.transformer.transform(record))
            .collect();
        drop(raw);

        let batches = create_batches(&documents, self.policy.batch_size)?;
        let total = batches.len();
        info!(
            stage = ?SyncStage::Uploading,
            batches = total,
            batch_size = self.policy.batch_size,
            "[SYNC] Uploading batches"
        );

        for (index, batch) in batches.iter().enumerate() {
            let number = index + 1;
            let outcome = match self.retry_batch(number, batch).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        stage = ?SyncStage::Failed,
                        batch = number,
                        batches = total,
                        uploaded_batches = report.batches_uploaded,
                        error = %e,
                        "[SYNC][ERROR] Upload failed, aborting remaining batches"
                    );
                    return Err(e);
                }
            };

            report.batches_uploaded += 1;
            report.documents_uploaded += outcome.documents;
            report.upload_attempts += outcome.attempts;
            report.failed_documents.extend(outcome.failed_documents);

            if number < total && !self.policy.rate_limit.batch_delay.is_zero() {
                tokio::time::sleep(self.policy.rate_limit.batch_delay).await;
            }
        }

        report.elapsed = started.elapsed();
        info!(
            stage = ?SyncStage::Done,
            documents = report.documents_uploaded,
            batches = report.batches_uploaded,
            rejected = report.failed_documents.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "[SYNC] Synchronisation complete"
        );
        Ok(report)
    }

    /// Upload `batch`, retrying with exponential backoff.
    ///
    /// Makes at most `max_retries` attempts. After failed attempt `n` (when
    /// another attempt follows) waits `retry_delay * 2^(n-1)`.
    pub async fn retry_batch(
        &self,
        number: usize,
        batch: &[SinkDocument],
    ) -> Result<BatchOutcome, SyncError> {
        let max_attempts = self.policy.retry.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.upload_batch(batch).await {
                Ok(response) => {
                    info!(
                        batch = number,
                        documents = batch.len(),
                        attempt,
                        "[SYNC][UPLOAD] Batch uploaded"
                    );
                    return Ok(BatchOutcome {
                        documents: batch.len(),
                        attempts: attempt,
                        failed_documents: response.failed_documents,
                    });
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.policy.retry.delay_for(attempt);
                    warn!(
                        batch = number,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "[SYNC][UPLOAD] Batch upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(SyncError::Upload {
                        batch: number,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// One batch-put call. Per-document rejections are logged, not retried.
    pub async fn upload_batch(&self, batch: &[SinkDocument]) -> Result<BatchPutResponse, SinkError> {
        let request = BatchPutRequest {
            application_id: self.target.application_id.clone(),
            index_id: self.target.index_id.clone(),
            data_source_id: self.target.data_source_id.clone(),
            documents: batch.to_vec(),
        };
        debug!(
            documents = batch.len(),
            first_id = batch.first().map(|d| d.id.as_str()).unwrap_or_default(),
            "[SYNC][UPLOAD] Submitting batch"
        );

        let response = self.uploader.batch_put(&request).await?;
        for failed in &response.failed_documents {
            warn!(
                document_id = %failed.id,
                message = %failed.message,
                "[SYNC][UPLOAD] Sink rejected document"
            );
        }
        Ok(response)
    }
}
