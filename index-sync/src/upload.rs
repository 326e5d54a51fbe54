#![doc = "Uploader integration for the CLI: binds the core `Uploader` trait to Amazon Q Business."]
//
//! # Uploader Integration (CLI <-> Core)
//!
//! [`QBusinessUploader`] implements [`Uploader`] over the `BatchPutDocument`
//! API. The SDK's own retries are disabled: retry and backoff belong to the
//! orchestrator in `index-sync-core`, which knows about batches.
//!
//! [`DryRunUploader`] accepts every batch and only logs it.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_qbusiness::config::Region;
use aws_sdk_qbusiness::error::DisplayErrorContext;
use aws_sdk_qbusiness::primitives::{Blob, DateTime};
use aws_sdk_qbusiness::types::{
    ContentType as QContentType, Document, DocumentAttribute, DocumentAttributeValue,
    DocumentContent,
};
use index_sync_core::config::SinkSettings;
use index_sync_core::contract::{BatchPutRequest, BatchPutResponse, FailedDocument, Uploader};
use index_sync_core::document::{AttributeValue, ContentType, SinkDocument};
use index_sync_core::error::SinkError;

/// Applied to every sink call, matching the source client's request timeout.
pub const SINK_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QBusinessUploader {
    client: aws_sdk_qbusiness::Client,
}

impl QBusinessUploader {
    /// Resolve AWS credentials the usual way (environment, profile, IMDS)
    /// for the configured region.
    pub async fn from_settings(sink: &SinkSettings) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(sink.region.clone()))
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(SINK_OPERATION_TIMEOUT)
                    .build(),
            )
            .load()
            .await;
        tracing::info!(
            region = %sink.region,
            application_id = %sink.application_id,
            "Initialized Q Business uploader"
        );
        Self {
            client: aws_sdk_qbusiness::Client::new(&aws_config),
        }
    }
}

fn invalid(doc: &SinkDocument, reason: impl std::fmt::Display) -> SinkError {
    SinkError::InvalidDocument {
        id: doc.id.clone(),
        reason: reason.to_string(),
    }
}

pub fn to_qbusiness_document(doc: &SinkDocument) -> Result<Document, SinkError> {
    let attributes = doc
        .attributes
        .iter()
        .map(|(name, value)| {
            let value = match value {
                AttributeValue::String(s) => DocumentAttributeValue::StringValue(s.clone()),
                AttributeValue::StringList(list) => {
                    DocumentAttributeValue::StringListValue(list.clone())
                }
                AttributeValue::Date(at) => {
                    DocumentAttributeValue::DateValue(DateTime::from_millis(at.timestamp_millis()))
                }
            };
            DocumentAttribute::builder()
                .name(name)
                .value(value)
                .build()
                .map_err(|e| invalid(doc, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let content_type = match doc.content.content_type {
        ContentType::PlainText => QContentType::PlainText,
    };

    Document::builder()
        .id(&doc.id)
        .title(&doc.title)
        .content(DocumentContent::Blob(Blob::new(doc.content.bytes.clone())))
        .content_type(content_type)
        .set_attributes(Some(attributes))
        .build()
        .map_err(|e| invalid(doc, e))
}

#[async_trait]
impl Uploader for QBusinessUploader {
    async fn batch_put(&self, request: &BatchPutRequest) -> Result<BatchPutResponse, SinkError> {
        let documents = request
            .documents
            .iter()
            .map(to_qbusiness_document)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            application_id = %request.application_id,
            index_id = %request.index_id,
            data_source_id = %request.data_source_id,
            documents = documents.len(),
            "Calling BatchPutDocument"
        );

        let output = self
            .client
            .batch_put_document()
            .application_id(&request.application_id)
            .index_id(&request.index_id)
            .set_documents(Some(documents))
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                tracing::error!(error = %message, "API error calling BatchPutDocument");
                SinkError::Service(message)
            })?;

        let failed_documents = output
            .failed_documents()
            .iter()
            .map(|failed| FailedDocument {
                id: failed.id().unwrap_or_default().to_owned(),
                message: failed
                    .error()
                    .and_then(|e| e.error_message())
                    .unwrap_or("no error message")
                    .to_owned(),
            })
            .collect();

        Ok(BatchPutResponse { failed_documents })
    }
}

/// Logs what would be uploaded and reports every batch as accepted.
#[derive(Debug, Default)]
pub struct DryRunUploader;

#[async_trait]
impl Uploader for DryRunUploader {
    async fn batch_put(&self, request: &BatchPutRequest) -> Result<BatchPutResponse, SinkError> {
        tracing::info!(
            data_source_id = %request.data_source_id,
            documents = request.documents.len(),
            "[DRY RUN] Would upload batch"
        );
        for doc in &request.documents {
            tracing::debug!(
                id = %doc.id,
                title = %doc.title,
                bytes = doc.content.bytes.len(),
                attributes = doc.attributes.len(),
                "[DRY RUN] Document"
            );
        }
        Ok(BatchPutResponse::default())
    }
}
