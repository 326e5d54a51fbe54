//! # contract: the two seams of the pipeline
//!
//! [`SourceClient`] is where documents come from and [`Uploader`] is where they
//! go. The orchestrator in [`crate::synchronise`] only ever talks to these
//! traits, so the HTTP source client, the Q Business binding in the CLI crate
//! and test doubles are interchangeable.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`; `MockSourceClient` and
//! `MockUploader` are exported when the `test-export-mocks` feature is on
//! (it is by default) so integration tests in other crates can use them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::document::{RawDocument, SinkDocument};
use crate::error::{SinkError, SourceError};

/// One page of results from the source listing endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub documents: Vec<RawDocument>,
    pub has_more: bool,
    pub total_count: u64,
}

/// Read side: an external API serving raw documents.
///
/// Implementations perform exactly one request per call and never retry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page of the listing. Pages are numbered from 1.
    async fn fetch_page(&self, page: u32) -> Result<Page, SourceError>;

    /// Fetch a single document by its source id.
    async fn fetch_by_id(&self, id: &str) -> Result<RawDocument, SourceError>;

    /// Fetch documents changed since the given instant.
    async fn fetch_incremental(&self, since: DateTime<Utc>)
        -> Result<Vec<RawDocument>, SourceError>;

    /// Probe the source's health endpoint. Failures are reported as `false`.
    async fn test_connection(&self) -> bool;
}

/// Where a batch goes in the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    pub application_id: String,
    pub index_id: String,
    pub data_source_id: String,
}

/// A single batch-put call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPutRequest {
    pub application_id: String,
    pub index_id: String,
    /// The data source the documents are attributed to.
    pub data_source_id: String,
    pub documents: Vec<SinkDocument>,
}

/// A document the sink refused while accepting the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPutResponse {
    pub failed_documents: Vec<FailedDocument>,
}

/// Write side: a managed index accepting documents in batches.
///
/// Uploading a document whose id already exists overwrites it, which is what
/// makes re-submitting a whole batch after a failure safe.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Submit all documents of `request` in one call.
    ///
    /// `Err` means the call itself failed and nothing can be assumed about
    /// what was stored. Individual rejections come back in the response.
    async fn batch_put(&self, request: &BatchPutRequest) -> Result<BatchPutResponse, SinkError>;
}
