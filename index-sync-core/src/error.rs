//! Error taxonomy for a synchronisation run.
//!
//! Configuration and fetch errors are fatal. Sink errors are retried by the
//! orchestrator and only become fatal once the retry budget is spent.
//! Per-document rejections reported by the sink are not errors at all; see
//! [`crate::contract::FailedDocument`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("unexpected source payload: {0}")]
    UnexpectedShape(String),
}

#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("sink request failed: {0}")]
    Service(String),

    #[error("document {id} rejected before upload: {reason}")]
    InvalidDocument { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("batch {batch} failed after {attempts} attempts: {source}")]
    Upload {
        batch: usize,
        attempts: u32,
        #[source]
        source: SinkError,
    },
}
