use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::article::ArticleRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Index not found: {0}")]
    IndexNotFound(String),
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),
    #[error("Request rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] super::config::ConfigError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything needed to create an index: typeless mappings plus settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub doc_type: String,
    pub mappings: Value,
    pub settings: Value,
}

/// Index one record. No document id is set, so the store assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAction {
    pub index: String,
    pub doc_type: String,
    pub source: ArticleRecord,
}

impl WriteAction {
    #[must_use]
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, source: ArticleRecord) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub error_type: String,
    pub reason: String,
}

/// Outcome of one action in a bulk request, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub status: u16,
    pub error: Option<BulkItemError>,
}

impl BulkItemResult {
    #[must_use]
    pub fn created() -> Self {
        Self {
            status: 201,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(status: u16, error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(BulkItemError {
                error_type: error_type.into(),
                reason: reason.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Admin and write access to a search index store.
///
/// Missing and already-existing indices are reported as
/// [`StoreError::IndexNotFound`] and [`StoreError::IndexAlreadyExists`];
/// callers decide which of those are expected.
#[async_trait::async_trait]
pub trait IndexStore: Send + Sync {
    async fn delete_index(&self, index: &str) -> StoreResult<()>;

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> StoreResult<()>;

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> StoreResult<()>;

    /// Write a batch. Per-document rejections are returned as items, not as
    /// an `Err`; an `Err` means the batch as a whole did not go through.
    async fn bulk_write(&self, actions: &[WriteAction]) -> StoreResult<Vec<BulkItemResult>>;

    async fn refresh(&self, index: &str) -> StoreResult<()>;

    async fn count(&self, index: &str) -> StoreResult<u64>;
}
