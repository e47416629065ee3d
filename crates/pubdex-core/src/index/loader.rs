use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::config::IndexConfig;
use super::store::{IndexStore, StoreError, WriteAction};
use crate::article::{ArticleRecord, RecordSummary};

/// Action metadata line overhead per document in a bulk body.
const ACTION_OVERHEAD: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Bulk request failed after {indexed} documents were indexed: {source}")]
    Transport {
        indexed: usize,
        #[source]
        source: StoreError,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// One document the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWriteError {
    /// Zero-based position of the action in the submitted stream
    pub position: usize,
    pub status: u16,
    pub error_type: String,
    pub reason: String,
    pub record: RecordSummary,
}

impl std::fmt::Display for IndexWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "document #{} ({}): {} {}: {}",
            self.position, self.record, self.status, self.error_type, self.reason
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub success_count: usize,
    pub errors: Vec<IndexWriteError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Maximum actions per bulk request
    pub chunk_size: usize,
    /// Maximum serialized bytes per bulk request
    pub max_chunk_bytes: usize,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            max_chunk_bytes: 100 * 1024 * 1024,
        }
    }
}

impl BulkOptions {
    #[must_use]
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            chunk_size: config.batch_size.max(1),
            max_chunk_bytes: config.max_batch_bytes.max(1),
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_chunk_bytes(mut self, max_chunk_bytes: usize) -> Self {
        self.max_chunk_bytes = max_chunk_bytes.max(1);
        self
    }
}

/// One write action per record. No document id is assigned, so loading the
/// same records twice without a reset indexes them twice.
pub fn to_actions<'a, I>(index: &'a str, doc_type: &'a str, records: I) -> impl Iterator<Item = WriteAction> + 'a
where
    I: IntoIterator<Item = ArticleRecord>,
    I::IntoIter: 'a,
{
    records
        .into_iter()
        .map(move |record| WriteAction::new(index, doc_type, record))
}

/// Best-effort bulk writer.
///
/// Rejected documents are collected and the rest of the stream keeps going.
/// A request that fails as a whole stops the load; earlier requests stay
/// committed.
pub struct BulkLoader {
    store: Arc<dyn IndexStore>,
    options: BulkOptions,
}

impl BulkLoader {
    pub fn new(store: Arc<dyn IndexStore>, options: BulkOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> BulkOptions {
        self.options
    }

    /// Start an incremental load; push actions and call
    /// [`BulkSession::finish`] to flush the tail.
    pub fn session(&self) -> BulkSession<'_> {
        BulkSession {
            loader: self,
            pending: Vec::new(),
            pending_bytes: 0,
            submitted: 0,
            summary: BulkSummary::default(),
        }
    }

    pub async fn submit<S>(&self, actions: S) -> LoadResult<BulkSummary>
    where
        S: Stream<Item = WriteAction>,
    {
        let mut actions = std::pin::pin!(actions);
        let mut session = self.session();
        while let Some(action) = actions.next().await {
            session.push(action).await?;
        }
        session.finish().await
    }

    pub async fn submit_iter<I>(&self, actions: I) -> LoadResult<BulkSummary>
    where
        I: IntoIterator<Item = WriteAction>,
    {
        self.submit(futures::stream::iter(actions)).await
    }
}

pub struct BulkSession<'a> {
    loader: &'a BulkLoader,
    pending: Vec<WriteAction>,
    pending_bytes: usize,
    /// Actions already sent in earlier requests
    submitted: usize,
    summary: BulkSummary,
}

impl BulkSession<'_> {
    pub async fn push(&mut self, action: WriteAction) -> LoadResult<()> {
        let size = serde_json::to_vec(&action.source)?.len() + ACTION_OVERHEAD;
        let options = self.loader.options;

        if !self.pending.is_empty() && self.pending_bytes + size > options.max_chunk_bytes {
            self.flush().await?;
        }

        self.pending.push(action);
        self.pending_bytes += size;

        if self.pending.len() >= options.chunk_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Documents accepted so far.
    pub fn indexed(&self) -> usize {
        self.summary.success_count
    }

    pub async fn finish(mut self) -> LoadResult<BulkSummary> {
        self.flush().await?;
        Ok(self.summary)
    }

    async fn flush(&mut self) -> LoadResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;

        let results = self
            .loader
            .store
            .bulk_write(&batch)
            .await
            .map_err(|source| LoadError::Transport {
                indexed: self.summary.success_count,
                source,
            })?;

        let mut accepted = 0;
        for (offset, (action, result)) in batch.iter().zip(&results).enumerate() {
            if result.is_success() {
                accepted += 1;
                continue;
            }

            let (error_type, reason) = result.error.as_ref().map_or_else(
                || ("unknown".to_string(), String::new()),
                |e| (e.error_type.clone(), e.reason.clone()),
            );
            let error = IndexWriteError {
                position: self.submitted + offset,
                status: result.status,
                error_type,
                reason,
                record: action.source.summary(),
            };
            tracing::warn!("Rejected {error}");
            self.summary.errors.push(error);
        }

        self.summary.success_count += accepted;
        self.submitted += batch.len();
        tracing::debug!(
            actions = batch.len(),
            accepted,
            total = self.summary.success_count,
            "bulk request complete"
        );
        Ok(())
    }
}
