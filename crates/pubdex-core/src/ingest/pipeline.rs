use futures::{Stream, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::assembler::assemble;
use super::parser::parse_file;
use crate::article::ArticleRecord;
use crate::index::{BulkLoader, IndexStatus, IndexWriteError, SchemaManager, WriteAction};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] super::parser::ParseError),
    #[error("Extraction error: {0}")]
    Extraction(#[from] super::extractor::ExtractionError),
    #[error("Extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Schema(#[from] crate::index::SchemaError),
    #[error(transparent)]
    Load(#[from] crate::index::LoadError),
    #[error("Index store error: {0}")]
    Store(#[from] crate::index::StoreError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// What to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// One document; any failure aborts the run
    File(PathBuf),
    /// Every regular file below a directory; bad documents are skipped
    Directory(PathBuf),
}

impl Source {
    pub fn paths(&self) -> IngestResult<Vec<PathBuf>> {
        match self {
            Self::File(path) => Ok(vec![path.clone()]),
            Self::Directory(dir) => discover_files(dir),
        }
    }

    pub fn is_single_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

/// All regular files below `dir`, sorted by path. No extension filter is
/// applied and hidden files are included.
pub fn discover_files(dir: &Path) -> IngestResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Read, parse and assemble one document.
pub fn extract_file(path: &Path) -> IngestResult<ArticleRecord> {
    let document = parse_file(path)?;
    Ok(assemble(&document)?)
}

#[derive(Debug)]
pub struct ExtractionFailure {
    pub path: PathBuf,
    pub error: IngestError,
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

#[derive(Debug, Default)]
pub struct IngestReport {
    /// Documents turned into records
    pub extracted: usize,
    /// Documents skipped in directory mode
    pub failures: Vec<ExtractionFailure>,
    /// Records the store accepted
    pub indexed: usize,
    pub write_errors: Vec<IndexWriteError>,
    pub index_status: Option<IndexStatus>,
    /// Documents in the index after the run
    pub index_count: Option<u64>,
}

impl IngestReport {
    pub fn error_count(&self) -> usize {
        self.failures.len() + self.write_errors.len()
    }
}

pub struct IngestPipeline {
    workers: usize,
}

impl IngestPipeline {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Extract documents on the blocking pool with at most `workers` in
    /// flight. Results come out in input order.
    pub fn extract(
        &self,
        paths: Vec<PathBuf>,
    ) -> impl Stream<Item = (PathBuf, IngestResult<ArticleRecord>)> {
        futures::stream::iter(paths)
            .map(|path| async move {
                let task_path = path.clone();
                let result = tokio::task::spawn_blocking(move || extract_file(&task_path))
                    .await
                    .map_err(IngestError::from)
                    .and_then(|result| result);
                (path, result)
            })
            .buffered(self.workers)
    }

    /// Extract everything and write each record to `sink` as pretty JSON,
    /// without touching any index.
    pub async fn run_dry<W: Write>(&self, source: &Source, sink: &mut W) -> IngestResult<IngestReport> {
        let mut report = IngestReport::default();
        let mut records = std::pin::pin!(self.extract(source.paths()?));

        while let Some((path, result)) = records.next().await {
            match result {
                Ok(record) => {
                    // One write per record so log lines never land inside it
                    let json = serde_json::to_string_pretty(&record)?;
                    writeln!(sink, "{json}")?;
                    report.extracted += 1;
                }
                Err(error) => record_failure(source, path, error, &mut report)?,
            }
        }

        tracing::info!(
            extracted = report.extracted,
            failed = report.failures.len(),
            "dry run complete"
        );
        Ok(report)
    }

    /// Ensure the index, then stream every extracted record into the loader.
    pub async fn run(
        &self,
        source: &Source,
        schema: &SchemaManager,
        loader: &BulkLoader,
        reset: bool,
    ) -> IngestResult<IngestReport> {
        let paths = source.paths()?;
        let mut report = IngestReport {
            index_status: Some(schema.ensure_index(reset).await?),
            ..Default::default()
        };

        let mut session = loader.session();
        let mut records = std::pin::pin!(self.extract(paths));

        while let Some((path, result)) = records.next().await {
            match result {
                Ok(record) => {
                    report.extracted += 1;
                    session
                        .push(WriteAction::new(schema.index(), schema.doc_type(), record))
                        .await?;
                }
                Err(error) => record_failure(source, path, error, &mut report)?,
            }
        }

        let summary = session.finish().await?;
        report.indexed = summary.success_count;
        report.write_errors = summary.errors;

        let store = schema.store();
        store.refresh(schema.index()).await?;
        report.index_count = Some(store.count(schema.index()).await?);

        tracing::info!(
            index = schema.index(),
            extracted = report.extracted,
            indexed = report.indexed,
            errors = report.error_count(),
            "ingest complete"
        );
        Ok(report)
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::new(workers)
    }
}

fn record_failure(
    source: &Source,
    path: PathBuf,
    error: IngestError,
    report: &mut IngestReport,
) -> IngestResult<()> {
    if source.is_single_file() {
        return Err(error);
    }

    tracing::warn!("Skipping {}: {}", path.display(), error);
    report.failures.push(ExtractionFailure { path, error });
    Ok(())
}
