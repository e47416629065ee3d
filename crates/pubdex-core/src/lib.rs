pub mod article;
pub mod error;
pub mod index;
pub mod ingest;

pub use article::{ArticleRecord, Author, ContributorRole, RecordSummary};
pub use error::{Error, Result};
pub use index::{
    BulkLoader, BulkOptions, ElasticsearchStore, IndexConfig, IndexStore, MemoryStore,
    SchemaManager,
};
pub use ingest::{IngestPipeline, IngestReport, Source};
