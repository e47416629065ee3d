mod config;
mod elasticsearch;
mod loader;
mod memory;
mod schema;
mod store;

pub use config::{ConfigError, IndexConfig, DEFAULT_DOC_TYPE, DEFAULT_INDEX, DEFAULT_URL};
pub use elasticsearch::{bulk_body, parse_bulk_response, ElasticsearchStore};
pub use loader::{
    to_actions, BulkLoader, BulkOptions, BulkSession, BulkSummary, IndexWriteError, LoadError,
    LoadResult,
};
pub use memory::MemoryStore;
pub use schema::{
    analysis_settings, article_mappings, index_definition, IndexStatus, SchemaError,
    SchemaManager, SchemaResult,
};
pub use store::{
    BulkItemError, BulkItemResult, IndexDefinition, IndexStore, StoreError, StoreResult,
    WriteAction,
};
