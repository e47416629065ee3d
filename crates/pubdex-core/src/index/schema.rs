use serde_json::{json, Value};
use std::sync::Arc;

use super::store::{IndexDefinition, IndexStore, StoreError};

#[derive(Debug, thiserror::Error)]
#[error("Failed to {operation} index {index}: {source}")]
pub struct SchemaError {
    pub operation: &'static str,
    pub index: String,
    #[source]
    pub source: StoreError,
}

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// A new index was created with the full settings and mappings
    Created,
    /// The index already existed; mappings were merged into it
    Updated,
}

impl IndexStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analyzer settings: `sci_text` lowercases, drops stop words and emits
/// unigrams plus 2 and 3 word shingles.
#[must_use]
pub fn analysis_settings() -> Value {
    json!({
        "analysis": {
            "analyzer": {
                "sci_text": {
                    "tokenizer": "standard",
                    "filter": ["lowercase", "stop", "sci_shingle"]
                }
            },
            "filter": {
                "sci_shingle": {
                    "type": "shingle",
                    "output_unigrams": true,
                    "min_shingle_size": 2,
                    "max_shingle_size": 3
                }
            }
        }
    })
}

/// Field mappings for [`ArticleRecord`](crate::ArticleRecord) documents.
#[must_use]
pub fn article_mappings() -> Value {
    let shingled = json!({ "type": "text", "analyzer": "sci_text" });
    let basic = json!({ "type": "text", "analyzer": "standard" });
    let identifier = json!({ "type": "keyword" });
    let with_raw = json!({
        "type": "text",
        "fields": { "raw": { "type": "keyword" } }
    });
    let person = json!({
        "type": "nested",
        "properties": {
            "surname": with_raw,
            "given-names": with_raw,
            "full-name": with_raw
        }
    });

    json!({
        "properties": {
            "journal": with_raw,
            "title": shingled,
            "abstract": shingled,
            "body": shingled,
            "figure_captions": shingled,
            "acknowledgments": basic,
            "keywords": { "type": "keyword" },
            "authors": person,
            "editors": person,
            "date": { "type": "date", "format": "strict_date" },
            "volume": identifier,
            "issue": identifier,
            "fpage": identifier,
            "pmid": identifier,
            "pmc": identifier,
            "doi": identifier
        }
    })
}

#[must_use]
pub fn index_definition(doc_type: &str) -> IndexDefinition {
    IndexDefinition {
        doc_type: doc_type.to_string(),
        mappings: article_mappings(),
        settings: analysis_settings(),
    }
}

/// Creates or updates the destination index.
pub struct SchemaManager {
    store: Arc<dyn IndexStore>,
    index: String,
    doc_type: String,
}

impl SchemaManager {
    pub fn new(store: Arc<dyn IndexStore>, index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Make sure the index exists with the article mapping.
    ///
    /// With `reset` any existing index is dropped first. Otherwise an existing
    /// index keeps its data and only gets the mapping merged in; a conflicting
    /// mapping is an error. Analysis settings are fixed at creation, so an
    /// index created without the `sci_text` analyzer needs `reset` to get it.
    pub async fn ensure_index(&self, reset: bool) -> SchemaResult<IndexStatus> {
        if reset {
            match self.store.delete_index(&self.index).await {
                Ok(()) => tracing::info!(index = %self.index, "dropped existing index"),
                Err(StoreError::IndexNotFound(_)) => {}
                Err(e) => return Err(self.error("delete", e)),
            }
        }

        let definition = index_definition(&self.doc_type);
        match self.store.create_index(&self.index, &definition).await {
            Ok(()) => {
                tracing::info!(index = %self.index, "created index");
                Ok(IndexStatus::Created)
            }
            Err(StoreError::IndexAlreadyExists(_)) => {
                self.store
                    .put_mapping(&self.index, &self.doc_type, &definition.mappings)
                    .await
                    .map_err(|e| self.error("update mapping of", e))?;
                tracing::info!(index = %self.index, "updated mapping of existing index");
                tracing::debug!(
                    index = %self.index,
                    "analysis settings of an existing index are left as created"
                );
                Ok(IndexStatus::Updated)
            }
            Err(e) => Err(self.error("create", e)),
        }
    }

    fn error(&self, operation: &'static str, source: StoreError) -> SchemaError {
        SchemaError {
            operation,
            index: self.index.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::ArticleRecord;
    use crate::index::memory::MemoryStore;
    use crate::index::store::WriteAction;

    fn manager(store: &MemoryStore) -> SchemaManager {
        SchemaManager::new(Arc::new(store.clone()), "pubmed", "article")
    }

    #[test]
    fn test_mappings_cover_record_fields() {
        let mappings = article_mappings();
        let properties = mappings["properties"].as_object().unwrap();
        let record = serde_json::to_value(ArticleRecord::default()).unwrap();

        for field in record.as_object().unwrap().keys() {
            assert!(properties.contains_key(field), "unmapped field {field}");
        }
        assert_eq!(properties["authors"]["type"], "nested");
        assert_eq!(properties["date"]["type"], "date");
        assert_eq!(properties["keywords"]["type"], "keyword");
        assert_eq!(properties["title"]["analyzer"], "sci_text");
        assert_eq!(properties["journal"]["fields"]["raw"]["type"], "keyword");
    }

    #[test]
    fn test_shingle_filter() {
        let settings = analysis_settings();
        let shingle = &settings["analysis"]["filter"]["sci_shingle"];
        assert_eq!(shingle["type"], "shingle");
        assert_eq!(shingle["output_unigrams"], true);
        assert_eq!(shingle["min_shingle_size"], 2);
        assert_eq!(shingle["max_shingle_size"], 3);
    }

    #[tokio::test]
    async fn test_ensure_index_creates_then_updates() {
        let store = MemoryStore::new();
        let schema = manager(&store);

        assert_eq!(schema.ensure_index(false).await.unwrap(), IndexStatus::Created);
        assert_eq!(store.settings("pubmed").await, Some(analysis_settings()));

        let actions = vec![WriteAction::new("pubmed", "article", ArticleRecord::default())];
        store.bulk_write(&actions).await.unwrap();

        assert_eq!(schema.ensure_index(false).await.unwrap(), IndexStatus::Updated);
        assert_eq!(store.count("pubmed").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ensure_index_reset_drops_data() {
        let store = MemoryStore::new();
        let schema = manager(&store);

        // Nothing to drop yet
        assert_eq!(schema.ensure_index(true).await.unwrap(), IndexStatus::Created);

        let actions = vec![WriteAction::new("pubmed", "article", ArticleRecord::default())];
        store.bulk_write(&actions).await.unwrap();

        assert_eq!(schema.ensure_index(true).await.unwrap(), IndexStatus::Created);
        assert_eq!(store.count("pubmed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conflicting_mapping_surfaces() {
        let store = MemoryStore::new();
        let conflicting = IndexDefinition {
            doc_type: "article".into(),
            mappings: json!({ "properties": { "date": { "type": "keyword" } } }),
            settings: json!({}),
        };
        store.create_index("pubmed", &conflicting).await.unwrap();

        let err = manager(&store).ensure_index(false).await.unwrap_err();
        assert_eq!(err.operation, "update mapping of");
        assert!(matches!(err.source, StoreError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_update_leaves_existing_settings() {
        let store = MemoryStore::new();
        let bare = IndexDefinition {
            doc_type: "article".into(),
            mappings: json!({ "properties": {} }),
            settings: json!({}),
        };
        store.create_index("pubmed", &bare).await.unwrap();

        let schema = manager(&store);
        assert_eq!(schema.ensure_index(false).await.unwrap(), IndexStatus::Updated);
        assert_eq!(store.settings("pubmed").await, Some(json!({})));
        assert!(store.mapping("pubmed").await.unwrap()["properties"]["title"].is_object());

        assert_eq!(schema.ensure_index(true).await.unwrap(), IndexStatus::Created);
        assert_eq!(store.settings("pubmed").await, Some(analysis_settings()));
    }
}
