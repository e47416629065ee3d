//! In-memory [`IndexStore`] for tests and offline runs.
//!
//! Documents are checked against the index mapping the way a cluster would
//! reject them at write time: `date` fields must be `YYYY-MM-DD`, `keyword`
//! and `text` fields must be strings, and `nested` fields must be objects.
//! Unmapped fields are accepted.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::store::{
    BulkItemResult, IndexDefinition, IndexStore, StoreError, StoreResult, WriteAction,
};

#[derive(Debug, Clone)]
struct MemoryIndex {
    settings: Value,
    properties: Map<String, Value>,
    documents: Vec<Value>,
}

#[derive(Debug, Default)]
struct MemoryState {
    indices: HashMap<String, MemoryIndex>,
    bulk_requests: Vec<usize>,
    /// Bulk requests left before writes start failing; `None` never fails
    bulk_budget: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every bulk request after the first `requests` fail as a whole.
    pub async fn fail_bulk_after(&self, requests: usize) {
        self.state.write().await.bulk_budget = Some(requests);
    }

    pub async fn documents(&self, index: &str) -> Option<Vec<Value>> {
        let state = self.state.read().await;
        state.indices.get(index).map(|i| i.documents.clone())
    }

    /// Current mapping as `{"properties": {...}}`.
    pub async fn mapping(&self, index: &str) -> Option<Value> {
        let state = self.state.read().await;
        state
            .indices
            .get(index)
            .map(|i| serde_json::json!({ "properties": i.properties }))
    }

    pub async fn settings(&self, index: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.indices.get(index).map(|i| i.settings.clone())
    }

    /// Number of actions in each bulk request received so far.
    pub async fn bulk_requests(&self) -> Vec<usize> {
        self.state.read().await.bulk_requests.clone()
    }
}

#[async_trait::async_trait]
impl IndexStore for MemoryStore {
    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .indices
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.indices.contains_key(index) {
            return Err(StoreError::IndexAlreadyExists(index.to_string()));
        }

        state.indices.insert(
            index.to_string(),
            MemoryIndex {
                settings: definition.settings.clone(),
                properties: properties_of(&definition.mappings),
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    async fn put_mapping(&self, index: &str, _doc_type: &str, mapping: &Value) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let target = state
            .indices
            .get_mut(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;

        let incoming = properties_of(mapping);
        for (field, definition) in &incoming {
            if let Some(existing) = target.properties.get(field) {
                let (old, new) = (field_type(existing), field_type(definition));
                if old != new {
                    return Err(StoreError::Rejected {
                        status: 400,
                        reason: format!(
                            "illegal_argument_exception: mapper [{field}] cannot be changed from type [{old}] to [{new}]"
                        ),
                    });
                }
            }
        }

        target.properties.extend(incoming);
        Ok(())
    }

    async fn bulk_write(&self, actions: &[WriteAction]) -> StoreResult<Vec<BulkItemResult>> {
        let mut state = self.state.write().await;

        if let Some(budget) = state.bulk_budget.as_mut() {
            if *budget == 0 {
                return Err(StoreError::UnexpectedResponse(
                    "bulk request dropped by memory store".into(),
                ));
            }
            *budget -= 1;
        }
        state.bulk_requests.push(actions.len());

        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            let Some(target) = state.indices.get_mut(&action.index) else {
                results.push(BulkItemResult::failed(
                    404,
                    "index_not_found_exception",
                    format!("no such index [{}]", action.index),
                ));
                continue;
            };

            let document = serde_json::to_value(&action.source)?;
            match check_object(&target.properties, &document, "") {
                Ok(()) => {
                    target.documents.push(document);
                    results.push(BulkItemResult::created());
                }
                Err(reason) => {
                    results.push(BulkItemResult::failed(400, "mapper_parsing_exception", reason));
                }
            }
        }

        Ok(results)
    }

    async fn refresh(&self, index: &str) -> StoreResult<()> {
        let state = self.state.read().await;
        if state.indices.contains_key(index) {
            Ok(())
        } else {
            Err(StoreError::IndexNotFound(index.to_string()))
        }
    }

    async fn count(&self, index: &str) -> StoreResult<u64> {
        let state = self.state.read().await;
        state
            .indices
            .get(index)
            .map(|i| i.documents.len() as u64)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))
    }
}

fn properties_of(mapping: &Value) -> Map<String, Value> {
    mapping
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn field_type(definition: &Value) -> &str {
    // Fields with sub-properties and no explicit type are objects
    definition
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("object")
}

fn check_object(properties: &Map<String, Value>, document: &Value, prefix: &str) -> Result<(), String> {
    let Some(fields) = document.as_object() else {
        return Err(format!("object mapping for [{prefix}] tried to parse a non-object value"));
    };

    for (name, value) in fields {
        let Some(definition) = properties.get(name) else {
            continue;
        };
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        check_field(definition, value, &path)?;
    }
    Ok(())
}

fn check_field(definition: &Value, value: &Value, path: &str) -> Result<(), String> {
    let values: Vec<&Value> = match value {
        Value::Null => return Ok(()),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        single => vec![single],
    };

    match field_type(definition) {
        "date" => {
            for value in values {
                let accepted = value.as_str().is_some_and(is_strict_date);
                if !accepted {
                    return Err(format!("failed to parse field [{path}] of type [date]: {value}"));
                }
            }
        }
        "keyword" | "text" => {
            if let Some(value) = values.iter().find(|v| !v.is_string()) {
                return Err(format!("failed to parse field [{path}]: expected a string, got {value}"));
            }
        }
        "nested" | "object" => {
            let inner = properties_of(definition);
            for value in values {
                check_object(&inner, value, path)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// `strict_date`: four digit year, two digit month and day, valid calendar day.
fn is_strict_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    shaped && chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}
