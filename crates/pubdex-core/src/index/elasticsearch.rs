use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use std::time::Duration;
use url::Url;

use super::config::IndexConfig;
use super::store::{
    BulkItemResult, IndexDefinition, IndexStore, StoreError, StoreResult, WriteAction,
};

const USER_AGENT: &str = concat!("pubdex/", env!("CARGO_PKG_VERSION"));
const NDJSON: &str = "application/x-ndjson";

/// [`IndexStore`] backed by the Elasticsearch REST API.
pub struct ElasticsearchStore {
    client: Client,
    base: Url,
    legacy_types: bool,
    credentials: Option<(String, Option<String>)>,
}

impl ElasticsearchStore {
    pub fn new(config: &IndexConfig) -> StoreResult<Self> {
        let base = config.parsed_url()?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(u64::from(config.connect_timeout_seconds)))
            .timeout(Duration::from_secs(u64::from(config.request_timeout_seconds)))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base,
            legacy_types: config.legacy_types,
            credentials: config
                .username
                .clone()
                .map(|username| (username, config.password.clone())),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        Ok(self.base.join(path)?)
    }

    fn request(&self, method: Method, path: &str) -> StoreResult<RequestBuilder> {
        let request = self.client.request(method, self.endpoint(path)?);
        Ok(match &self.credentials {
            Some((username, password)) => request.basic_auth(username, password.as_ref()),
            None => request,
        })
    }

    /// Send a request and decode its JSON body, mapping error statuses.
    async fn send(&self, request: RequestBuilder, index: &str) -> StoreResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_for_status(status, &body, index));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait::async_trait]
impl IndexStore for ElasticsearchStore {
    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        let request = self.request(Method::DELETE, index)?;
        self.send(request, index).await?;
        tracing::debug!(index, "deleted index");
        Ok(())
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> StoreResult<()> {
        let mappings = if self.legacy_types {
            let mut typed = Map::new();
            typed.insert(definition.doc_type.clone(), definition.mappings.clone());
            Value::Object(typed)
        } else {
            definition.mappings.clone()
        };
        let body = json!({
            "settings": definition.settings,
            "mappings": mappings,
        });

        let request = self.request(Method::PUT, index)?.json(&body);
        self.send(request, index).await?;
        tracing::debug!(index, "created index");
        Ok(())
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> StoreResult<()> {
        let path = if self.legacy_types {
            format!("{index}/_mapping/{doc_type}")
        } else {
            format!("{index}/_mapping")
        };

        let request = self.request(Method::PUT, &path)?.json(mapping);
        self.send(request, index).await?;
        tracing::debug!(index, "updated mapping");
        Ok(())
    }

    async fn bulk_write(&self, actions: &[WriteAction]) -> StoreResult<Vec<BulkItemResult>> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }

        let body = bulk_body(actions, self.legacy_types)?;
        let request = self
            .request(Method::POST, "_bulk")?
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(body);

        let index = actions.first().map_or("", |action| action.index.as_str());
        let response = self.send(request, index).await?;
        parse_bulk_response(&response, actions.len())
    }

    async fn refresh(&self, index: &str) -> StoreResult<()> {
        let request = self.request(Method::POST, &format!("{index}/_refresh"))?;
        self.send(request, index).await?;
        Ok(())
    }

    async fn count(&self, index: &str) -> StoreResult<u64> {
        let request = self.request(Method::GET, &format!("{index}/_count"))?;
        let response = self.send(request, index).await?;

        response
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::UnexpectedResponse(format!("no count in {response}")))
    }
}

/// Serialize actions as an NDJSON bulk body: one action line and one source
/// line per record, newline terminated.
pub fn bulk_body(actions: &[WriteAction], legacy_types: bool) -> StoreResult<String> {
    let mut body = String::new();

    for action in actions {
        let meta = if legacy_types {
            json!({ "index": { "_index": action.index, "_type": action.doc_type } })
        } else {
            json!({ "index": { "_index": action.index } })
        };
        let _ = writeln!(body, "{meta}");
        let _ = writeln!(body, "{}", serde_json::to_string(&action.source)?);
    }

    Ok(body)
}

/// Pull per-item outcomes out of a `_bulk` response, in request order.
pub fn parse_bulk_response(response: &Value, expected: usize) -> StoreResult<Vec<BulkItemResult>> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::UnexpectedResponse("bulk response has no items".into()))?;

    if items.len() != expected {
        return Err(StoreError::UnexpectedResponse(format!(
            "bulk response has {} items for {expected} actions",
            items.len()
        )));
    }

    items.iter().map(parse_bulk_item).collect()
}

fn parse_bulk_item(item: &Value) -> StoreResult<BulkItemResult> {
    // Each item is keyed by its operation: {"index": {...}}
    let outcome = item
        .as_object()
        .and_then(|object| object.values().next())
        .ok_or_else(|| StoreError::UnexpectedResponse(format!("malformed bulk item: {item}")))?;

    let status = outcome
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok())
        .ok_or_else(|| StoreError::UnexpectedResponse(format!("bulk item without status: {item}")))?;

    Ok(match outcome.get("error") {
        None | Some(Value::Null) => BulkItemResult {
            status,
            error: None,
        },
        Some(error) => {
            let (error_type, reason) = error_parts(error);
            BulkItemResult::failed(status, error_type, reason)
        }
    })
}

/// `type` and `reason` of an error object; older clusters send a bare string.
fn error_parts(error: &Value) -> (String, String) {
    match error {
        Value::String(reason) => ("error".to_string(), reason.clone()),
        _ => {
            let field = |name: &str| error.get(name).and_then(Value::as_str).map(str::to_string);
            (
                field("type").unwrap_or_else(|| "error".to_string()),
                field("reason").unwrap_or_else(|| error.to_string()),
            )
        }
    }
}

fn error_for_status(status: StatusCode, body: &str, index: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));
    let (error_type, reason) = error.map_or_else(
        || (String::new(), body.trim().to_string()),
        error_parts,
    );

    match error_type.as_str() {
        "index_not_found_exception" => StoreError::IndexNotFound(index.to_string()),
        "resource_already_exists_exception" | "index_already_exists_exception" => {
            StoreError::IndexAlreadyExists(index.to_string())
        }
        _ if status == StatusCode::NOT_FOUND => StoreError::IndexNotFound(index.to_string()),
        "" => StoreError::Rejected {
            status: status.as_u16(),
            reason,
        },
        _ => StoreError::Rejected {
            status: status.as_u16(),
            reason: format!("{error_type}: {reason}"),
        },
    }
}
