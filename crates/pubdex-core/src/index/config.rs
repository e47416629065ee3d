use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_URL: &str = "http://localhost:9200/";
pub const DEFAULT_INDEX: &str = "pubmed";
pub const DEFAULT_DOC_TYPE: &str = "article";

/// Where and how records are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the Elasticsearch cluster
    pub url: String,
    /// Destination index name
    pub index: String,
    /// Content type name; only sent to the cluster in legacy mode
    pub doc_type: String,
    /// Send `_type` in requests (clusters older than 7.x)
    pub legacy_types: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Maximum number of actions per bulk request
    pub batch_size: usize,
    /// Maximum serialized size of one bulk request
    pub max_batch_bytes: usize,
    pub connect_timeout_seconds: u32,
    pub request_timeout_seconds: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            index: DEFAULT_INDEX.to_string(),
            doc_type: DEFAULT_DOC_TYPE.to_string(),
            legacy_types: false,
            username: None,
            password: None,
            batch_size: 500,
            max_batch_bytes: 100 * 1024 * 1024,
            connect_timeout_seconds: 10,
            request_timeout_seconds: 120,
        }
    }
}

impl IndexConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from `PUBDEX_*` variables resolved through `lookup`.
    ///
    /// Numbers are parsed here but nothing else is checked. Call
    /// [`IndexConfig::validate`] once any overrides have been applied.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("PUBDEX_ES_URL") {
            config.url = url;
        }
        if let Some(index) = lookup("PUBDEX_INDEX") {
            config.index = index;
        }
        if let Some(doc_type) = lookup("PUBDEX_DOC_TYPE") {
            config.doc_type = doc_type;
        }
        if let Some(legacy) = lookup("PUBDEX_LEGACY_TYPES") {
            config.legacy_types = legacy == "1" || legacy.eq_ignore_ascii_case("true");
        }
        config.username = lookup("PUBDEX_ES_USERNAME");
        config.password = lookup("PUBDEX_ES_PASSWORD");

        if let Some(value) = lookup("PUBDEX_BATCH_SIZE") {
            config.batch_size = parse_number("PUBDEX_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("PUBDEX_MAX_BATCH_BYTES") {
            config.max_batch_bytes = parse_number("PUBDEX_MAX_BATCH_BYTES", &value)?;
        }
        if let Some(value) = lookup("PUBDEX_CONNECT_TIMEOUT") {
            config.connect_timeout_seconds = parse_number("PUBDEX_CONNECT_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("PUBDEX_REQUEST_TIMEOUT") {
            config.request_timeout_seconds = parse_number("PUBDEX_REQUEST_TIMEOUT", &value)?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.parsed_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }
        validate_index_name(&self.index)?;
        if self.doc_type.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "doc_type",
                value: String::new(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size",
                value: "0".into(),
            });
        }
        if self.max_batch_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_batch_bytes",
                value: "0".into(),
            });
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::PasswordWithoutUsername);
        }
        Ok(())
    }

    /// The cluster URL, normalized to end with `/` so paths join under it.
    pub fn parsed_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {e}", self.url)))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Elasticsearch index naming rules.
fn validate_index_name(name: &str) -> Result<(), ConfigError> {
    let invalid = name.is_empty()
        || name.len() > 255
        || name.starts_with(['-', '_', '+'])
        || name == "."
        || name == ".."
        || name.chars().any(|c| {
            c.is_ascii_uppercase()
                || c.is_whitespace()
                || matches!(c, '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ',' | '#' | ':')
        });

    if invalid {
        Err(ConfigError::InvalidIndexName(name.to_string()))
    } else {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Invalid index name: {0}")]
    InvalidIndexName(String),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("A password was configured without a username")]
    PasswordWithoutUsername,
}
