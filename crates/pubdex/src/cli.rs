use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use pubdex_core::index::ConfigError;
use pubdex_core::{IndexConfig, Source};

#[derive(Parser, Debug)]
#[command(
    name = "pubdex",
    about = "Load PubMed Central article XML into a search index",
    version
)]
#[command(group(ArgGroup::new("source").required(true).args(["file", "dir"])))]
pub struct Cli {
    /// A single article to ingest; any failure aborts the run
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// A directory of articles, walked recursively; bad documents are skipped
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Print records to stderr instead of indexing them
    #[arg(long)]
    pub dry: bool,

    /// Delete and recreate the index before loading
    #[arg(long)]
    pub drop: bool,

    /// Elasticsearch URL (overrides PUBDEX_ES_URL)
    #[arg(long, value_name = "URL")]
    pub es_url: Option<String>,

    /// Index name (overrides PUBDEX_INDEX)
    #[arg(long, value_name = "NAME")]
    pub index: Option<String>,

    /// Documents per bulk request (overrides PUBDEX_BATCH_SIZE)
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Documents extracted in parallel (default: available cores)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

impl Cli {
    pub fn source(&self) -> Option<Source> {
        match (&self.file, &self.dir) {
            (Some(file), _) => Some(Source::File(file.clone())),
            (None, Some(dir)) => Some(Source::Directory(dir.clone())),
            (None, None) => None,
        }
    }

    /// Environment configuration with command-line flags laid over it.
    pub fn index_config(&self) -> Result<IndexConfig, ConfigError> {
        self.overlay(IndexConfig::from_env()?)
    }

    /// Apply the flags to `config`, then validate the result.
    fn overlay(&self, mut config: IndexConfig) -> Result<IndexConfig, ConfigError> {
        if let Some(url) = &self.es_url {
            config.url.clone_from(url);
        }
        if let Some(index) = &self.index {
            config.index.clone_from(index);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_source_is_exclusive() {
        assert!(Cli::try_parse_from(["pubdex", "--file", "a.nxml", "--dir", "corpus"]).is_err());
        assert!(Cli::try_parse_from(["pubdex", "--dry"]).is_err());

        let cli = Cli::try_parse_from(["pubdex", "--dir", "corpus", "--drop"]).unwrap();
        assert_eq!(cli.source(), Some(Source::Directory(PathBuf::from("corpus"))));
        assert!(cli.drop);
        assert!(!cli.dry);
    }

    #[test]
    fn test_flags_overlay_config() {
        let cli = Cli::try_parse_from([
            "pubdex",
            "--file",
            "a.nxml",
            "--es-url",
            "http://search:9200",
            "--index",
            "pmc-oa",
            "--batch-size",
            "50",
        ])
        .unwrap();

        let config = cli.overlay(IndexConfig::default()).unwrap();
        assert_eq!(config.url, "http://search:9200");
        assert_eq!(config.index, "pmc-oa");
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_flags_replace_invalid_environment_values() {
        let env = IndexConfig {
            url: "ftp://search/".into(),
            index: "Bad Name".into(),
            ..Default::default()
        };

        let cli = Cli::try_parse_from(["pubdex", "--file", "a.nxml"]).unwrap();
        assert!(matches!(
            cli.overlay(env.clone()),
            Err(ConfigError::UnsupportedScheme(_))
        ));

        let cli = Cli::try_parse_from([
            "pubdex",
            "--file",
            "a.nxml",
            "--es-url",
            "http://search:9200",
            "--index",
            "pubmed",
        ])
        .unwrap();
        let config = cli.overlay(env).unwrap();
        assert_eq!(config.url, "http://search:9200");
    }

    #[test]
    fn test_invalid_flag_value_is_rejected() {
        let cli = Cli::try_parse_from(["pubdex", "--file", "a.nxml", "--index", "Bad Name"]).unwrap();
        assert!(matches!(
            cli.overlay(IndexConfig::default()),
            Err(ConfigError::InvalidIndexName(_))
        ));
    }
}
