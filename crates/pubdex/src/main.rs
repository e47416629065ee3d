mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use pubdex_core::{
    BulkLoader, BulkOptions, ElasticsearchStore, IndexStore, IngestPipeline, SchemaManager,
    Source,
};

const DEFAULT_LOG_FILTER: &str = "pubdex=info,pubdex_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let source = cli
        .source()
        .context("one of --file or --dir is required")?;
    let pipeline = cli
        .workers
        .map_or_else(IngestPipeline::default, IngestPipeline::new);

    if cli.dry {
        run_dry(&pipeline, &source).await
    } else {
        run(&cli, &pipeline, &source).await
    }
}

async fn run_dry(pipeline: &IngestPipeline, source: &Source) -> Result<()> {
    let mut sink = std::io::stderr();
    let report = pipeline
        .run_dry(source, &mut sink)
        .await
        .with_context(|| format!("failed to extract {}", describe(source)))?;

    for failure in &report.failures {
        tracing::debug!("{failure}");
    }
    println!(
        "Extracted {} documents (dry run), {} errors",
        report.extracted,
        report.error_count()
    );
    Ok(())
}

async fn run(cli: &Cli, pipeline: &IngestPipeline, source: &Source) -> Result<()> {
    let config = cli.index_config().context("invalid index configuration")?;
    let store: Arc<dyn IndexStore> = Arc::new(ElasticsearchStore::new(&config)?);

    let schema = SchemaManager::new(Arc::clone(&store), &config.index, &config.doc_type);
    let loader = BulkLoader::new(store, BulkOptions::from_config(&config));

    let report = pipeline
        .run(source, &schema, &loader, cli.drop)
        .await
        .with_context(|| format!("failed to ingest {}", describe(source)))?;

    if let Some(status) = report.index_status {
        tracing::info!(index = %config.index, %status, "index ready");
    }
    if let Some(count) = report.index_count {
        tracing::info!(index = %config.index, count, "documents in index");
    }
    println!(
        "Indexed {} documents, {} errors",
        report.indexed,
        report.error_count()
    );
    Ok(())
}

fn describe(source: &Source) -> String {
    match source {
        Source::File(path) => path.display().to_string(),
        Source::Directory(dir) => format!("directory {}", dir.display()),
    }
}
