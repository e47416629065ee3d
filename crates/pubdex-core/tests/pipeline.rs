use std::fs;
use std::path::Path;
use std::sync::Arc;

use pubdex_core::index::{
    to_actions, IndexDefinition, IndexStatus, LoadError, StoreError, WriteAction,
};
use pubdex_core::ingest::IngestError;
use pubdex_core::{
    BulkLoader, BulkOptions, IndexStore, IngestPipeline, MemoryStore, SchemaManager, Source,
};
use serde_json::json;
use tempfile::TempDir;

const INDEX: &str = "pubmed";
const DOC_TYPE: &str = "article";

fn article(pmid: u32, date: &str) -> String {
    let (year, month, day) = match date.split('-').collect::<Vec<_>>()[..] {
        [y, m, d] => (y.to_string(), m.to_string(), d.to_string()),
        _ => unreachable!(),
    };
    format!(
        r#"<?xml version="1.0"?>
<article>
  <front>
    <journal-meta>
      <journal-title-group><journal-title>Journal of Tests</journal-title></journal-title-group>
    </journal-meta>
    <article-meta>
      <article-id pub-id-type="pmid">{pmid}</article-id>
      <article-id pub-id-type="doi">10.5555/test.{pmid}</article-id>
      <title-group><article-title>Article {pmid}</article-title></title-group>
      <contrib-group>
        <contrib contrib-type="author">
          <name><surname>Author</surname><given-names>Number {pmid}</given-names></name>
        </contrib>
      </contrib-group>
      <pub-date pub-type="epub"><day>{day}</day><month>{month}</month><year>{year}</year></pub-date>
      <abstract><p>Findings for {pmid}.</p></abstract>
      <kwd-group><kwd>testing</kwd></kwd-group>
    </article-meta>
  </front>
  <body><p>Body of {pmid}.</p></body>
</article>"#
    )
}

fn corpus(count: u32) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    for pmid in 1..=count {
        let sub = if pmid % 2 == 0 { "nested" } else { "" };
        let path = dir.path().join(sub).join(format!("{pmid}.nxml"));
        fs::write(path, article(pmid, "2014-03-07")).unwrap();
    }
    dir
}

fn write_broken(dir: &Path) {
    fs::write(dir.join("broken.nxml"), "<article><front/></article>").unwrap();
    fs::write(dir.join("truncated.nxml"), "<article><front>").unwrap();
}

struct Harness {
    store: MemoryStore,
    schema: SchemaManager,
    loader: BulkLoader,
}

fn harness(options: BulkOptions) -> Harness {
    let store = MemoryStore::new();
    let shared: Arc<dyn IndexStore> = Arc::new(store.clone());
    Harness {
        schema: SchemaManager::new(Arc::clone(&shared), INDEX, DOC_TYPE),
        loader: BulkLoader::new(shared, options),
        store,
    }
}

#[tokio::test]
async fn directory_round_trip() {
    let dir = corpus(12);
    let h = harness(BulkOptions::default().with_chunk_size(5));

    let report = IngestPipeline::new(3)
        .run(&Source::Directory(dir.path().to_path_buf()), &h.schema, &h.loader, false)
        .await
        .unwrap();

    assert_eq!(report.extracted, 12);
    assert_eq!(report.indexed, 12);
    assert_eq!(report.error_count(), 0);
    assert_eq!(report.index_status, Some(IndexStatus::Created));
    assert_eq!(report.index_count, Some(12));
    assert_eq!(h.store.bulk_requests().await, vec![5, 5, 2]);

    let documents = h.store.documents(INDEX).await.unwrap();
    let first = &documents[0];
    assert_eq!(first["pmid"], "1");
    assert_eq!(first["date"], "2014-03-07");
    assert_eq!(first["authors"][0]["full-name"], "Author, Number 1");
    assert_eq!(first["abstract"], json!(["Findings for 1."]));
    assert_eq!(first["keywords"], json!(["testing"]));
}

#[tokio::test]
async fn rerun_without_reset_appends() {
    let dir = corpus(4);
    let h = harness(BulkOptions::default());
    let source = Source::Directory(dir.path().to_path_buf());
    let pipeline = IngestPipeline::new(2);

    pipeline.run(&source, &h.schema, &h.loader, false).await.unwrap();
    let report = pipeline.run(&source, &h.schema, &h.loader, false).await.unwrap();

    assert_eq!(report.index_status, Some(IndexStatus::Updated));
    assert_eq!(report.index_count, Some(8));
}

#[tokio::test]
async fn drop_restores_directory_count() {
    let dir = corpus(6);
    let h = harness(BulkOptions::default());
    let source = Source::Directory(dir.path().to_path_buf());
    let pipeline = IngestPipeline::new(2);

    pipeline.run(&source, &h.schema, &h.loader, false).await.unwrap();
    pipeline.run(&source, &h.schema, &h.loader, false).await.unwrap();
    let report = pipeline.run(&source, &h.schema, &h.loader, true).await.unwrap();

    assert_eq!(report.index_status, Some(IndexStatus::Created));
    assert_eq!(report.index_count, Some(6));
}

#[tokio::test]
async fn directory_skips_bad_documents() {
    let dir = corpus(3);
    write_broken(dir.path());
    let h = harness(BulkOptions::default());

    let report = IngestPipeline::new(2)
        .run(&Source::Directory(dir.path().to_path_buf()), &h.schema, &h.loader, false)
        .await
        .unwrap();

    assert_eq!(report.extracted, 3);
    assert_eq!(report.indexed, 3);
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(report.failures[0].error, IngestError::Extraction(_)));
    assert!(matches!(report.failures[1].error, IngestError::Parse(_)));
    assert!(report.failures[1].path.ends_with("truncated.nxml"));
}

#[tokio::test]
async fn single_file_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_broken(dir.path());
    let h = harness(BulkOptions::default());

    let result = IngestPipeline::new(1)
        .run(&Source::File(dir.path().join("broken.nxml")), &h.schema, &h.loader, false)
        .await;

    assert!(matches!(result, Err(IngestError::Extraction(_))));
    assert_eq!(h.store.count(INDEX).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_date_only_rejects_its_document() {
    let dir = corpus(2);
    fs::write(dir.path().join("leap.nxml"), article(99, "2021-02-29")).unwrap();
    let h = harness(BulkOptions::default());

    let report = IngestPipeline::new(2)
        .run(&Source::Directory(dir.path().to_path_buf()), &h.schema, &h.loader, false)
        .await
        .unwrap();

    assert_eq!(report.indexed, 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].to_string().contains("2021-02-29"));
}

#[tokio::test]
async fn conflicting_mapping_aborts_before_loading() {
    let dir = corpus(3);
    let h = harness(BulkOptions::default());

    let definition = IndexDefinition {
        doc_type: DOC_TYPE.into(),
        mappings: json!({ "properties": { "doi": { "type": "date" } } }),
        settings: json!({}),
    };
    h.store.create_index(INDEX, &definition).await.unwrap();

    let result = IngestPipeline::new(1)
        .run(&Source::Directory(dir.path().to_path_buf()), &h.schema, &h.loader, false)
        .await;

    assert!(matches!(result, Err(IngestError::Schema(_))));
    assert_eq!(h.store.count(INDEX).await.unwrap(), 0);
}

#[tokio::test]
async fn write_errors_identify_records() {
    let h = harness(BulkOptions::default());
    let definition = IndexDefinition {
        doc_type: DOC_TYPE.into(),
        mappings: json!({ "properties": { "doi": { "type": "date" } } }),
        settings: json!({}),
    };
    h.store.create_index(INDEX, &definition).await.unwrap();

    let records = (1..=3).map(|pmid| {
        let xml = article(pmid, "2014-03-07");
        let document = pubdex_core::ingest::parse_bytes(xml.as_bytes()).unwrap();
        pubdex_core::ingest::assemble(&document).unwrap()
    });
    let summary = h
        .loader
        .submit_iter(to_actions(INDEX, DOC_TYPE, records))
        .await
        .unwrap();

    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.errors.len(), 3);
    let error = &summary.errors[2];
    assert_eq!(error.position, 2);
    assert_eq!(error.error_type, "mapper_parsing_exception");
    assert_eq!(error.record.pmid.as_deref(), Some("3"));
    assert_eq!(error.record.doi.as_deref(), Some("10.5555/test.3"));
}

#[tokio::test]
async fn transport_failure_keeps_committed_batches() {
    let dir = corpus(5);
    let h = harness(BulkOptions::default().with_chunk_size(2));
    h.store.fail_bulk_after(1).await;

    let result = IngestPipeline::new(2)
        .run(&Source::Directory(dir.path().to_path_buf()), &h.schema, &h.loader, false)
        .await;

    assert!(matches!(
        result,
        Err(IngestError::Load(LoadError::Transport {
            indexed: 2,
            source: StoreError::UnexpectedResponse(_),
        }))
    ));
    assert_eq!(h.store.count(INDEX).await.unwrap(), 2);
}

#[tokio::test]
async fn loader_counts_all_valid_records() {
    let h = harness(BulkOptions::default().with_chunk_size(7));
    h.schema.ensure_index(false).await.unwrap();

    let actions: Vec<WriteAction> = (0..20)
        .map(|i| {
            let record = pubdex_core::ArticleRecord {
                pmid: Some(i.to_string()),
                ..Default::default()
            };
            WriteAction::new(INDEX, DOC_TYPE, record)
        })
        .collect();

    let summary = h.loader.submit_iter(actions).await.unwrap();
    assert_eq!(summary.success_count, 20);
    assert!(summary.errors.is_empty());
    assert_eq!(h.store.bulk_requests().await, vec![7, 7, 6]);
}
