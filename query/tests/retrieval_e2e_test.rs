use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use haven_core::config::{ChunkingConfig, IngestConfig, RetrievalConfig};
use haven_core::model::{FileBoosts, FileFilter};
use ingestion::{ChunkStrategy, IngestionPipeline, LocalPrefixEmbedder, NullTranscriber};
use query::{RetrievalEngine, SearchRequest};
use storage::{ChunkStore, NoOpCipher, Repository};
use tempfile::tempdir;

async fn ingest(pipeline: &IngestionPipeline, text: &str, filename: &str) {
    let file_id = pipeline.ingest_file(text.as_bytes(), filename, None).await;
    let status = pipeline.status(&file_id).unwrap();
    assert_eq!(status.stage, haven_core::model::IngestionStage::Complete);
}

#[tokio::test]
async fn ingesting_then_retrieving_surfaces_the_matching_document() {
    let dir = tempdir().unwrap();
    let chunk_store =
        Arc::new(ChunkStore::new(dir.path().join("chunks"), Arc::new(NoOpCipher)).unwrap());
    let repository = Arc::new(Repository::open(dir.path().join("wal.log")).await.unwrap());
    let embedder = Arc::new(LocalPrefixEmbedder::new("embedding-default-v1", 16));

    let pipeline = IngestionPipeline::new(
        chunk_store.clone(),
        repository.clone(),
        embedder.clone(),
        Arc::new(NullTranscriber),
        IngestConfig::default(),
        ChunkingConfig::default(),
        ChunkStrategy::TokenWindow,
        Arc::new(dashmap::DashMap::new()),
    );

    ingest(
        &pipeline,
        "The quarterly roadmap describes our goals, timeline, and deliverables for the project.",
        "roadmap.txt",
    )
    .await;
    ingest(
        &pipeline,
        "Unrelated notes about the cafeteria menu for next week.",
        "menu.txt",
    )
    .await;

    let engine = RetrievalEngine::new(repository, chunk_store, embedder, RetrievalConfig::default());

    let request = SearchRequest {
        query: "what are the project goals and timeline".to_string(),
        requested_k: 0,
        file_boosts: FileBoosts::default(),
        file_filter: FileFilter::default(),
        enable_smart_k: true,
        enable_retry: true,
        targeted_docs: None,
    };

    let citations = engine.retrieve(&request).await.unwrap();

    assert!(!citations.is_empty());
    assert!(citations.iter().any(|c| c.file_name == "roadmap.txt"));
}

#[tokio::test]
async fn invalidate_cache_forces_a_fresh_query_embedding() {
    let dir = tempdir().unwrap();
    let chunk_store =
        Arc::new(ChunkStore::new(dir.path().join("chunks"), Arc::new(NoOpCipher)).unwrap());
    let repository = Arc::new(Repository::open(dir.path().join("wal.log")).await.unwrap());
    let embedder = Arc::new(LocalPrefixEmbedder::new("embedding-default-v1", 16));

    let pipeline = IngestionPipeline::new(
        chunk_store.clone(),
        repository.clone(),
        embedder.clone(),
        Arc::new(NullTranscriber),
        IngestConfig::default(),
        ChunkingConfig::default(),
        ChunkStrategy::TokenWindow,
        Arc::new(dashmap::DashMap::new()),
    );
    ingest(&pipeline, "Early corpus before the cache fills up.", "a.txt").await;

    let mut config = RetrievalConfig::default();
    config.enable_memory_cache = true;
    config.cache_ttl_seconds = 3600;
    let engine = RetrievalEngine::new(repository, chunk_store, embedder, config);

    let request = SearchRequest {
        query: "early corpus".to_string(),
        requested_k: 4,
        file_boosts: FileBoosts::default(),
        file_filter: FileFilter::default(),
        enable_smart_k: true,
        enable_retry: false,
        targeted_docs: None,
    };

    let first = engine.retrieve(&request).await.unwrap();
    engine.invalidate_cache();
    let second = engine.retrieve(&request).await.unwrap();

    assert_eq!(first.len(), second.len());
}

#[tokio::test]
async fn a_successful_upsert_fires_the_registered_cache_invalidation_hook() {
    let dir = tempdir().unwrap();
    let chunk_store =
        Arc::new(ChunkStore::new(dir.path().join("chunks"), Arc::new(NoOpCipher)).unwrap());
    let repository = Arc::new(Repository::open(dir.path().join("wal.log")).await.unwrap());
    let embedder = Arc::new(LocalPrefixEmbedder::new("embedding-default-v1", 16));

    let engine = Arc::new(RetrievalEngine::new(
        repository.clone(),
        chunk_store.clone(),
        embedder.clone(),
        RetrievalConfig::default(),
    ));
    let invalidations = Arc::new(AtomicUsize::new(0));

    let hook_engine = engine.clone();
    let hook_count = invalidations.clone();
    let pipeline = IngestionPipeline::new(
        chunk_store,
        repository,
        embedder,
        Arc::new(NullTranscriber),
        IngestConfig::default(),
        ChunkingConfig::default(),
        ChunkStrategy::TokenWindow,
        Arc::new(dashmap::DashMap::new()),
    )
    .with_cache_invalidation_hook(Arc::new(move || {
        hook_engine.invalidate_cache();
        hook_count.fetch_add(1, Ordering::SeqCst);
    }));

    ingest(&pipeline, "A file that should trigger the hook.", "hook.txt").await;

    assert_eq!(invalidations.load(Ordering::SeqCst), 1);
}
