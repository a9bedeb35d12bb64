use crate::chunker::{fixed_char_chunks, token_window_chunks, ChunkError, TextChunk};
use crate::embedder::Embedder;
use crate::extract::{self, ExtractError, Transcriber};
use crate::normalize::normalize_text;
use dashmap::DashMap;
use haven_core::config::{ChunkingConfig, IngestConfig};
use haven_core::error::{truncate_message, ErrorCode, HavenError};
use haven_core::ids::new_hex_id;
use haven_core::model::{
    normalize_filename, ChunkMetadata, FileId, IngestionStage, IngestionStatus, VectorRecord,
};
use std::sync::Arc;
use storage::{ChunkStore, Repository};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    ChunkStore(#[from] storage::ChunkStoreError),
    #[error(transparent)]
    Repo(#[from] storage::RepoError),
    #[error("unsupported file type for {0}")]
    UnsupportedType(String),
}

impl HavenError for IngestionError {
    fn error_code(&self) -> ErrorCode {
        match self {
            IngestionError::Extract(_) => ErrorCode::Unsupported,
            IngestionError::Chunk(_) => ErrorCode::InvalidArgument,
            IngestionError::ChunkStore(e) => e.error_code(),
            IngestionError::Repo(e) => e.error_code(),
            IngestionError::UnsupportedType(_) => ErrorCode::Unsupported,
        }
    }
}

/// Chunking strategy selection: fixed-char and token-window are the two
/// interchangeable chunkers; token-window is the default.
pub enum ChunkStrategy {
    FixedChar,
    TokenWindow,
}

/// Process-wide `file_id → status` map, updated only by the background
/// task that owns that file_id.
pub type StatusTable = Arc<DashMap<FileId, IngestionStatus>>;

/// Called once after a file's chunks are durably upserted, so a caller
/// holding a query-embedding cache can drop it before the next query runs.
pub type CacheInvalidationHook = Arc<dyn Fn() + Send + Sync>;

/// Drives a single uploaded file through detect → extract → normalize →
/// chunk → (encrypt + accumulate) → upsert → complete, publishing staged
/// progress into a shared status table as it goes.
pub struct IngestionPipeline {
    chunk_store: Arc<ChunkStore>,
    repository: Arc<Repository>,
    embedder: Arc<dyn Embedder>,
    transcriber: Arc<dyn Transcriber>,
    ingest_config: IngestConfig,
    chunking_config: ChunkingConfig,
    chunk_strategy: ChunkStrategy,
    statuses: StatusTable,
    on_upsert: Option<CacheInvalidationHook>,
}

impl IngestionPipeline {
    pub fn new(
        chunk_store: Arc<ChunkStore>,
        repository: Arc<Repository>,
        embedder: Arc<dyn Embedder>,
        transcriber: Arc<dyn Transcriber>,
        ingest_config: IngestConfig,
        chunking_config: ChunkingConfig,
        chunk_strategy: ChunkStrategy,
        statuses: StatusTable,
    ) -> Self {
        Self {
            chunk_store,
            repository,
            embedder,
            transcriber,
            ingest_config,
            chunking_config,
            chunk_strategy,
            statuses,
            on_upsert: None,
        }
    }

    /// Registers a callback fired after every successful upsert, e.g. to
    /// invalidate a retrieval engine's query-embedding cache.
    pub fn with_cache_invalidation_hook(mut self, hook: CacheInvalidationHook) -> Self {
        self.on_upsert = Some(hook);
        self
    }

    pub fn status(&self, file_id: &FileId) -> Option<IngestionStatus> {
        self.statuses.get(file_id).map(|s| s.clone())
    }

    fn set_status(&self, file_id: &FileId, stage: IngestionStage, progress: u8) {
        self.statuses.insert(
            file_id.clone(),
            IngestionStatus {
                file_id: file_id.clone(),
                stage,
                progress,
                error: None,
            },
        );
    }

    fn set_error(&self, file_id: &FileId, message: &str) {
        self.statuses.insert(
            file_id.clone(),
            IngestionStatus {
                file_id: file_id.clone(),
                stage: IngestionStage::Error,
                progress: 100,
                error: Some(truncate_message(message, 200)),
            },
        );
    }

    /// Ingests one file's bytes end to end, minting a fresh `file_id` and
    /// returning it immediately after marking the file `received`; the
    /// caller is expected to run this in a background task.
    pub async fn ingest_file(
        &self,
        bytes: &[u8],
        original_filename: &str,
        content_type: Option<&str>,
    ) -> FileId {
        let file_id = new_hex_id();
        self.ingest_file_with_id(file_id.clone(), bytes, original_filename, content_type)
            .await;
        file_id
    }

    /// Same as `ingest_file`, but for a `file_id` already minted and
    /// returned to a caller before this runs in the background (e.g. a
    /// queued job that needs to report its id synchronously).
    pub async fn ingest_file_with_id(
        &self,
        file_id: FileId,
        bytes: &[u8],
        original_filename: &str,
        content_type: Option<&str>,
    ) {
        self.set_status(&file_id, IngestionStage::Received, 0);

        if let Err(e) = self.run(&file_id, bytes, original_filename, content_type).await {
            error!(%file_id, error = %e, "ingestion failed");
            self.set_error(&file_id, &e.to_string());
        }
    }

    async fn run(
        &self,
        file_id: &FileId,
        bytes: &[u8],
        original_filename: &str,
        content_type: Option<&str>,
    ) -> Result<(), IngestionError> {
        let suffix = extract::detect_suffix(original_filename, bytes, content_type, &self.ingest_config)
            .ok_or_else(|| IngestionError::UnsupportedType(original_filename.to_string()))?;

        let is_audio = self.ingest_config.is_audio_extension(&suffix);
        self.set_status(
            file_id,
            if is_audio {
                IngestionStage::Transcribing
            } else {
                IngestionStage::Extracting
            },
            10,
        );

        let (raw_text, extract_strategy) = extract::extract(
            &suffix,
            bytes,
            self.transcriber.as_ref(),
            self.ingest_config.max_audio_duration_minutes,
        )?;

        let normalized = normalize_text(&raw_text);

        self.set_status(file_id, IngestionStage::Chunking, 35);
        let text_chunks = self.chunk(&normalized)?;

        self.set_status(file_id, IngestionStage::Embedding, 55);
        let passages: Vec<String> = text_chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_passages(&passages);

        let normalized_filename = normalize_filename(original_filename);
        let mut records = Vec::with_capacity(text_chunks.len());

        for (chunk, embedding) in text_chunks.iter().zip(embeddings.into_iter()) {
            let chunk_id = new_hex_id();
            self.chunk_store.put(&chunk_id, chunk.text.as_bytes())?;

            let metadata = ChunkMetadata {
                chunk_id: chunk_id.clone(),
                file_id: file_id.clone(),
                file_name: original_filename.to_string(),
                original_filename: original_filename.to_string(),
                normalized_filename: normalized_filename.clone(),
                storage_filename: format!("{file_id}{suffix}"),
                file_ext: suffix.clone(),
                start: chunk.start,
                end: chunk.end,
                extract_strategy: extract_strategy.to_string(),
            };

            records.push(VectorRecord {
                id: chunk_id,
                embedding,
                metadata,
            });
        }

        self.set_status(file_id, IngestionStage::Upserting, 85);
        self.repository.upsert_batch(records).await?;
        if let Some(hook) = &self.on_upsert {
            hook();
        }

        self.set_status(file_id, IngestionStage::Complete, 100);
        info!(%file_id, "ingestion complete");
        Ok(())
    }

    fn chunk(&self, normalized: &str) -> Result<Vec<TextChunk>, ChunkError> {
        match self.chunk_strategy {
            ChunkStrategy::FixedChar => fixed_char_chunks(
                normalized,
                self.chunking_config.fixed_char_size,
                self.chunking_config.fixed_char_overlap,
            ),
            ChunkStrategy::TokenWindow => token_window_chunks(
                normalized,
                self.chunking_config.chunk_target_tokens,
                self.chunking_config.chunk_min_tokens,
                self.chunking_config.chunk_overlap_tokens,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::LocalPrefixEmbedder;
    use crate::extract::NullTranscriber;
    use storage::NoOpCipher;
    use tempfile::tempdir;

    async fn pipeline(dir: &std::path::Path) -> IngestionPipeline {
        let chunk_store = Arc::new(ChunkStore::new(dir.join("chunks"), Arc::new(NoOpCipher)).unwrap());
        let repository = Arc::new(Repository::open(dir.join("wal.log")).await.unwrap());
        IngestionPipeline::new(
            chunk_store,
            repository,
            Arc::new(LocalPrefixEmbedder::new("embedding-default-v1", 16)),
            Arc::new(NullTranscriber),
            IngestConfig::default(),
            ChunkingConfig::default(),
            ChunkStrategy::TokenWindow,
            Arc::new(DashMap::new()),
        )
    }

    #[tokio::test]
    async fn ingesting_a_text_file_reaches_complete_and_upserts_chunks() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;

        let file_id = pipeline
            .ingest_file(b"hello world, this is a small document.", "note.txt", None)
            .await;

        let status = pipeline.status(&file_id).unwrap();
        assert_eq!(status.stage, IngestionStage::Complete);
        assert!(pipeline.repository.len().await > 0);
    }

    #[tokio::test]
    async fn ingesting_an_unsupported_file_sets_error_status() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;

        let file_id = pipeline.ingest_file(b"\x00\x01", "payload.bin", None).await;

        let status = pipeline.status(&file_id).unwrap();
        assert_eq!(status.stage, IngestionStage::Error);
        assert!(status.error.is_some());
    }
}
