use crate::chunk_store::ChunkStore;
use crate::crypto::CryptoError;
use crate::repo::{RepoError, Repository};
use haven_core::error::{ErrorCode, HavenError};
use haven_core::model::{ChunkMetadata, FileId};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    ChunkStore(#[from] crate::chunk_store::ChunkStoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HavenError for VaultError {
    fn error_code(&self) -> ErrorCode {
        match self {
            VaultError::ChunkStore(e) => e.error_code(),
            VaultError::Repo(e) => e.error_code(),
            VaultError::Crypto(_) => ErrorCode::InvalidArgument,
            VaultError::Io(_) => ErrorCode::Internal,
        }
    }
}

/// One line of a privacy export manifest: a chunk's metadata plus where its
/// plaintext blob lives on disk. Never includes anything under `keystore/`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportEntry {
    pub file_id: FileId,
    pub chunk: ChunkMetadata,
    pub blob_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportManifest {
    pub entries: Vec<ExportEntry>,
}

/// Ties the Chunk Store and the vector-index-backed Repository together for
/// the two whole-corpus operations that cross both: export and purge.
/// Deliberately does not expose the keystore directory to either.
pub struct Vault {
    chunk_store: ChunkStore,
    repository: Arc<Repository>,
    uploads_dir: PathBuf,
    transcripts_dir: PathBuf,
}

impl Vault {
    pub fn new(
        chunk_store: ChunkStore,
        repository: Arc<Repository>,
        uploads_dir: impl Into<PathBuf>,
        transcripts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            chunk_store,
            repository,
            uploads_dir: uploads_dir.into(),
            transcripts_dir: transcripts_dir.into(),
        }
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.chunk_store
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Lists every chunk's metadata and the path to its encrypted blob, for
    /// a caller-provided export handler to read and re-encrypt for the
    /// user. Never touches `keystore/`.
    pub async fn export_manifest(&self) -> ExportManifest {
        let entries = self
            .repository
            .all_chunk_metadata()
            .await
            .into_iter()
            .map(|chunk| {
                let blob_path = self.chunk_store.dir().join(format!("{}.enc", chunk.chunk_id));
                ExportEntry {
                    file_id: chunk.file_id.clone(),
                    chunk,
                    blob_path,
                }
            })
            .collect();
        ExportManifest { entries }
    }

    /// Irreversibly deletes every chunk, upload, and transcript for
    /// `file_id` from the index and the chunk store, but never the
    /// keystore. Returns the number of chunks removed.
    pub async fn purge_file(&self, file_id: &FileId) -> Result<usize, VaultError> {
        let removed_ids = self.repository.delete_by_file(file_id).await?;
        for chunk_id in &removed_ids {
            self.chunk_store.delete(chunk_id)?;
        }
        remove_if_exists(&self.uploads_dir.join(file_id)).await?;
        remove_if_exists(&self.transcripts_dir.join(format!("{file_id}.enc"))).await?;
        Ok(removed_ids.len())
    }

    /// Destroys the entire corpus: every chunk, every vector, every upload
    /// and transcript. The keystore is left untouched.
    pub async fn purge_all(&self) -> Result<(), VaultError> {
        self.repository.reset().await?;
        self.chunk_store.reset()?;
        if self.uploads_dir.exists() {
            tokio::fs::remove_dir_all(&self.uploads_dir).await?;
        }
        if self.transcripts_dir.exists() {
            tokio::fs::remove_dir_all(&self.transcripts_dir).await?;
        }
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.transcripts_dir).await?;
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::model::VectorRecord;
    use tempfile::tempdir;

    fn record(id: &str, file_id: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding: vec![1.0, 0.0],
            metadata: ChunkMetadata {
                chunk_id: id.to_string(),
                file_id: file_id.to_string(),
                file_name: "doc.txt".to_string(),
                original_filename: "doc.txt".to_string(),
                normalized_filename: "doc txt".to_string(),
                storage_filename: "doc.txt".to_string(),
                file_ext: ".txt".to_string(),
                start: 0,
                end: 10,
                extract_strategy: "txt".to_string(),
            },
        }
    }

    async fn vault(root: &Path) -> Vault {
        let chunk_store =
            ChunkStore::new(root.join("chunks"), Arc::new(crate::crypto::NoOpCipher)).unwrap();
        let repository = Arc::new(Repository::open(root.join("wal.log")).await.unwrap());
        Vault::new(
            chunk_store,
            repository,
            root.join("uploads"),
            root.join("transcripts"),
        )
    }

    #[tokio::test]
    async fn purge_all_drops_chunks_and_vector_records_together() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path()).await;
        vault.chunk_store().put("c1", b"hello").unwrap();
        vault.repository().upsert(record("c1", "f1")).await.unwrap();

        vault.purge_all().await.unwrap();

        assert_eq!(vault.repository().len().await, 0);
        assert!(vault.chunk_store().get("c1").is_err());
        assert!(vault.repository().search(&[1.0, 0.0], 1).await.is_empty());
    }

    #[tokio::test]
    async fn purge_file_removes_only_that_files_chunks() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path()).await;
        vault.chunk_store().put("c1", b"a").unwrap();
        vault.chunk_store().put("c2", b"b").unwrap();
        vault.repository().upsert(record("c1", "f1")).await.unwrap();
        vault.repository().upsert(record("c2", "f2")).await.unwrap();

        let removed = vault.purge_file(&"f1".to_string()).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(vault.repository().len().await, 1);
        assert!(vault.chunk_store().get("c1").is_err());
        assert!(vault.chunk_store().get("c2").is_ok());
    }
}
