use crate::crypto::{AtRestCipher, CryptoError};
use haven_core::error::{ErrorCode, HavenError};
use haven_core::model::ChunkId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkStoreError {
    #[error("chunk not found: {0}")]
    NotFound(ChunkId),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HavenError for ChunkStoreError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ChunkStoreError::NotFound(_) => ErrorCode::NotFound,
            ChunkStoreError::Crypto(_) => ErrorCode::InvalidArgument,
            ChunkStoreError::Io(_) => ErrorCode::Internal,
        }
    }
}

/// One encrypted blob per `chunk_id` on disk, `chunks/<chunk_id>.enc`. The
/// Chunk Store exclusively owns these blobs; the vector index never reads
/// them directly.
pub struct ChunkStore {
    dir: PathBuf,
    cipher: Arc<dyn AtRestCipher>,
}

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>, cipher: Arc<dyn AtRestCipher>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, cipher })
    }

    fn path_for(&self, chunk_id: &str) -> PathBuf {
        self.dir.join(format!("{chunk_id}.enc"))
    }

    pub fn put(&self, chunk_id: &str, plaintext: &[u8]) -> Result<(), ChunkStoreError> {
        let blob = self.cipher.encrypt(plaintext, None)?;
        std::fs::write(self.path_for(chunk_id), blob)?;
        Ok(())
    }

    pub fn get(&self, chunk_id: &str) -> Result<Vec<u8>, ChunkStoreError> {
        let path = self.path_for(chunk_id);
        let blob = std::fs::read(&path).map_err(|_| ChunkStoreError::NotFound(chunk_id.to_string()))?;
        Ok(self.cipher.decrypt(&blob, None)?)
    }

    pub fn get_text(&self, chunk_id: &str) -> Result<String, ChunkStoreError> {
        let bytes = self.get(chunk_id)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn delete(&self, chunk_id: &str) -> std::io::Result<()> {
        let path = self.path_for(chunk_id);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Destructive: removes every blob under the chunk directory.
    pub fn reset(&self) -> std::io::Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
