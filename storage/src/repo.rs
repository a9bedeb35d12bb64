use crate::crypto::{AtRestCipher, NoOpCipher};
use crate::snapshot::{SnapshotError, SnapshotManager};
use crate::vector_index::VectorIndex;
use crate::wal::{Wal, WalError};
use haven_core::error::{ErrorCode, HavenError};
use haven_core::model::{ChunkId, ChunkMetadata, FileId, VectorRecord};
use rkyv::ser::{serializers::AllocSerializer, Serializer};
use rkyv::{Archive, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("serialization error")]
    Serialization,
    #[error("deserialization error")]
    Deserialization,
    #[error("chunk not found: {0}")]
    NotFound(ChunkId),
    #[error("invalid snapshot id: {0}")]
    InvalidSnapshotId(String),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("snapshot manager is not configured")]
    SnapshotNotConfigured,
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl HavenError for RepoError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RepoError::NotFound(_) => ErrorCode::NotFound,
            RepoError::InvalidSnapshotId(_) | RepoError::SnapshotNotFound(_) => {
                ErrorCode::InvalidArgument
            }
            RepoError::SnapshotNotConfigured => ErrorCode::Unavailable,
            _ => ErrorCode::Internal,
        }
    }
}

/// WAL entry types for durability of the vector index.
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub enum WalEntry {
    Upsert(VectorRecord),
    Delete(ChunkId),
    DeleteByFile(FileId),
    Reset,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
struct RepositoryBackupSnapshot {
    lsn: u64,
    records: Vec<VectorRecord>,
}

struct MaterializedState {
    index: VectorIndex,
}

impl MaterializedState {
    fn empty() -> Self {
        Self {
            index: VectorIndex::new(),
        }
    }
}

fn apply_replayed_entry(entry: &WalEntry, state: &mut MaterializedState) {
    match entry {
        WalEntry::Upsert(record) => state.index.upsert(record.clone()),
        WalEntry::Delete(chunk_id) => {
            state.index.delete(chunk_id);
        }
        WalEntry::DeleteByFile(file_id) => {
            state.index.delete_by_file(file_id);
        }
        WalEntry::Reset => {
            state.index = VectorIndex::new();
        }
    }
}

/// Durable, WAL-backed wrapper around the in-memory [`VectorIndex`].
pub struct Repository {
    wal: Arc<Mutex<Wal>>,
    tx_lock: Arc<Mutex<()>>,
    index: Arc<RwLock<VectorIndex>>,
    snapshot_manager: Option<SnapshotManager>,
}

impl Repository {
    pub async fn open(wal_path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::open_with_cipher(wal_path, Arc::new(NoOpCipher)).await
    }

    pub async fn open_with_cipher(
        wal_path: impl AsRef<Path>,
        cipher: Arc<dyn AtRestCipher>,
    ) -> Result<Self, RepoError> {
        Self::open_internal(wal_path.as_ref().to_path_buf(), cipher, None).await
    }

    pub async fn open_with_snapshots(
        wal_path: impl AsRef<Path>,
        snapshot_dir: impl AsRef<Path>,
    ) -> Result<Self, RepoError> {
        Self::open_with_cipher_and_snapshots(wal_path, Arc::new(NoOpCipher), snapshot_dir).await
    }

    pub async fn open_with_cipher_and_snapshots(
        wal_path: impl AsRef<Path>,
        cipher: Arc<dyn AtRestCipher>,
        snapshot_dir: impl AsRef<Path>,
    ) -> Result<Self, RepoError> {
        let snapshot_manager = SnapshotManager::new(snapshot_dir.as_ref());
        Self::open_internal(
            wal_path.as_ref().to_path_buf(),
            cipher,
            Some(snapshot_manager),
        )
        .await
    }

    async fn open_internal(
        wal_path: PathBuf,
        cipher: Arc<dyn AtRestCipher>,
        snapshot_manager: Option<SnapshotManager>,
    ) -> Result<Self, RepoError> {
        let wal_instance = Wal::open_with_cipher(&wal_path, cipher).await?;
        let wal = Arc::new(Mutex::new(wal_instance));
        let tx_lock = Arc::new(Mutex::new(()));

        let (mut state, base_lsn) =
            load_materialized_state_from_backup(snapshot_manager.as_ref(), None).await?;

        {
            let mut wal_lock = wal.lock().await;
            let last_replayed_lsn = wal_lock
                .replay(|lsn, data| {
                    if lsn <= base_lsn {
                        return Ok(());
                    }
                    let entry = deserialize_wal_entry(&data)?;
                    apply_replayed_entry(&entry, &mut state);
                    Ok(())
                })
                .await?;

            if base_lsn > last_replayed_lsn {
                return Err(RepoError::SnapshotNotFound(format!("wal-lsn-{base_lsn}")));
            }
        }

        Ok(Self {
            wal,
            tx_lock,
            index: Arc::new(RwLock::new(state.index)),
            snapshot_manager,
        })
    }

    pub async fn upsert(&self, record: VectorRecord) -> Result<(), RepoError> {
        let _tx_guard = self.tx_lock.lock().await;
        self.write_wal_entry(&WalEntry::Upsert(record.clone())).await?;
        self.index.write().await.upsert(record);
        Ok(())
    }

    pub async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<(), RepoError> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, chunk_id: &str) -> Result<(), RepoError> {
        let _tx_guard = self.tx_lock.lock().await;
        self.write_wal_entry(&WalEntry::Delete(chunk_id.to_string()))
            .await?;
        self.index.write().await.delete(chunk_id);
        Ok(())
    }

    pub async fn delete_by_file(&self, file_id: &FileId) -> Result<Vec<ChunkId>, RepoError> {
        let _tx_guard = self.tx_lock.lock().await;
        self.write_wal_entry(&WalEntry::DeleteByFile(file_id.clone()))
            .await?;
        Ok(self.index.write().await.delete_by_file(file_id))
    }

    /// Drops every vector record. WAL-logged so a crash mid-purge replays
    /// back to empty rather than resurrecting stale records.
    pub async fn reset(&self) -> Result<(), RepoError> {
        let _tx_guard = self.tx_lock.lock().await;
        self.write_wal_entry(&WalEntry::Reset).await?;
        *self.index.write().await = VectorIndex::new();
        Ok(())
    }

    /// Runs a throwaway top-1 query to page in whatever index structures
    /// the backend keeps, before the first real query pays for it.
    pub async fn warmup(&self) {
        let dim = self.embedding_dimension().await.unwrap_or(1);
        let probe = vec![0.0f32; dim];
        let index = self.index.read().await;
        let _ = index.search(&probe, 1);
    }

    async fn write_wal_entry(&self, entry: &WalEntry) -> Result<(), RepoError> {
        let bytes = serialize_wal_entry(entry)?;
        let mut wal = self.wal.lock().await;
        wal.append(&bytes).await?;
        wal.flush().await?;
        Ok(())
    }

    pub async fn search(&self, query: &[f32], k: usize) -> Vec<(ChunkId, f32, ChunkMetadata)> {
        let index = self.index.read().await;
        index.search(query, k)
    }

    pub async fn metadata(&self, chunk_id: &str) -> Option<ChunkMetadata> {
        let index = self.index.read().await;
        index.metadata(chunk_id).cloned()
    }

    pub async fn all_chunk_metadata(&self) -> Vec<ChunkMetadata> {
        let index = self.index.read().await;
        index.all_metadata()
    }

    pub async fn embedding_dimension(&self) -> Option<usize> {
        let index = self.index.read().await;
        index.embedding_dimension()
    }

    pub async fn len(&self) -> usize {
        let index = self.index.read().await;
        index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn create_backup_snapshot(&self) -> Result<String, RepoError> {
        let snapshot_manager = self
            .snapshot_manager
            .as_ref()
            .ok_or(RepoError::SnapshotNotConfigured)?;

        let snapshot = {
            let _tx_guard = self.tx_lock.lock().await;
            let lsn = {
                let wal = self.wal.lock().await;
                wal.current_lsn()
            };
            let mut records = self.index.read().await.all_records();
            records.sort_by(|a, b| a.id.cmp(&b.id));
            RepositoryBackupSnapshot { lsn, records }
        };

        let encoded = serialize_backup_snapshot(&snapshot)?;
        snapshot_manager
            .create_snapshot(snapshot.lsn, &encoded)
            .await?;

        Ok(format!("wal-lsn-{}", snapshot.lsn))
    }

    /// Rebuild in-memory state from the latest backup snapshot plus WAL delta replay.
    pub async fn restore_from_latest_backup(&self) -> Result<String, RepoError> {
        if self.snapshot_manager.is_none() {
            return Err(RepoError::SnapshotNotConfigured);
        }

        let _tx_guard = self.tx_lock.lock().await;
        let target_lsn = {
            let wal = self.wal.lock().await;
            wal.current_lsn()
        };

        let (mut state, base_lsn) =
            load_materialized_state_from_backup(self.snapshot_manager.as_ref(), Some(target_lsn))
                .await?;

        {
            let mut wal = self.wal.lock().await;
            wal.replay(|lsn, data| {
                if lsn <= base_lsn || lsn > target_lsn {
                    return Ok(());
                }
                let entry = deserialize_wal_entry(&data)?;
                apply_replayed_entry(&entry, &mut state);
                Ok(())
            })
            .await?;
        }

        *self.index.write().await = state.index;

        Ok(format!("wal-lsn-{target_lsn}"))
    }
}

fn serialize_wal_entry(entry: &WalEntry) -> Result<Vec<u8>, RepoError> {
    let mut serializer = AllocSerializer::<256>::default();
    serializer
        .serialize_value(entry)
        .map_err(|_| RepoError::Serialization)?;
    Ok(serializer.into_serializer().into_inner().to_vec())
}

fn deserialize_wal_entry(data: &[u8]) -> Result<WalEntry, WalError> {
    let archived =
        rkyv::check_archived_root::<WalEntry>(data).map_err(|_| WalError::CorruptEntry)?;
    archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| WalError::CorruptEntry)
}

fn serialize_backup_snapshot(snapshot: &RepositoryBackupSnapshot) -> Result<Vec<u8>, RepoError> {
    let mut serializer = AllocSerializer::<1024>::default();
    serializer
        .serialize_value(snapshot)
        .map_err(|_| RepoError::Serialization)?;
    Ok(serializer.into_serializer().into_inner().to_vec())
}

async fn load_materialized_state_from_backup(
    snapshot_manager: Option<&SnapshotManager>,
    upper_lsn: Option<u64>,
) -> Result<(MaterializedState, u64), RepoError> {
    let Some(manager) = snapshot_manager else {
        return Ok((MaterializedState::empty(), 0));
    };

    let found = match upper_lsn {
        Some(upper) => manager.latest_snapshot_at_or_before(upper).await?,
        None => manager.latest_snapshot().await?,
    };

    let Some((lsn, path)) = found else {
        return Ok((MaterializedState::empty(), 0));
    };

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| RepoError::Snapshot(SnapshotError::Io(e)))?;
    let archived = rkyv::check_archived_root::<RepositoryBackupSnapshot>(&bytes)
        .map_err(|_| RepoError::Deserialization)?;
    let snapshot: RepositoryBackupSnapshot = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_: std::convert::Infallible| RepoError::Deserialization)?;

    let mut index = VectorIndex::new();
    for record in snapshot.records {
        index.upsert(record);
    }

    Ok((MaterializedState { index }, lsn))
}
