pub mod chunk_store;
pub mod crypto;
pub mod repo;
pub mod snapshot;
pub mod vault;
pub mod vector_index;
pub mod wal;

pub use chunk_store::{ChunkStore, ChunkStoreError};
pub use crypto::{AeadCipher, AtRestCipher, CryptoError, Keystore, NoOpCipher};
pub use repo::{RepoError, Repository};
pub use vault::{Vault, VaultError};
pub use vector_index::VectorIndex;
