use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use haven_core::error::{ErrorCode, HavenError};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_FILE_NAME: &str = "enc_key.bin";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encrypted payload shorter than nonce+tag")]
    InvalidPayload,
    #[error("AEAD integrity check failed")]
    IntegrityFailure,
    #[error("keystore unavailable: {0}")]
    KeystoreUnavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HavenError for CryptoError {
    fn error_code(&self) -> ErrorCode {
        match self {
            CryptoError::InvalidPayload => ErrorCode::InvalidArgument,
            CryptoError::IntegrityFailure => ErrorCode::InvalidArgument,
            CryptoError::KeystoreUnavailable(_) => ErrorCode::Unavailable,
            CryptoError::Io(_) => ErrorCode::Internal,
        }
    }
}

/// Process-wide handle to the single 256-bit symmetric key. Loaded once and
/// memoized by whoever holds the `Arc`.
pub struct Keystore {
    key: [u8; KEY_LEN],
}

impl Keystore {
    /// Loads `<dir>/enc_key.bin`, generating it with owner-only permissions
    /// on first use.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = key_path(dir.as_ref());
        if let Ok(bytes) = std::fs::read(&path) {
            if bytes.len() == KEY_LEN {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes);
                return Ok(Self { key });
            }
            return Err(CryptoError::KeystoreUnavailable(format!(
                "key file at {} has unexpected length {}",
                path.display(),
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        std::fs::create_dir_all(dir.as_ref())?;
        write_key_file(&path, &key)?;
        Ok(Self { key })
    }

    pub fn key_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

fn key_path(dir: &Path) -> PathBuf {
    dir.join(KEY_FILE_NAME)
}

#[cfg(unix)]
fn write_key_file(path: &Path, key: &[u8; KEY_LEN]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    std::io::Write::write_all(&mut file, key)
}

#[cfg(not(unix))]
fn write_key_file(path: &Path, key: &[u8; KEY_LEN]) -> std::io::Result<()> {
    std::fs::write(path, key)
}

/// AEAD encryption/decryption contract used throughout the storage layer
/// (at-rest chunk blobs, WAL entries).
pub trait AtRestCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, blob: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM with a random 96-bit nonce prefixed to the ciphertext+tag:
/// `[12-byte nonce][ciphertext+tag]`.
pub struct AeadCipher {
    cipher: Aes256Gcm,
}

impl AeadCipher {
    pub fn new(keystore: &Keystore) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(keystore.key_bytes());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let keystore = Keystore::open(dir)?;
        Ok(Self::new(&keystore))
    }
}

impl AtRestCipher for AeadCipher {
    fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: aad.unwrap_or(&[]),
        };
        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| CryptoError::IntegrityFailure)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, blob: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::InvalidPayload);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let payload = Payload {
            msg: ciphertext,
            aad: aad.unwrap_or(&[]),
        };
        self.cipher
            .decrypt(nonce, payload)
            .map_err(|_| CryptoError::IntegrityFailure)
    }
}

/// No-op cipher for tests that don't exercise encryption semantics.
#[derive(Default)]
pub struct NoOpCipher;

impl AtRestCipher for NoOpCipher {
    fn encrypt(&self, plaintext: &[u8], _aad: Option<&[u8]>) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, blob: &[u8], _aad: Option<&[u8]>) -> Result<Vec<u8>, CryptoError> {
        Ok(blob.to_vec())
    }
}

pub fn shared_cipher_from_dir(dir: impl AsRef<Path>) -> Result<Arc<dyn AtRestCipher>, CryptoError> {
    Ok(Arc::new(AeadCipher::from_dir(dir)?))
}
