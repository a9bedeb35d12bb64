use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// User-data root; subdirectories `uploads/`, `chunks/`, `transcripts/`,
    /// `vectorstore/`, `keystore/`, `privacy/` live under it.
    pub data_dir: String,
    pub wal_flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir()
                .to_string_lossy()
                .into_owned(),
            wal_flush_interval_ms: 200,
        }
    }
}

/// OS-specific application-data directory for user corpus files.
fn default_data_dir() -> PathBuf {
    let home = dirs_home();
    if cfg!(target_os = "macos") {
        home.join("Library")
            .join("Application Support")
            .join("Haven")
            .join("data")
    } else if cfg!(target_os = "windows") {
        env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or(home)
            .join("Haven")
            .join("data")
    } else {
        home.join(".local").join("share").join("haven").join("data")
    }
}

fn dirs_home() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_target_tokens: usize,
    pub chunk_min_tokens: usize,
    pub chunk_overlap_tokens: usize,
    /// Fixed-char chunker window, used by the `fixed-char` strategy.
    pub fixed_char_size: usize,
    pub fixed_char_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_target_tokens: 1000,
            chunk_min_tokens: 200,
            chunk_overlap_tokens: 150,
            fixed_char_size: 1000,
            fixed_char_overlap: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub retrieval_topk: usize,
    /// Similarity-score confidence floor. Assumes a cosine-like metric;
    /// recalibrate if the vector index backend uses a different one.
    pub retrieval_min_score: f32,
    pub mmr_lambda: f32,
    pub enable_reranker: bool,
    pub rerank_keep_topn: usize,
    pub snippet_window_chars: usize,
    pub max_context_chars: usize,
    pub enable_memory_cache: bool,
    pub cache_ttl_seconds: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_topk: 12,
            retrieval_min_score: 0.15,
            mmr_lambda: 0.5,
            enable_reranker: true,
            rerank_keep_topn: 6,
            snippet_window_chars: 240,
            max_context_chars: 4000,
            enable_memory_cache: true,
            cache_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub max_file_size_mb: u64,
    pub max_audio_duration_minutes: u64,
    pub supported_text_formats: Vec<String>,
    pub supported_audio_formats: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_audio_duration_minutes: 60,
            supported_text_formats: vec![
                ".txt".to_string(),
                ".md".to_string(),
                ".pdf".to_string(),
                ".docx".to_string(),
            ],
            supported_audio_formats: vec![".mp3".to_string()],
        }
    }
}

impl IngestConfig {
    pub fn supports_extension(&self, ext: &str) -> bool {
        let set: HashSet<&str> = self
            .supported_text_formats
            .iter()
            .chain(self.supported_audio_formats.iter())
            .map(String::as_str)
            .collect();
        set.contains(ext)
    }

    pub fn is_audio_extension(&self, ext: &str) -> bool {
        self.supported_audio_formats.iter().any(|e| e == ext)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Layers `config/default.{toml,yaml,...}`, then `config/<RUN_MODE>`,
    /// then `HAVEN_*` environment variables over the built-in defaults.
    /// Every field has a default, so a bare environment with no config
    /// files still produces a usable configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("HAVEN").separator("__"));

        builder.build()?.try_deserialize()
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.data_dir().join("chunks")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.data_dir().join("transcripts")
    }

    pub fn vectorstore_dir(&self) -> PathBuf {
        self.data_dir().join("vectorstore")
    }

    pub fn keystore_dir(&self) -> PathBuf {
        self.data_dir().join("keystore")
    }

    pub fn privacy_dir(&self) -> PathBuf {
        self.data_dir().join("privacy")
    }

    /// Eagerly creates every data subdirectory, mirroring the original
    /// backend's `validate_paths()` startup step.
    pub fn ensure_data_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.uploads_dir(),
            self.chunks_dir(),
            self.transcripts_dir(),
            self.vectorstore_dir(),
            self.keystore_dir(),
            self.privacy_dir(),
        ] {
            ensure_dir(&dir)?;
        }
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.chunking.chunk_target_tokens, 1000);
        assert_eq!(cfg.chunking.chunk_min_tokens, 200);
        assert_eq!(cfg.chunking.chunk_overlap_tokens, 150);
        assert_eq!(cfg.retrieval.retrieval_topk, 12);
        assert!((cfg.retrieval.retrieval_min_score - 0.15).abs() < f32::EPSILON);
        assert!((cfg.retrieval.mmr_lambda - 0.5).abs() < f32::EPSILON);
        assert_eq!(cfg.retrieval.rerank_keep_topn, 6);
        assert_eq!(cfg.retrieval.snippet_window_chars, 240);
        assert_eq!(cfg.ingest.max_file_size_mb, 100);
        assert_eq!(cfg.ingest.max_audio_duration_minutes, 60);
    }

    #[test]
    fn ingest_config_supports_configured_extensions_only() {
        let cfg = IngestConfig::default();
        assert!(cfg.supports_extension(".pdf"));
        assert!(cfg.supports_extension(".mp3"));
        assert!(!cfg.supports_extension(".exe"));
        assert!(cfg.is_audio_extension(".mp3"));
        assert!(!cfg.is_audio_extension(".pdf"));
    }
}
