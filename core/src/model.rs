use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type FileId = String;
pub type ChunkId = String;

/// Immutable record of an uploaded file. `upload_time` and `size` are
/// captured once at ingest time and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub original_filename: String,
    pub storage_filename: String,
    pub file_extension: String,
    pub upload_timestamp: String,
    pub file_size: u64,
}

/// Strategy tag recorded on every chunk, mirroring the extractor that
/// produced its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractStrategy {
    Txt,
    MarkdownHtmlStrip,
    PdfTextLayer,
    DocxParagraphs,
    AudioTranscript,
}

impl ExtractStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractStrategy::Txt => "txt",
            ExtractStrategy::MarkdownHtmlStrip => "markdown_html_strip",
            ExtractStrategy::PdfTextLayer => "pdf_text_layer",
            ExtractStrategy::DocxParagraphs => "docx_paragraphs",
            ExtractStrategy::AudioTranscript => "audio_transcript",
        }
    }
}

impl std::fmt::Display for ExtractStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Denormalized metadata attached to every vector record.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvDeserialize, RkyvSerialize,
)]
#[archive(check_bytes)]
pub struct ChunkMetadata {
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    pub file_name: String,
    pub original_filename: String,
    pub normalized_filename: String,
    pub storage_filename: String,
    pub file_ext: String,
    pub start: usize,
    pub end: usize,
    pub extract_strategy: String,
}

/// Lowercases, replaces punctuation/underscores with spaces and collapses
/// whitespace, producing a filename stable enough to match across
/// re-uploads of the same document.
pub fn normalize_filename(name: &str) -> String {
    let lowered = name.to_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A vector record as carried by the vector index: an embedding plus its
/// metadata mirror, keyed by `chunk_id`.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvDeserialize, RkyvSerialize,
)]
#[archive(check_bytes)]
pub struct VectorRecord {
    pub id: ChunkId,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    Received,
    Extracting,
    Transcribing,
    Chunking,
    Embedding,
    Upserting,
    Complete,
    Error,
}

impl IngestionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStage::Complete | IngestionStage::Error)
    }
}

/// Per-file ingestion progress, the single source of truth for status
/// queries — never inferred from side effects elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub file_id: FileId,
    pub stage: IngestionStage,
    pub progress: u8,
    pub error: Option<String>,
}

impl IngestionStatus {
    pub fn received(file_id: FileId) -> Self {
        Self {
            file_id,
            stage: IngestionStage::Received,
            progress: 0,
            error: None,
        }
    }
}

/// File-scoped boosts/filters a caller may attach to a retrieval request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFilter {
    #[serde(default)]
    pub file_ids: Vec<FileId>,
    #[serde(default)]
    pub chunk_ids: Vec<ChunkId>,
}

impl FileFilter {
    pub fn is_empty(&self) -> bool {
        self.file_ids.is_empty() && self.chunk_ids.is_empty()
    }
}

pub type FileBoosts = HashMap<FileId, f32>;
