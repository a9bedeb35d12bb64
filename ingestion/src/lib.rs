pub mod chunker;
pub mod embedder;
pub mod extract;
pub mod normalize;
pub mod orchestrator;

pub use chunker::{ChunkError, TextChunk};
pub use embedder::{Embedder, LocalPrefixEmbedder};
pub use extract::{ExtractError, NullTranscriber, Transcriber};
pub use orchestrator::{
    CacheInvalidationHook, ChunkStrategy, IngestionError, IngestionPipeline, StatusTable,
};
