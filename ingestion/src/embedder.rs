use sha2::{Digest, Sha256};

/// Produces fixed-width embeddings for chunk passages and queries. Separate
/// passage/query entry points mirror the asymmetric prefixing many
/// embedding models use to distinguish the two roles, even for a local
/// deterministic stand-in.
pub trait Embedder: Send + Sync {
    fn embed_passages(&self, texts: &[String]) -> Vec<Vec<f32>>;
    fn embed_queries(&self, texts: &[String]) -> Vec<Vec<f32>>;
    fn dimension(&self) -> usize;
}

/// Deterministic local embedder: hashes `prefix + model_id + text` with
/// SHA-256 and spreads the digest bytes across the configured dimension.
/// No network or model weights required, so the corpus stays entirely
/// on-device.
pub struct LocalPrefixEmbedder {
    model_id: String,
    dims: usize,
}

impl LocalPrefixEmbedder {
    pub fn new(model_id: impl Into<String>, dims: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dims: dims.max(1),
        }
    }

    fn embed_with_prefix(&self, prefix: &str, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.update(self.model_id.as_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        let raw: Vec<f32> = (0..self.dims)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 / 127.5) - 1.0
            })
            .collect();

        l2_normalize(raw)
    }
}

/// Scales a vector to unit length so downstream cosine similarity reduces
/// to a plain dot product. Leaves an all-zero vector untouched.
fn l2_normalize(vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector;
    }
    vector.into_iter().map(|x| x / norm).collect()
}

impl Default for LocalPrefixEmbedder {
    fn default() -> Self {
        Self::new("embedding-default-v1", 768)
    }
}

impl Embedder for LocalPrefixEmbedder {
    fn embed_passages(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed_with_prefix("passage:", t)).collect()
    }

    fn embed_queries(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed_with_prefix("query:", t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dims
    }
}
