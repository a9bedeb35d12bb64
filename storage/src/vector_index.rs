use haven_core::model::{ChunkId, ChunkMetadata, FileId, VectorRecord};
use std::collections::HashMap;

/// Linear-scan cosine-similarity index over chunk embeddings. No external
/// ANN library is used; every query does a full scan, which is adequate at
/// the single-user, single-corpus scale this system targets.
pub struct VectorIndex {
    embeddings: HashMap<ChunkId, Vec<f32>>,
    metadata: HashMap<ChunkId, ChunkMetadata>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            embeddings: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, record: VectorRecord) {
        self.embeddings.insert(record.id.clone(), record.embedding);
        self.metadata.insert(record.id.clone(), record.metadata);
    }

    pub fn delete(&mut self, chunk_id: &str) -> bool {
        self.metadata.remove(chunk_id);
        self.embeddings.remove(chunk_id).is_some()
    }

    /// Removes every chunk belonging to `file_id`. Used on re-ingest and on
    /// the privacy export/purge path.
    pub fn delete_by_file(&mut self, file_id: &FileId) -> Vec<ChunkId> {
        let doomed: Vec<ChunkId> = self
            .metadata
            .iter()
            .filter(|(_, meta)| &meta.file_id == file_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            self.embeddings.remove(id);
            self.metadata.remove(id);
        }
        doomed
    }

    pub fn metadata(&self, chunk_id: &str) -> Option<&ChunkMetadata> {
        self.metadata.get(chunk_id)
    }

    pub fn embedding_dimension(&self) -> Option<usize> {
        self.embeddings
            .values()
            .find_map(|e| (!e.is_empty()).then_some(e.len()))
    }

    /// Top-k nearest neighbors by cosine similarity, highest first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(ChunkId, f32, ChunkMetadata)> {
        let mut scores: Vec<(ChunkId, f32)> = self
            .embeddings
            .iter()
            .filter_map(|(id, emb)| cosine_similarity(query, emb).map(|score| (id.clone(), score)))
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);

        scores
            .into_iter()
            .filter_map(|(id, score)| {
                let meta = self.metadata.get(&id)?.clone();
                Some((id, score, meta))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn all_metadata(&self) -> Vec<ChunkMetadata> {
        self.metadata.values().cloned().collect()
    }

    pub fn all_records(&self) -> Vec<VectorRecord> {
        self.embeddings
            .iter()
            .filter_map(|(id, embedding)| {
                let metadata = self.metadata.get(id)?.clone();
                Some(VectorRecord {
                    id: id.clone(),
                    embedding: embedding.clone(),
                    metadata,
                })
            })
            .collect()
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, file_id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
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

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let mut index = VectorIndex::new();
        index.upsert(record("c1", "f1", vec![1.0, 0.0, 0.0]));
        index.upsert(record("c2", "f1", vec![0.0, 1.0, 0.0]));
        index.upsert(record("c3", "f1", vec![0.9, 0.1, 0.0]));

        let results = index.search(&[1.0, 0.0, 0.0], 2);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "c1");
        assert_eq!(results[1].0, "c3");
    }

    #[test]
    fn delete_by_file_removes_only_matching_chunks() {
        let mut index = VectorIndex::new();
        index.upsert(record("c1", "f1", vec![1.0, 0.0]));
        index.upsert(record("c2", "f2", vec![0.0, 1.0]));

        let removed = index.delete_by_file(&"f1".to_string());

        assert_eq!(removed, vec!["c1".to_string()]);
        assert!(index.metadata("c1").is_none());
        assert!(index.metadata("c2").is_some());
    }

    #[test]
    fn delete_is_idempotent() {
        let mut index = VectorIndex::new();
        index.upsert(record("c1", "f1", vec![1.0]));
        assert!(index.delete("c1"));
        assert!(!index.delete("c1"));
    }
}
