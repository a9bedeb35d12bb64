use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TTL cache of query embeddings keyed by the raw query string. Mutated
/// under a mutex; entries expire lazily on read rather than via a
/// background sweep.
pub struct EmbeddingCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Vec<f32>)>>,
}

impl EmbeddingCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A zero-second TTL disables caching entirely.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        if self.ttl.is_zero() {
            return None;
        }
        let mut entries = self.entries.lock().unwrap();
        match entries.get(query) {
            Some((inserted_at, vector)) if inserted_at.elapsed() <= self.ttl => {
                Some(vector.clone())
            }
            Some(_) => {
                entries.remove(query);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, query: &str, vector: Vec<f32>) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries
            .lock()
            .unwrap()
            .insert(query.to_string(), (Instant::now(), vector));
    }

    /// Invalidates every cached embedding. Called after a successful
    /// ingestion upsert so retrieval never serves a stale query vector
    /// against a corpus that has since changed shape.
    pub fn invalidate_all(&self) {
        self.entries.lock().unwrap().clear();
    }
}
