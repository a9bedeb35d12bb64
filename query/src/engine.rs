use crate::cache::EmbeddingCache;
use crate::classifier::{classify, section_boost_terms};
use crate::dsl::{QueryClass, SearchRequest};
use haven_core::config::RetrievalConfig;
use haven_core::model::{ChunkId, ChunkMetadata, FileBoosts, FileFilter};
use ingestion::Embedder;
use std::sync::Arc;
use storage::{ChunkStore, Repository};
use thiserror::Error;

/// A single retrieved and scored chunk, ready to hand to a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub chunk_id: ChunkId,
    pub file_id: String,
    pub file_name: String,
    pub file_ext: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
    pub snippet: String,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,
}

struct Hit {
    chunk_id: ChunkId,
    metadata: ChunkMetadata,
    score: f32,
}

struct KParams {
    k: usize,
    mmr_lambda: f32,
    per_doc_quota: Option<usize>,
}

/// Embeds the query, overfetches from the vector index, filters/boosts,
/// applies per-document quotas and MMR, retries on low confidence, and
/// assembles decrypted snippets.
pub struct RetrievalEngine {
    repository: Arc<Repository>,
    chunk_store: Arc<ChunkStore>,
    embedder: Arc<dyn Embedder>,
    cache: EmbeddingCache,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        repository: Arc<Repository>,
        chunk_store: Arc<ChunkStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        let cache = if config.enable_memory_cache {
            EmbeddingCache::new(config.cache_ttl_seconds)
        } else {
            EmbeddingCache::disabled()
        };
        Self {
            repository,
            chunk_store,
            embedder,
            cache,
            config,
        }
    }

    /// Invalidates cached query embeddings. The ingestion orchestrator
    /// calls this after every successful upsert.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    async fn embed_query(&self, query: &str) -> Vec<f32> {
        if let Some(cached) = self.cache.get(query) {
            return cached;
        }
        let vector = self
            .embedder
            .embed_queries(&[query.to_string()])
            .into_iter()
            .next()
            .unwrap_or_default();
        self.cache.put(query, vector.clone());
        vector
    }

    pub async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Citation>, QueryError> {
        if request.query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let corpus_size = self.repository.len().await;
        let targeted_docs = if !request.file_filter.file_ids.is_empty() {
            Some(request.file_filter.file_ids.len())
        } else {
            request.targeted_docs
        };

        let query_class = if request.enable_smart_k {
            classify(&request.query, targeted_docs)
        } else {
            QueryClass::Default
        };
        let section_terms = section_boost_terms(&request.query);

        let k_params = self.calculate_k(
            corpus_size,
            query_class,
            targeted_docs.unwrap_or(1),
            request.requested_k,
        );

        let overfetch_k = 32usize;
        let mut results = self
            .perform_retrieval(
                &request.query,
                k_params.k,
                &request.file_boosts,
                &request.file_filter,
                overfetch_k,
                &section_terms,
                k_params.per_doc_quota,
                k_params.mmr_lambda,
            )
            .await;

        if results.is_empty() && !request.file_filter.is_empty() {
            results = self
                .perform_retrieval(
                    &request.query,
                    k_params.k.max(self.config.retrieval_topk),
                    &request.file_boosts,
                    &FileFilter::default(),
                    overfetch_k,
                    &section_terms,
                    k_params.per_doc_quota,
                    k_params.mmr_lambda,
                )
                .await;
        }

        if request.enable_retry && should_retry(&results) {
            let retry_k = ((k_params.k as f32 * 1.5) as usize).min(32);
            let retry_results = self
                .perform_retrieval(
                    &request.query,
                    retry_k,
                    &request.file_boosts,
                    &request.file_filter,
                    overfetch_k,
                    &section_terms,
                    k_params.per_doc_quota,
                    k_params.mmr_lambda,
                )
                .await;
            if retry_results.len() > results.len() {
                results = retry_results;
            }
        }

        Ok(results)
    }

    fn calculate_k(
        &self,
        corpus_size: usize,
        query_class: QueryClass,
        targeted_docs: usize,
        requested_k: usize,
    ) -> KParams {
        if requested_k > 0 {
            let k = requested_k.clamp(6, 32);
            return KParams {
                k,
                mmr_lambda: 0.4,
                per_doc_quota: None,
            };
        }

        if corpus_size == 0 {
            return KParams {
                k: 8,
                mmr_lambda: 0.4,
                per_doc_quota: None,
            };
        }

        let k_base = ((2.0 * (corpus_size as f64).sqrt()).round() as i64).clamp(6, 24) as usize;

        let (mut k, mmr_lambda) = match query_class {
            QueryClass::Factoid => (k_base.saturating_sub(2).max(6), 0.5),
            QueryClass::SectionSummary => ((k_base + 4).min(32), 0.4),
            QueryClass::BroadSummary => ((k_base + 6).min(32), 0.35),
            QueryClass::Compare => ((k_base + 6).min(32), 0.35),
            QueryClass::Filtering => (k_base, 0.45),
            QueryClass::MultiDoc => ((k_base + 4).min(28), 0.35),
            QueryClass::Default => (k_base, 0.4),
        };

        k = k.min(corpus_size);

        let per_doc_quota = if targeted_docs > 1 {
            let quota = (k + targeted_docs - 1) / targeted_docs;
            let quota = quota.max(2);
            k = (quota * targeted_docs).min(k);
            Some(quota)
        } else {
            None
        };

        KParams {
            k,
            mmr_lambda,
            per_doc_quota,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn perform_retrieval(
        &self,
        query: &str,
        k: usize,
        file_boosts: &FileBoosts,
        file_filter: &FileFilter,
        overfetch_k: usize,
        section_terms: &[&'static str],
        per_doc_quota: Option<usize>,
        mmr_lambda: f32,
    ) -> Vec<Citation> {
        let query_vector = self.embed_query(query).await;
        let candidates = self.repository.search(&query_vector, k.max(overfetch_k)).await;

        let mut hits: Vec<Hit> = candidates
            .into_iter()
            .filter(|(_, _, meta)| passes_filter(meta, file_filter))
            .map(|(chunk_id, score, meta)| {
                let boosted = score * file_boosts.get(&meta.file_id).copied().unwrap_or(1.0);
                let boosted = boosted + section_boost(&meta, section_terms);
                Hit {
                    chunk_id,
                    metadata: meta,
                    score: boosted,
                }
            })
            .filter(|hit| hit.score >= self.config.retrieval_min_score)
            .collect();

        if let Some(quota) = per_doc_quota {
            hits = apply_per_doc_quota(hits, quota);
        }

        hits = diversify_by_file(hits, k.max(self.config.retrieval_topk));

        let keep_top_n = self.config.rerank_keep_topn;
        if self.config.enable_reranker {
            hits = mmr_rerank(hits, keep_top_n, mmr_lambda);
        } else {
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(keep_top_n);
        }

        let mut citations = Vec::with_capacity(hits.len().min(k));
        for hit in hits.into_iter().take(k) {
            let snippet = self.assemble_snippet(&hit.chunk_id, hit.metadata.start, hit.metadata.end);
            citations.push(Citation {
                chunk_id: hit.chunk_id,
                file_id: hit.metadata.file_id,
                file_name: hit.metadata.file_name,
                file_ext: hit.metadata.file_ext,
                start: hit.metadata.start,
                end: hit.metadata.end,
                score: hit.score,
                snippet,
            });
        }
        citations
    }

    fn assemble_snippet(&self, chunk_id: &str, start: usize, end: usize) -> String {
        let Ok(text) = self.chunk_store.get_text(chunk_id) else {
            return String::new();
        };
        safe_slice_text(&text, start, end, self.config.snippet_window_chars)
    }
}

fn passes_filter(meta: &ChunkMetadata, filter: &FileFilter) -> bool {
    if !filter.file_ids.is_empty() && !filter.file_ids.contains(&meta.file_id) {
        return false;
    }
    if !filter.chunk_ids.is_empty() && !filter.chunk_ids.contains(&meta.chunk_id) {
        return false;
    }
    true
}

fn section_boost(meta: &ChunkMetadata, section_terms: &[&'static str]) -> f32 {
    if section_terms.is_empty() {
        return 0.0;
    }
    let file_name = meta.file_name.to_lowercase();
    let boost: f32 = section_terms
        .iter()
        .filter(|term| file_name.contains(*term))
        .map(|_| 0.05)
        .sum();
    boost.min(0.15)
}

fn apply_per_doc_quota(hits: Vec<Hit>, quota: usize) -> Vec<Hit> {
    use std::collections::HashMap;
    let mut groups: HashMap<String, Vec<Hit>> = HashMap::new();
    for hit in hits {
        groups.entry(hit.metadata.file_id.clone()).or_default().push(hit);
    }

    let mut limited = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        limited.extend(group.into_iter().take(quota));
    }
    limited.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    limited
}

fn diversify_by_file(hits: Vec<Hit>, k: usize) -> Vec<Hit> {
    if k == 0 {
        return Vec::new();
    }
    let mut sorted = hits;
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::new();
    let mut used_files = std::collections::HashSet::new();
    let mut remaining = Vec::new();

    for hit in sorted {
        if used_files.insert(hit.metadata.file_id.clone()) {
            selected.push(hit);
            if selected.len() >= k {
                return selected;
            }
        } else {
            remaining.push(hit);
        }
    }

    for hit in remaining {
        selected.push(hit);
        if selected.len() >= k {
            break;
        }
    }
    selected
}

fn mmr_rerank(hits: Vec<Hit>, keep_top_n: usize, lambda: f32) -> Vec<Hit> {
    if keep_top_n == 0 || hits.is_empty() {
        return Vec::new();
    }
    let mut sorted = hits;
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut used_files = std::collections::HashSet::new();
    let mut selected = Vec::new();
    for mut hit in sorted {
        let diversity_bonus = if used_files.insert(hit.metadata.file_id.clone()) {
            0.05
        } else {
            0.0
        };
        hit.score = hit.score * lambda + diversity_bonus;
        selected.push(hit);
        if selected.len() >= keep_top_n {
            break;
        }
    }
    selected.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    selected
}

fn should_retry(results: &[Citation]) -> bool {
    if results.len() < 3 {
        return true;
    }
    if results.iter().all(|r| r.score < 0.3) {
        return true;
    }
    let distinct_files: std::collections::HashSet<&str> =
        results.iter().map(|r| r.file_id.as_str()).collect();
    if distinct_files.len() <= 1 && results.len() >= 3 {
        return true;
    }
    false
}

/// Centers a window of at most `2 * window` characters on the midpoint of
/// `[start, end]`, adding an ellipsis on whichever side was truncated.
fn safe_slice_text(text: &str, start: usize, end: usize, window: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 {
        return String::new();
    }

    let start = start.min(n - 1);
    let end = end.max(start + 1).min(n);
    let mid = (start + end) / 2;
    let left = mid.saturating_sub(window);
    let right = (mid + window).min(n);

    let snippet: String = chars[left..right].iter().collect();
    let prefix = if left > 0 { "\u{2026}" } else { "" };
    let suffix = if right < n { "\u{2026}" } else { "" };
    format!("{prefix}{snippet}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_slice_text_centers_on_the_midpoint_and_marks_truncation() {
        let text = "0123456789abcdefghijklmnopqrstuvwxyz";
        let snippet = safe_slice_text(text, 10, 12, 3);
        assert!(snippet.starts_with('\u{2026}'));
        assert!(snippet.ends_with('\u{2026}'));
    }

    #[test]
    fn safe_slice_text_on_empty_text_is_empty() {
        assert_eq!(safe_slice_text("", 0, 5, 10), "");
    }

    #[test]
    fn should_retry_triggers_below_three_results() {
        assert!(should_retry(&[]));
    }

    #[test]
    fn should_retry_triggers_when_all_scores_are_low() {
        let citation = |score: f32, file_id: &str| Citation {
            chunk_id: "c".into(),
            file_id: file_id.into(),
            file_name: "f".into(),
            file_ext: ".txt".into(),
            start: 0,
            end: 1,
            score,
            snippet: String::new(),
        };
        let results = vec![citation(0.1, "a"), citation(0.2, "b"), citation(0.1, "c")];
        assert!(should_retry(&results));
    }

    #[test]
    fn should_retry_triggers_when_single_file_dominates() {
        let citation = |score: f32| Citation {
            chunk_id: "c".into(),
            file_id: "only".into(),
            file_name: "f".into(),
            file_ext: ".txt".into(),
            start: 0,
            end: 1,
            score,
            snippet: String::new(),
        };
        let results = vec![citation(0.9), citation(0.8), citation(0.7)];
        assert!(should_retry(&results));
    }

    #[test]
    fn should_retry_false_for_healthy_diverse_results() {
        let citation = |score: f32, file_id: &str| Citation {
            chunk_id: "c".into(),
            file_id: file_id.into(),
            file_name: "f".into(),
            file_ext: ".txt".into(),
            start: 0,
            end: 1,
            score,
            snippet: String::new(),
        };
        let results = vec![citation(0.9, "a"), citation(0.8, "b"), citation(0.7, "c")];
        assert!(!should_retry(&results));
    }
}
