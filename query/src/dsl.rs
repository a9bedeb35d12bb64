use haven_core::model::{FileBoosts, FileFilter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_TOP_K: usize = 1_000;

/// Rule-based complexity class a query is sorted into before retrieval
/// sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    Factoid,
    SectionSummary,
    BroadSummary,
    Compare,
    Filtering,
    MultiDoc,
    #[default]
    Default,
}

/// A caller-issued retrieval request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub requested_k: usize,
    #[serde(default)]
    pub file_boosts: FileBoosts,
    #[serde(default)]
    pub file_filter: FileFilter,
    #[serde(default = "default_true")]
    pub enable_smart_k: bool,
    #[serde(default = "default_true")]
    pub enable_retry: bool,
    /// Number of distinct files this query is scoped to, when known by the
    /// caller; drives multi-doc quota sizing.
    #[serde(default)]
    pub targeted_docs: Option<usize>,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("requested_k must be between 1 and {0} when provided")]
    InvalidRequestedK(usize),
    #[error("file_filter.file_ids must not contain empty values")]
    InvalidFileIdFilter,
    #[error("file_filter.chunk_ids must not contain empty values")]
    InvalidChunkIdFilter,
}

impl SearchRequest {
    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        if self.query.trim().is_empty() {
            return Err(QueryValidationError::EmptyQuery);
        }
        if self.requested_k > MAX_TOP_K {
            return Err(QueryValidationError::InvalidRequestedK(MAX_TOP_K));
        }
        if has_empty_values(&self.file_filter.file_ids) {
            return Err(QueryValidationError::InvalidFileIdFilter);
        }
        if has_empty_values(&self.file_filter.chunk_ids) {
            return Err(QueryValidationError::InvalidChunkIdFilter);
        }
        Ok(())
    }
}

fn has_empty_values(values: &[String]) -> bool {
    values.iter().any(|value| value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            requested_k: 0,
            file_boosts: FileBoosts::default(),
            file_filter: FileFilter::default(),
            enable_smart_k: true,
            enable_retry: true,
            targeted_docs: None,
        }
    }

    #[test]
    fn rejects_an_empty_query() {
        assert_eq!(request("  ").validate(), Err(QueryValidationError::EmptyQuery));
    }

    #[test]
    fn rejects_requested_k_over_the_cap() {
        let mut req = request("hello");
        req.requested_k = MAX_TOP_K + 1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn accepts_a_well_formed_request() {
        assert!(request("what are the goals").validate().is_ok());
    }
}
