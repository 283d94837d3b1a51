//! Query requests and results for the full-text backend.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use pindex_types::{PIndexError, Result};

pub const DEFAULT_LIMIT: usize = 10;

/// `{"query": "pale ale", "limit": 10}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FullTextQuery {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FullTextQuery {
    pub fn parse(req: &[u8]) -> Result<Self> {
        let query: FullTextQuery =
            serde_json::from_slice(req).map_err(|e| PIndexError::InvalidQuery(e.to_string()))?;
        if query.limit == Some(0) {
            return Err(PIndexError::InvalidQuery("limit must be > 0".to_string()));
        }
        Ok(query)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub partition: String,
    pub key: String,
    pub seq: u64,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullTextResult {
    pub total_hits: u64,
    pub hits: Vec<Hit>,
}

impl FullTextResult {
    /// Combine partial results: totals add up, hits are re-ranked by score
    /// and cut to `limit`.
    pub fn merge(parts: Vec<FullTextResult>, limit: usize) -> Self {
        let mut merged = FullTextResult::default();
        for part in parts {
            merged.total_hits += part.total_hits;
            merged.hits.extend(part.hits);
        }
        merged.hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.partition.cmp(&b.partition))
                .then_with(|| a.key.cmp(&b.key))
        });
        merged.hits.truncate(limit);
        merged
    }
}
