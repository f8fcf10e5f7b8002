//! Lexical search over the weighted full-text index.
//!
//! Query terms are sanitized down to letters, digits and apostrophes,
//! lowercased, turned into prefix matches and ANDed together. Raw bm25
//! ranks from the store (unbounded, more negative = more relevant) are
//! normalized into `(0, 1]` so every downstream consumer sees
//! higher-is-better scores.

use std::sync::Arc;

use crate::{error::Result, store::Store};

/// A normalized lexical search hit.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub collection: String,
    pub path: String,
    pub title: String,
    pub hash: String,
    /// Raw rank as reported by the full-text index.
    pub raw_rank: f32,
    /// Normalized score in `(0, 1]`.
    pub score: f32,
    pub snippet: String,
}

pub struct LexicalSearcher {
    store: Arc<Store>,
}

impl LexicalSearcher {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Run a lexical search.
    ///
    /// Returns hits ordered by normalized score descending; ties keep the
    /// underlying rank order. `min_score` applies to normalized scores.
    pub fn search(
        &self,
        query: &str,
        collection: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<LexicalHit>> {
        let Some(match_expr) = build_match_query(query) else {
            return Ok(Vec::new());
        };

        let rows = self.store.fts_query(&match_expr, collection, limit)?;

        let mut hits: Vec<LexicalHit> = rows
            .into_iter()
            .map(|row| LexicalHit {
                collection: row.collection,
                path: row.path,
                title: row.title,
                hash: row.hash,
                raw_rank: row.raw_rank,
                score: normalize_rank(row.raw_rank),
                snippet: row.snippet,
            })
            .filter(|hit| hit.score >= min_score)
            .collect();

        // Stable sort: equal scores keep the index's own ordering.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(hits)
    }
}

impl std::fmt::Debug for LexicalSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalSearcher").finish_non_exhaustive()
    }
}

/// Normalize a raw full-text rank into `(0, 1]`.
pub fn normalize_rank(raw: f32) -> f32 {
    1.0 / (1.0 + raw.abs())
}

/// Build a sanitized prefix/AND match expression from free-form query text.
///
/// Each whitespace-separated term keeps only letters, digits and
/// apostrophes, is lowercased, and becomes a quoted prefix match; terms
/// are ANDed. Returns `None` when nothing searchable remains.
///
/// # Examples
///
/// ```
/// use docfuse::lexical::build_match_query;
///
/// assert_eq!(
///     build_match_query("Hello, World!").as_deref(),
///     Some("\"hello\"* AND \"world\"*")
/// );
/// assert_eq!(build_match_query("?! ..."), None);
/// ```
pub fn build_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter_map(|term| {
            let sanitized: String = term
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
                .to_lowercase();
            if sanitized.is_empty() {
                None
            } else {
                Some(format!("\"{sanitized}\"*"))
            }
        })
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}
