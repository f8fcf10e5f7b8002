//! The hybrid query pipeline.
//!
//! A query fans out to lexical and vector search (optionally after query
//! expansion), the per-variant result lists are fused with weighted
//! Reciprocal Rank Fusion, the top slice is reranked and blended, and the
//! deduplicated ranking comes back. Every stage past the innermost
//! retrieval is best-effort: expansion or rerank trouble degrades to the
//! plain fused ranking instead of failing the request.

use crate::{
    error::Result,
    expand::QueryExpander,
    fuse::{
        BlendParams, Candidate, FusionEntry, FusionParams, RankedList, blend,
        dedup_candidates, fuse,
    },
    lexical::{LexicalHit, LexicalSearcher},
    rerank::Reranker,
    vector::{VectorHit, VectorSearcher},
};

/// Pipeline tunables. Defaults preserve the empirically settled ranking
/// constants; treat them as configuration rather than something to edit
/// in place.
#[derive(Debug, Clone, Copy)]
pub struct HybridConfig {
    /// Minimum top lexical score for the strong-signal shortcut.
    pub strong_signal_score: f32,
    /// Minimum lead over the runner-up for the strong-signal shortcut.
    pub strong_signal_gap: f32,
    /// Weight of the original query's result lists in fusion.
    pub original_weight: f32,
    /// Weight of each expanded variant's result lists.
    pub variant_weight: f32,
    /// Per-variant retrieval limit as a multiple of the requested limit.
    pub retrieval_factor: usize,
    /// How many fused candidates survive into the rerank stage.
    pub rerank_candidates: usize,
    /// How many of those actually get reranked.
    pub rerank_top: usize,
    pub fusion: FusionParams,
    pub blend: BlendParams,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            strong_signal_score: 0.85,
            strong_signal_gap: 0.15,
            original_weight: 2.0,
            variant_weight: 1.0,
            retrieval_factor: 3,
            rerank_candidates: 40,
            rerank_top: 10,
            fusion: FusionParams::default(),
            blend: BlendParams::default(),
        }
    }
}

/// Execute the full hybrid pipeline for one query.
///
/// `expander` and `reranker` are optional: without them the pipeline runs
/// retrieval and fusion only, which is also the degraded path when either
/// stage fails at runtime.
pub fn execute_query(
    query: &str,
    collection: Option<&str>,
    limit: usize,
    lexical: &LexicalSearcher,
    vector: &VectorSearcher,
    expander: Option<&QueryExpander>,
    reranker: Option<&Reranker>,
    config: &HybridConfig,
) -> Result<Vec<Candidate>> {
    let retrieval_limit = limit.max(1) * config.retrieval_factor.max(1);

    // Stage 1: one lexical pass doubling as the strong-signal probe.
    let original_lexical =
        lexical.search(query, collection, retrieval_limit, 0.0);
    let skip_expansion = match &original_lexical {
        Ok(hits) => is_strong_signal(hits, config),
        Err(_) => false,
    };

    // Stage 2: typed query variants.
    let expansion = match expander {
        Some(expander) if !skip_expansion => expander.expand(query),
        _ => Default::default(),
    };

    let mut lexical_variants: Vec<&str> = Vec::new();
    let mut vector_variants: Vec<&str> = Vec::new();
    for variant in &expansion.lexical {
        lexical_variants.push(variant);
    }
    for variant in
        expansion.semantic.iter().chain(&expansion.hypothetical)
    {
        lexical_variants.push(variant);
        vector_variants.push(variant);
    }

    // Stage 3: multi-query retrieval. The original query is weighted
    // heavier than any variant; variant failures only cost coverage.
    let mut lists: Vec<RankedList> = Vec::new();

    let original_vector =
        vector.search(query, collection, retrieval_limit, 0.0);
    // Both retrieval paths gone means there is nothing to fall back to.
    let (original_lexical, original_vector) =
        match (original_lexical, original_vector) {
            (Err(e), Err(_)) => return Err(e),
            pair => pair,
        };

    match original_lexical {
        Ok(hits) => lists.push(RankedList {
            weight: config.original_weight,
            entries: hits.iter().map(lexical_entry).collect(),
        }),
        Err(e) => tracing::warn!("lexical search failed: {e}"),
    }
    match original_vector {
        Ok(hits) => lists.push(RankedList {
            weight: config.original_weight,
            entries: hits.iter().map(vector_entry).collect(),
        }),
        Err(e) => tracing::warn!("vector search failed: {e}"),
    }

    for variant in &lexical_variants {
        match lexical.search(variant, collection, retrieval_limit, 0.0) {
            Ok(hits) if !hits.is_empty() => lists.push(RankedList {
                weight: config.variant_weight,
                entries: hits.iter().map(lexical_entry).collect(),
            }),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("lexical variant {variant:?} failed: {e}");
            }
        }
    }
    for variant in &vector_variants {
        match vector.search(variant, collection, retrieval_limit, 0.0) {
            Ok(hits) if !hits.is_empty() => lists.push(RankedList {
                weight: config.variant_weight,
                entries: hits.iter().map(vector_entry).collect(),
            }),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("vector variant {variant:?} failed: {e}");
            }
        }
    }

    // Stage 4: weighted RRF with positional bonuses.
    let mut fused = fuse(&lists, &config.fusion);
    fused.truncate(config.rerank_candidates);

    // Stage 5: rerank only the head; the tail keeps its fusion order.
    let head_len = fused.len().min(config.rerank_top);
    let tail = fused.split_off(head_len);
    let mut head = match reranker {
        Some(reranker) => reranker.rerank(query, fused, config.rerank_top),
        None => fused,
    };

    // Stage 6: blend reranker judgment with fusion position.
    blend(&mut head, &config.blend);

    // Stage 7: dedup, final order, limit.
    head.extend(tail);
    let mut results = dedup_candidates(head);
    results.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    Ok(results)
}

/// An unambiguous lexical match skips expansion entirely: the top hit must
/// clear the score floor and lead the runner-up by the configured gap.
fn is_strong_signal(hits: &[LexicalHit], config: &HybridConfig) -> bool {
    let Some(top) = hits.first() else {
        return false;
    };
    if top.score < config.strong_signal_score {
        return false;
    }
    match hits.get(1) {
        Some(second) => top.score - second.score >= config.strong_signal_gap,
        None => true,
    }
}

fn lexical_entry(hit: &LexicalHit) -> FusionEntry {
    FusionEntry {
        collection: hit.collection.clone(),
        path: hit.path.clone(),
        title: hit.title.clone(),
        excerpt: hit.snippet.clone(),
        lexical_score: Some(hit.score),
        vector_score: None,
    }
}

fn vector_entry(hit: &VectorHit) -> FusionEntry {
    FusionEntry {
        collection: hit.collection.clone(),
        path: hit.path.clone(),
        title: hit.title.clone(),
        excerpt: hit.excerpt.clone(),
        lexical_score: None,
        vector_score: Some(hit.score),
    }
}
