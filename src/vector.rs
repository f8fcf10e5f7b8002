//! Vector search over stored chunk embeddings.
//!
//! The searcher embeds the query through the injected [`Embedder`], scans
//! per-collection flat indexes with cosine similarity, and merges results
//! across collections. Indexes are built lazily from the embedding store
//! joined with active documents and cached until invalidated; a stored
//! vector whose width disagrees with the embedder forces a rebuild that
//! filters the stale entries out instead of corrupting scores.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    embedding_db::EmbeddingDb,
    error::Result,
    runtime::Embedder,
    store::Store,
    text_util::{DEFAULT_EXCERPT_CHARS, excerpt_at},
};

/// A vector search hit. One hit per document; the score is the best
/// cosine similarity among the document's chunks.
#[derive(Debug, Clone, Serialize)]
pub struct VectorHit {
    pub collection: String,
    pub path: String,
    pub title: String,
    pub hash: String,
    /// Sequence number of the best-matching chunk.
    pub seq: u32,
    pub score: f32,
    pub excerpt: String,
}

struct IndexEntry {
    collection: String,
    path: String,
    title: String,
    hash: String,
    seq: u32,
    excerpt: String,
}

/// Flat cosine index over one collection's chunk vectors.
struct CollectionIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
    matrix: Vec<f32>,
}

impl CollectionIndex {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct VectorSearcher {
    store: Arc<Store>,
    embeddings: Arc<EmbeddingDb>,
    embedder: Arc<dyn Embedder>,
    indexes: RwLock<HashMap<String, Arc<CollectionIndex>>>,
}

impl VectorSearcher {
    pub fn new(
        store: Arc<Store>,
        embeddings: Arc<EmbeddingDb>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            embeddings,
            embedder,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Search one collection, or all known collections when none is named.
    ///
    /// Results are sorted by score descending, deduplicated by
    /// `(collection, path)` keeping the highest-scoring chunk, and
    /// truncated to `limit`. Collections without any built vectors simply
    /// contribute nothing.
    pub fn search(
        &self,
        query: &str,
        collection: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        let query_vector = self
            .embedder
            .embed(&[query.to_string()])?
            .into_iter()
            .next()
            .unwrap_or_default();

        let targets: Vec<String> = match collection {
            Some(name) => vec![name.to_string()],
            None => self.store.active_collection_names()?,
        };

        let mut hits: Vec<VectorHit> = Vec::new();
        for name in &targets {
            let index = self.index_for(name)?;
            if index.is_empty() || index.dimension != query_vector.len() {
                continue;
            }

            let scores: Vec<f32> = index
                .matrix
                .par_chunks_exact(index.dimension)
                .map(|row| cosine_similarity(&query_vector, row))
                .collect();

            for (entry, score) in index.entries.iter().zip(scores) {
                if score >= min_score {
                    hits.push(VectorHit {
                        collection: entry.collection.clone(),
                        path: entry.path.clone(),
                        title: entry.title.clone(),
                        hash: entry.hash.clone(),
                        seq: entry.seq,
                        score,
                        excerpt: entry.excerpt.clone(),
                    });
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Keep the first (highest-scoring) chunk per document.
        let mut seen = std::collections::HashSet::new();
        hits.retain(|hit| {
            seen.insert((hit.collection.clone(), hit.path.clone()))
        });
        hits.truncate(limit);

        Ok(hits)
    }

    /// Drop every cached collection index.
    ///
    /// Call after indexing documents or completing an embedding job so the
    /// next search sees fresh vectors.
    pub fn invalidate_all(&self) {
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.clear();
        }
    }

    /// Drop one collection's cached index.
    pub fn invalidate(&self, collection: &str) {
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.remove(collection);
        }
    }

    fn index_for(&self, collection: &str) -> Result<Arc<CollectionIndex>> {
        if let Ok(indexes) = self.indexes.read()
            && let Some(index) = indexes.get(collection)
        {
            return Ok(index.clone());
        }

        let index = Arc::new(self.build_index(collection)?);
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.insert(collection.to_string(), index.clone());
        }
        Ok(index)
    }

    fn build_index(&self, collection: &str) -> Result<CollectionIndex> {
        let dimension = self.embedder.dimension();
        let docs = self.store.all_active_documents(Some(collection))?;

        let mut entries = Vec::new();
        let mut matrix = Vec::new();
        let mut content_cache: HashMap<String, Option<String>> = HashMap::new();
        let mut mismatched = 0usize;

        for doc in &docs {
            let chunks = self.embeddings.load_hash(&doc.hash)?;
            if chunks.is_empty() {
                continue;
            }

            let content = content_cache
                .entry(doc.hash.clone())
                .or_insert_with(|| {
                    self.store.content_text(&doc.hash).ok().flatten()
                })
                .clone();

            for chunk in chunks {
                if chunk.vector.len() != dimension {
                    mismatched += 1;
                    continue;
                }

                let excerpt = content
                    .as_deref()
                    .map(|text| {
                        excerpt_at(
                            text,
                            chunk.pos as usize,
                            DEFAULT_EXCERPT_CHARS,
                        )
                    })
                    .unwrap_or_default();

                matrix.extend_from_slice(&chunk.vector);
                entries.push(IndexEntry {
                    collection: doc.collection.clone(),
                    path: doc.path.clone(),
                    title: doc.title.clone(),
                    hash: doc.hash.clone(),
                    seq: chunk.seq,
                    excerpt,
                });
            }
        }

        if mismatched > 0 {
            tracing::warn!(
                collection,
                mismatched,
                expected_dimension = dimension,
                "rebuilt vector index without stale-width vectors; \
                 re-run the embedding job to regenerate them"
            );
        }

        Ok(CollectionIndex {
            dimension,
            entries,
            matrix,
        })
    }
}

impl std::fmt::Debug for VectorSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorSearcher").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}
