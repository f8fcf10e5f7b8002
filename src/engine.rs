//! The engine facade: wires the stores, the inference seams and the
//! retrieval pipeline into the operations calling surfaces consume.

use std::{collections::HashSet, path::Path, sync::Arc};

use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use crate::{
    chunker::Chunker,
    embedding_db::EmbeddingDb,
    error::Result,
    expand::QueryExpander,
    fuse::Candidate,
    job::{EmbedJobCoordinator, JobStatus, ProgressEvent},
    lexical::LexicalSearcher,
    pipeline::{self, HybridConfig},
    rerank::Reranker,
    runtime::{Embedder, GraphModel},
    store::{DocumentRecord, Store, require_collection},
    text_util::extract_title,
    vector::{VectorHit, VectorSearcher},
    walker,
};

/// Counters reported by [`Engine::status`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub collections: usize,
    pub active_documents: usize,
    pub content_rows: usize,
    pub embedded_chunks: usize,
    pub embedding_model: String,
    pub job_running: bool,
}

/// Result of syncing a collection from disk.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncSummary {
    pub indexed: usize,
    pub removed: usize,
}

pub struct Engine {
    store: Arc<Store>,
    embeddings: Arc<EmbeddingDb>,
    embedder: Arc<dyn Embedder>,
    lexical: LexicalSearcher,
    vector: Arc<VectorSearcher>,
    expander: Option<QueryExpander>,
    reranker: Option<Reranker>,
    chunker: Chunker,
    config: HybridConfig,
    job: EmbedJobCoordinator,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        embeddings: Arc<EmbeddingDb>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let lexical = LexicalSearcher::new(store.clone());
        let vector = Arc::new(VectorSearcher::new(
            store.clone(),
            embeddings.clone(),
            embedder.clone(),
        ));
        Self {
            store,
            embeddings,
            embedder,
            lexical,
            vector,
            expander: None,
            reranker: None,
            chunker: Chunker::default(),
            config: HybridConfig::default(),
            job: EmbedJobCoordinator::new(),
        }
    }

    /// Attach a graph model, enabling query expansion and reranking.
    pub fn with_graph_model(mut self, model: Arc<dyn GraphModel>) -> Self {
        self.expander = Some(QueryExpander::new(model.clone()));
        self.reranker = Some(Reranker::new(model));
        self
    }

    pub fn with_config(mut self, config: HybridConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run the full hybrid pipeline for a query.
    pub fn query(
        &self,
        text: &str,
        collection: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        pipeline::execute_query(
            text,
            collection,
            limit,
            &self.lexical,
            &self.vector,
            self.expander.as_ref(),
            self.reranker.as_ref(),
            &self.config,
        )
    }

    /// Vector-only search.
    pub fn vsearch(
        &self,
        text: &str,
        collection: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>> {
        self.vector.search(text, collection, limit, min_score)
    }

    /// Start the background embedding job, or attach to the running one.
    ///
    /// Must be called within a tokio runtime. The returned stream carries
    /// progress events and closes after the terminal event; the vector
    /// index caches are refreshed once the job finishes.
    pub fn embed_index(
        &self,
        collection: Option<String>,
        force: bool,
    ) -> UnboundedReceiver<ProgressEvent> {
        let mut rx = self.job.start_or_attach(
            self.store.clone(),
            self.embeddings.clone(),
            self.embedder.clone(),
            self.chunker,
            collection,
            force,
        );

        let (tx, out) = unbounded_channel();
        let vector = self.vector.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let terminal = event.status != JobStatus::Running;
                let _ = tx.send(event);
                if terminal {
                    vector.invalidate_all();
                }
            }
        });
        out
    }

    pub fn job_running(&self) -> bool {
        self.job.is_running()
    }

    /// Index one document from memory.
    pub fn index_document(
        &self,
        collection: &str,
        path: &str,
        title: &str,
        text: &str,
        mtime: u64,
    ) -> Result<DocumentRecord> {
        let doc =
            self.store.index_document(collection, path, title, text, mtime)?;
        self.vector.invalidate(collection);
        Ok(doc)
    }

    /// Soft-delete one document.
    pub fn remove_document(
        &self,
        collection: &str,
        path: &str,
    ) -> Result<bool> {
        let removed = self.store.deactivate_document(collection, path)?;
        if removed {
            self.vector.invalidate(collection);
        }
        Ok(removed)
    }

    /// Crawl a registered collection's directory and (re)index its files,
    /// soft-deleting documents that disappeared from disk.
    pub fn sync_collection(&self, name: &str) -> Result<SyncSummary> {
        let info = require_collection(&self.store, name)?;
        let matcher = match &info.glob {
            Some(glob) => Some(
                globset::Glob::new(glob)
                    .map_err(|e| {
                        crate::error::Error::Config(format!(
                            "invalid glob for collection '{name}': {e}"
                        ))
                    })?
                    .compile_matcher(),
            ),
            None => None,
        };

        let files = walker::discover_files(
            Path::new(&info.root_path),
            matcher.as_ref(),
        )?;

        let mut summary = SyncSummary::default();
        let mut seen: HashSet<String> = HashSet::new();

        for file in &files {
            let Ok(text) = std::fs::read_to_string(&file.absolute_path)
            else {
                tracing::warn!(
                    "skipping unreadable file {}",
                    file.absolute_path.display()
                );
                continue;
            };
            let rel = file.relative_path.to_string_lossy().to_string();
            let title = extract_title(&text, &rel);
            self.store
                .index_document(name, &rel, &title, &text, file.mtime)?;
            seen.insert(rel);
            summary.indexed += 1;
        }

        for doc in self.store.all_active_documents(Some(name))? {
            if !seen.contains(&doc.path) {
                self.store.deactivate_document(name, &doc.path)?;
                summary.removed += 1;
            }
        }

        self.vector.invalidate(name);
        tracing::info!(
            collection = name,
            indexed = summary.indexed,
            removed = summary.removed,
            "collection synced"
        );
        Ok(summary)
    }

    pub fn status(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            collections: self.store.list_collections()?.len(),
            active_documents: self.store.count_active_documents()?,
            content_rows: self.store.count_content_rows()?,
            embedded_chunks: self.embeddings.len()?,
            embedding_model: self.embedder.model_id().to_string(),
            job_running: self.job.is_running(),
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}
