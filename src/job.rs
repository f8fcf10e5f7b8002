//! The background embedding job.
//!
//! At most one job runs per process. `start_or_attach` either launches a
//! new job or registers the caller as an observer of the one in flight,
//! immediately replaying the current progress snapshot so late joiners are
//! never blind. Every state change — start, each embedded batch,
//! completion, failure — is broadcast to all attached observers; a dropped
//! observer is pruned on the next broadcast and never cancels the job.
//!
//! The job pre-computes every chunk up front so progress totals are exact,
//! then embeds fixed-size batches on the blocking pool and writes vectors
//! back keyed by `(hash, seq)`.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use tokio::sync::mpsc::{
    UnboundedReceiver, UnboundedSender, unbounded_channel,
};

use crate::{
    chunker::Chunker,
    embedding_db::{EmbeddingDb, EmbeddingEntry},
    error::{Error, Result},
    runtime::Embedder,
    store::Store,
};

/// Chunks embedded per inference call.
pub const EMBED_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Complete,
    Error,
}

/// One progress update. The stream ends with a `Complete` or `Error`
/// event, after which the channel closes.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub status: JobStatus,
    /// True only on the snapshot replayed to a late-joining observer.
    pub attached: bool,
    pub done_chunks: usize,
    pub total_chunks: usize,
    pub done_docs: usize,
    pub total_docs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct JobState {
    running: bool,
    collection: Option<String>,
    force: bool,
    done_chunks: usize,
    total_chunks: usize,
    done_docs: usize,
    total_docs: usize,
    error: Option<String>,
    observers: Vec<UnboundedSender<ProgressEvent>>,
}

impl JobState {
    fn idle() -> Self {
        Self {
            running: false,
            collection: None,
            force: false,
            done_chunks: 0,
            total_chunks: 0,
            done_docs: 0,
            total_docs: 0,
            error: None,
            observers: Vec::new(),
        }
    }

    fn snapshot(&self, status: JobStatus, attached: bool) -> ProgressEvent {
        ProgressEvent {
            status,
            attached,
            done_chunks: self.done_chunks,
            total_chunks: self.total_chunks,
            done_docs: self.done_docs,
            total_docs: self.total_docs,
            error: self.error.clone(),
        }
    }

    fn broadcast(&mut self, event: ProgressEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// A chunk waiting to be embedded.
struct ChunkTask {
    hash: String,
    seq: u32,
    pos: u32,
    text: String,
    /// Marks the final chunk of its content hash for doc-level progress.
    last_of_doc: bool,
}

/// Single-flight coordinator for the background embedding job.
#[derive(Clone)]
pub struct EmbedJobCoordinator {
    state: Arc<Mutex<JobState>>,
}

impl Default for EmbedJobCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbedJobCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(JobState::idle())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Start an embedding job, or attach to the one already running.
    ///
    /// Must be called from within a tokio runtime. The returned receiver
    /// yields progress events and closes after the terminal event. When a
    /// job is already in flight the new observer immediately receives a
    /// snapshot event flagged `attached`, regardless of the requested
    /// filter or force flag.
    pub fn start_or_attach(
        &self,
        store: Arc<Store>,
        embeddings: Arc<EmbeddingDb>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        collection: Option<String>,
        force: bool,
    ) -> UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = unbounded_channel();

        let mut state = self.lock();
        if state.running {
            let _ = tx.send(state.snapshot(JobStatus::Running, true));
            state.observers.push(tx);
            return rx;
        }

        *state = JobState::idle();
        state.running = true;
        state.collection = collection.clone();
        state.force = force;
        state.observers.push(tx);
        drop(state);

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator
                .run_job(store, embeddings, embedder, chunker, collection, force)
                .await;
        });

        rx
    }

    async fn run_job(
        &self,
        store: Arc<Store>,
        embeddings: Arc<EmbeddingDb>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        collection: Option<String>,
        force: bool,
    ) {
        let outcome = self
            .process(store, embeddings, embedder, chunker, collection, force)
            .await;

        let mut state = self.lock();
        let event = match outcome {
            Ok(()) => {
                tracing::info!(
                    chunks = state.done_chunks,
                    docs = state.done_docs,
                    "embedding job complete"
                );
                state.snapshot(JobStatus::Complete, false)
            }
            Err(e) => {
                tracing::error!("embedding job failed: {e}");
                state.error = Some(e.to_string());
                state.snapshot(JobStatus::Error, false)
            }
        };
        state.broadcast(event);

        // Back to idle; dropping the observers closes every channel,
        // which is the stream-terminating sentinel.
        *state = JobState::idle();
    }

    async fn process(
        &self,
        store: Arc<Store>,
        embeddings: Arc<EmbeddingDb>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        collection: Option<String>,
        force: bool,
    ) -> Result<()> {
        // The exact set of content hashes this job owns.
        let active = store.active_hashes(collection.as_deref())?;
        let hashes: Vec<String> = if force {
            active
        } else {
            active
                .into_iter()
                .filter(|hash| {
                    !embeddings.contains_hash(hash).unwrap_or(false)
                })
                .collect()
        };

        if force {
            for hash in &hashes {
                embeddings.remove_hash(hash)?;
            }
        }

        // Pre-compute every chunk up front for exact progress totals.
        let mut tasks: Vec<ChunkTask> = Vec::new();
        let mut total_docs = 0usize;
        for hash in &hashes {
            let Some(text) = store.content_text(hash)? else {
                continue;
            };
            let chunks = chunker.chunk_text(&text);
            if chunks.is_empty() {
                continue;
            }
            total_docs += 1;
            let count = chunks.len();
            for (i, chunk) in chunks.into_iter().enumerate() {
                tasks.push(ChunkTask {
                    hash: hash.clone(),
                    seq: chunk.seq as u32,
                    pos: chunk.pos as u32,
                    text: chunk.text,
                    last_of_doc: i + 1 == count,
                });
            }
        }

        {
            let mut state = self.lock();
            state.total_chunks = tasks.len();
            state.total_docs = total_docs;
            let event = state.snapshot(JobStatus::Running, false);
            state.broadcast(event);
        }

        let model_id = embedder.model_id().to_string();

        for batch in tasks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> =
                batch.iter().map(|t| t.text.clone()).collect();
            let batch_embedder = embedder.clone();
            let vectors = tokio::task::spawn_blocking(move || {
                batch_embedder.embed(&texts)
            })
            .await
            .map_err(|e| {
                Error::Inference(format!("embedding task panicked: {e}"))
            })??;

            if vectors.len() != batch.len() {
                return Err(Error::Inference(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            let expected = embedder.dimension();
            for vector in &vectors {
                if vector.len() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        got: vector.len(),
                    });
                }
            }

            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let entries: Vec<EmbeddingEntry> = batch
                .iter()
                .zip(vectors)
                .map(|(task, vector)| EmbeddingEntry {
                    hash: task.hash.clone(),
                    seq: task.seq,
                    pos: task.pos,
                    vector,
                    model: model_id.clone(),
                    timestamp,
                })
                .collect();
            embeddings.batch_store(&entries)?;

            let mut state = self.lock();
            state.done_chunks += batch.len();
            state.done_docs +=
                batch.iter().filter(|t| t.last_of_doc).count();
            let event = state.snapshot(JobStatus::Running, false);
            state.broadcast(event);
        }

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EmbedJobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EmbedJobCoordinator")
            .field("running", &state.running)
            .field("collection", &state.collection)
            .finish_non_exhaustive()
    }
}
