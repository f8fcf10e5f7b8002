//! docfuse - a local-first hybrid document retrieval engine.
//!
//! docfuse indexes collections of text documents and answers queries by
//! fusing lexical (FTS5 keyword) and semantic (vector) search with
//! weighted Reciprocal Rank Fusion, then refines the fused head with a
//! cross-encoder reranker. A single-flight background job chunks and
//! embeds documents while streaming progress to every attached caller.
//!
//! # Quick start
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use docfuse::{EmbeddingDb, Engine, Store};
//! use docfuse::runtime::HashEmbedder;
//!
//! let store = Arc::new(Store::open(Path::new("store.sqlite3")).unwrap());
//! let embeddings =
//!     Arc::new(EmbeddingDb::open(Path::new("embeddings.redb")).unwrap());
//! let engine =
//!     Engine::new(store, embeddings, Arc::new(HashEmbedder::default()));
//!
//! let results = engine.query("rust ownership", None, 10).unwrap();
//! for r in &results {
//!     println!("{}:{} (score: {:.3})", r.collection, r.path, r.final_score);
//! }
//! ```

pub mod chunker;
pub mod data_dir;
pub mod embedding_db;
pub mod engine;
pub mod error;
pub mod expand;
pub mod fuse;
pub mod job;
pub mod lexical;
pub mod pipeline;
pub mod rerank;
pub mod runtime;
pub mod store;
pub mod text_util;
pub mod vector;
pub mod walker;

pub use chunker::{Chunker, ChunkerConfig};
pub use data_dir::DataDir;
pub use embedding_db::EmbeddingDb;
pub use engine::Engine;
pub use error::{Error, Result};
pub use fuse::Candidate;
pub use job::{JobStatus, ProgressEvent};
pub use pipeline::HybridConfig;
pub use store::Store;
