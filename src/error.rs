use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedding database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("embedding database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("embedding database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("embedding database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("embedding database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("embedding database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl From<candle_core::Error> for Error {
    fn from(e: candle_core::Error) -> Self {
        Error::Inference(e.to_string())
    }
}
