use std::path::Path;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};

use crate::error::Result;

const EMBEDDINGS: TableDefinition<(&str, u32), &[u8]> =
    TableDefinition::new("embeddings");

/// Header size: 4 bytes chunk position + 4 bytes dimension.
const HEADER_SIZE: usize = 8;
/// Trailer size before the model id: 8 bytes timestamp.
const TIMESTAMP_SIZE: usize = 8;

/// Stores chunk embedding vectors keyed by `(content_hash, chunk_seq)`.
///
/// The content hash is the ownership key: embeddings belong to content, not
/// to documents, so two documents with identical text share one set of
/// vectors. Regeneration therefore clears by hash, never by document.
///
/// Binary format per entry:
/// - 4 bytes: chunk start offset in characters (u32 LE)
/// - 4 bytes: vector dimension D (u32 LE)
/// - D * 4 bytes: f32 LE vector values
/// - 8 bytes: unix timestamp of embedding (u64 LE)
/// - remaining bytes: UTF-8 model identifier
pub struct EmbeddingDb {
    db: Database,
}

/// A single embedding prepared for [`EmbeddingDb::batch_store`].
#[derive(Debug, Clone)]
pub struct EmbeddingEntry {
    pub hash: String,
    pub seq: u32,
    pub pos: u32,
    pub vector: Vec<f32>,
    pub model: String,
    pub timestamp: u64,
}

/// A retrieved chunk embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub seq: u32,
    pub pos: u32,
    pub vector: Vec<f32>,
    pub model: String,
    pub timestamp: u64,
}

impl EmbeddingDb {
    /// Open or create an embeddings database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use docfuse::EmbeddingDb;
    ///
    /// let db = EmbeddingDb::open(&tmp.path().join("embeddings.redb")).unwrap();
    /// assert!(db.list_hashes().unwrap().is_empty());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(EMBEDDINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Store one chunk embedding.
    pub fn store(
        &self,
        hash: &str,
        seq: u32,
        pos: u32,
        vector: &[f32],
        model: &str,
        timestamp: u64,
    ) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            write_entry(&mut table, hash, seq, pos, vector, model, timestamp)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Store multiple embeddings in a single transaction.
    pub fn batch_store(&self, entries: &[EmbeddingEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for e in entries {
                write_entry(
                    &mut table,
                    &e.hash,
                    e.seq,
                    e.pos,
                    &e.vector,
                    &e.model,
                    e.timestamp,
                )?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Retrieve a single chunk embedding, or None if absent or malformed.
    pub fn load(&self, hash: &str, seq: u32) -> Result<Option<StoredEmbedding>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let Some(guard) = table.get((hash, seq))? else {
            return Ok(None);
        };

        Ok(decode_entry(seq, guard.value()))
    }

    /// Retrieve every chunk embedding for a content hash, ordered by seq.
    pub fn load_hash(&self, hash: &str) -> Result<Vec<StoredEmbedding>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let mut result = Vec::new();
        for entry in table.range((hash, 0u32)..=(hash, u32::MAX))? {
            let (key, value) = entry?;
            let (_, seq) = key.value();
            if let Some(stored) = decode_entry(seq, value.value()) {
                result.push(stored);
            }
        }
        Ok(result)
    }

    /// True when at least one chunk embedding exists for the hash.
    pub fn contains_hash(&self, hash: &str) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        let mut range = table.range((hash, 0u32)..=(hash, u32::MAX))?;
        Ok(range.next().transpose()?.is_some())
    }

    /// Distinct content hashes with stored embeddings, sorted.
    pub fn list_hashes(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        let mut result: Vec<String> = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            let (hash, _) = key.value();
            if result.last().is_none_or(|last| last != hash) {
                result.push(hash.to_string());
            }
        }
        Ok(result)
    }

    /// Remove every chunk embedding for a content hash.
    ///
    /// Returns the number of entries removed.
    pub fn remove_hash(&self, hash: &str) -> Result<usize> {
        let keys: Vec<u32> = {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(EMBEDDINGS)?;
            let mut keys = Vec::new();
            for entry in table.range((hash, 0u32)..=(hash, u32::MAX))? {
                let (key, _) = entry?;
                keys.push(key.value().1);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for seq in &keys {
                table.remove((hash, *seq))?;
            }
        }
        txn.commit()?;
        Ok(keys.len())
    }

    /// Drop every stored embedding. Returns the number of entries removed.
    pub fn clear_all(&self) -> Result<usize> {
        let count = self.len()?;
        let txn = self.db.begin_write()?;
        txn.delete_table(EMBEDDINGS)?;
        txn.open_table(EMBEDDINGS)?;
        txn.commit()?;
        Ok(count)
    }

    /// Total number of stored chunk embeddings.
    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        Ok(table.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for EmbeddingDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingDb").finish_non_exhaustive()
    }
}

fn write_entry(
    table: &mut redb::Table<'_, (&'static str, u32), &'static [u8]>,
    hash: &str,
    seq: u32,
    pos: u32,
    vector: &[f32],
    model: &str,
    timestamp: u64,
) -> Result<()> {
    let vector_bytes = std::mem::size_of_val(vector);
    let byte_len =
        HEADER_SIZE + vector_bytes + TIMESTAMP_SIZE + model.len();

    let mut guard = table.insert_reserve((hash, seq), byte_len)?;
    let dest = guard.as_mut();

    dest[0..4].copy_from_slice(&pos.to_le_bytes());
    dest[4..8].copy_from_slice(&(vector.len() as u32).to_le_bytes());
    dest[HEADER_SIZE..HEADER_SIZE + vector_bytes]
        .copy_from_slice(bytemuck::cast_slice(vector));

    let ts_start = HEADER_SIZE + vector_bytes;
    dest[ts_start..ts_start + TIMESTAMP_SIZE]
        .copy_from_slice(&timestamp.to_le_bytes());
    dest[ts_start + TIMESTAMP_SIZE..].copy_from_slice(model.as_bytes());

    Ok(())
}

fn decode_entry(seq: u32, bytes: &[u8]) -> Option<StoredEmbedding> {
    if bytes.len() < HEADER_SIZE + TIMESTAMP_SIZE {
        return None;
    }

    let pos = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let dim = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;

    let vector_end = HEADER_SIZE + dim * 4;
    if bytes.len() < vector_end + TIMESTAMP_SIZE {
        return None;
    }

    let vector: Vec<f32> =
        bytemuck::pod_collect_to_vec(&bytes[HEADER_SIZE..vector_end]);
    let timestamp = u64::from_le_bytes(
        bytes[vector_end..vector_end + TIMESTAMP_SIZE]
            .try_into()
            .unwrap(),
    );
    let model = String::from_utf8_lossy(&bytes[vector_end + TIMESTAMP_SIZE..])
        .to_string();

    Some(StoredEmbedding {
        seq,
        pos,
        vector,
        model,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, EmbeddingDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db =
            EmbeddingDb::open(&tmp.path().join("embeddings.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn store_and_load() {
        let (_tmp, db) = test_db();

        let vector = vec![0.1, 0.2, 0.3, 0.4];
        db.store("abc", 0, 0, &vector, "test-model", 1700000000)
            .unwrap();

        let stored = db.load("abc", 0).unwrap().unwrap();
        assert_eq!(stored.seq, 0);
        assert_eq!(stored.pos, 0);
        assert_eq!(stored.vector, vector);
        assert_eq!(stored.model, "test-model");
        assert_eq!(stored.timestamp, 1700000000);
    }

    #[test]
    fn load_missing_returns_none() {
        let (_tmp, db) = test_db();
        assert!(db.load("ghost", 0).unwrap().is_none());
    }

    #[test]
    fn load_hash_returns_chunks_in_seq_order() {
        let (_tmp, db) = test_db();

        db.store("abc", 2, 400, &[3.0], "m", 3).unwrap();
        db.store("abc", 0, 0, &[1.0], "m", 1).unwrap();
        db.store("abc", 1, 200, &[2.0], "m", 2).unwrap();
        db.store("other", 0, 0, &[9.0], "m", 9).unwrap();

        let chunks = db.load_hash("abc").unwrap();
        let seqs: Vec<u32> = chunks.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(chunks[2].pos, 400);
    }

    #[test]
    fn list_hashes_deduplicates() {
        let (_tmp, db) = test_db();

        db.store("aaa", 0, 0, &[1.0], "m", 1).unwrap();
        db.store("aaa", 1, 10, &[2.0], "m", 1).unwrap();
        db.store("bbb", 0, 0, &[3.0], "m", 1).unwrap();

        assert_eq!(db.list_hashes().unwrap(), vec!["aaa", "bbb"]);
    }

    #[test]
    fn contains_hash() {
        let (_tmp, db) = test_db();
        db.store("aaa", 3, 0, &[1.0], "m", 1).unwrap();

        assert!(db.contains_hash("aaa").unwrap());
        assert!(!db.contains_hash("bbb").unwrap());
    }

    #[test]
    fn remove_hash_clears_all_chunks() {
        let (_tmp, db) = test_db();

        db.store("aaa", 0, 0, &[1.0], "m", 1).unwrap();
        db.store("aaa", 1, 10, &[2.0], "m", 1).unwrap();
        db.store("bbb", 0, 0, &[3.0], "m", 1).unwrap();

        assert_eq!(db.remove_hash("aaa").unwrap(), 2);
        assert!(db.load_hash("aaa").unwrap().is_empty());
        assert_eq!(db.remove_hash("aaa").unwrap(), 0);
        // Other hashes are untouched.
        assert!(db.contains_hash("bbb").unwrap());
    }

    #[test]
    fn clear_all_empties_the_table() {
        let (_tmp, db) = test_db();

        db.store("aaa", 0, 0, &[1.0], "m", 1).unwrap();
        db.store("bbb", 0, 0, &[2.0], "m", 1).unwrap();

        assert_eq!(db.clear_all().unwrap(), 2);
        assert!(db.is_empty().unwrap());
        assert!(db.list_hashes().unwrap().is_empty());
    }

    #[test]
    fn batch_store_multiple() {
        let (_tmp, db) = test_db();

        let entries = vec![
            EmbeddingEntry {
                hash: "aaa".to_string(),
                seq: 0,
                pos: 0,
                vector: vec![1.0, 2.0],
                model: "m".to_string(),
                timestamp: 5,
            },
            EmbeddingEntry {
                hash: "aaa".to_string(),
                seq: 1,
                pos: 120,
                vector: vec![3.0, 4.0],
                model: "m".to_string(),
                timestamp: 5,
            },
        ];
        db.batch_store(&entries).unwrap();

        assert_eq!(db.len().unwrap(), 2);
        let stored = db.load("aaa", 1).unwrap().unwrap();
        assert_eq!(stored.vector, vec![3.0, 4.0]);
        assert_eq!(stored.pos, 120);
    }

    #[test]
    fn overwrite_entry() {
        let (_tmp, db) = test_db();

        db.store("aaa", 0, 0, &[1.0, 2.0], "old", 1).unwrap();
        db.store("aaa", 0, 0, &[3.0, 4.0, 5.0], "new", 2).unwrap();

        let stored = db.load("aaa", 0).unwrap().unwrap();
        assert_eq!(stored.vector, vec![3.0, 4.0, 5.0]);
        assert_eq!(stored.model, "new");
        assert_eq!(db.len().unwrap(), 1);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("embeddings.redb");

        {
            let db = EmbeddingDb::open(&path).unwrap();
            db.store("aaa", 0, 0, &[1.0, 2.0], "m", 7).unwrap();
        }

        {
            let db = EmbeddingDb::open(&path).unwrap();
            let stored = db.load("aaa", 0).unwrap().unwrap();
            assert_eq!(stored.vector, vec![1.0, 2.0]);
            assert_eq!(stored.timestamp, 7);
        }
    }
}
