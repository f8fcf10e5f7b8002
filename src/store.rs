//! SQLite-backed document store.
//!
//! Holds collections, documents, deduplicated content, hierarchical path
//! contexts, and the FTS5 full-text index the lexical searcher queries.
//! Documents are keyed `(collection, path)`; content is keyed by a blake3
//! digest so identical files share one row. Removing a document only clears
//! its `active` flag (and its full-text row) — rows are kept for audit.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::{Error, Result};

/// A registered document collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub root_path: String,
    pub glob: Option<String>,
}

/// A stored document row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: i64,
    pub collection: String,
    pub path: String,
    pub hash: String,
    pub title: String,
    pub active: bool,
    pub mtime: u64,
}

/// A path-context annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathContext {
    pub collection: String,
    pub prefix: String,
    pub context: String,
}

/// A row returned by the weighted full-text query.
///
/// `raw_rank` follows the FTS5 bm25 convention: unbounded, more negative
/// means more relevant. Normalization happens in the lexical searcher.
#[derive(Debug, Clone)]
pub struct FtsRow {
    pub collection: String,
    pub path: String,
    pub title: String,
    pub hash: String,
    pub raw_rank: f32,
    pub snippet: String,
}

/// bm25 column weight for the title field.
const TITLE_WEIGHT: f64 = 10.0;
/// bm25 column weight for the inherited path context field.
const CONTEXT_WEIGHT: f64 = 1.0;
/// bm25 column weight for the document body.
const BODY_WEIGHT: f64 = 1.0;

pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open or create the document store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self {
            path: path.to_path_buf(),
        };
        let conn = store.conn()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        create_schema(&conn)?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    // -- Collections --

    pub fn add_collection(
        &self,
        name: &str,
        root_path: &str,
        glob: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO collections (name, root_path, glob)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET root_path = ?2, glob = ?3",
            params![name, root_path, glob],
        )?;
        Ok(())
    }

    pub fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let conn = self.conn()?;
        let info = conn
            .query_row(
                "SELECT name, root_path, glob FROM collections WHERE name = ?1",
                params![name],
                parse_collection_row,
            )
            .optional()?;
        Ok(info)
    }

    pub fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, root_path, glob FROM collections ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], parse_collection_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove a collection definition and soft-delete all its documents.
    pub fn remove_collection(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let txn = conn.transaction()?;
        let removed = txn
            .execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        txn.execute(
            "DELETE FROM docs_fts WHERE rowid IN
               (SELECT id FROM documents WHERE collection = ?1)",
            params![name],
        )?;
        txn.execute(
            "UPDATE documents SET active = 0 WHERE collection = ?1",
            params![name],
        )?;
        txn.commit()?;
        Ok(removed > 0)
    }

    // -- Path contexts --

    pub fn set_path_context(
        &self,
        collection: &str,
        prefix: &str,
        context: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO path_contexts (collection, prefix, context)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, prefix) DO UPDATE SET context = ?3",
            params![collection, prefix, context],
        )?;
        drop(conn);
        self.refresh_fts_contexts(collection)
    }

    pub fn remove_path_context(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM path_contexts WHERE collection = ?1 AND prefix = ?2",
            params![collection, prefix],
        )?;
        drop(conn);
        self.refresh_fts_contexts(collection)?;
        Ok(removed > 0)
    }

    pub fn list_path_contexts(
        &self,
        collection: Option<&str>,
    ) -> Result<Vec<PathContext>> {
        let conn = self.conn()?;
        let (sql, filter) = match collection {
            Some(c) => (
                "SELECT collection, prefix, context FROM path_contexts
                 WHERE collection = ?1 ORDER BY collection, prefix",
                Some(c),
            ),
            None => (
                "SELECT collection, prefix, context FROM path_contexts
                 ORDER BY collection, prefix",
                None,
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let map = |row: &rusqlite::Row| {
            Ok(PathContext {
                collection: row.get(0)?,
                prefix: row.get(1)?,
                context: row.get(2)?,
            })
        };
        let rows = match filter {
            Some(c) => stmt
                .query_map(params![c], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Concatenation of all ancestor contexts for a document path,
    /// root-first. The empty prefix is the collection-level root context.
    pub fn context_for(&self, collection: &str, path: &str) -> Result<String> {
        let prefixes = ancestor_prefixes(path);
        let conn = self.conn()?;
        let mut parts = Vec::new();
        for prefix in &prefixes {
            let ctx: Option<String> = conn
                .query_row(
                    "SELECT context FROM path_contexts
                     WHERE collection = ?1 AND prefix = ?2",
                    params![collection, prefix],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(ctx) = ctx {
                parts.push(ctx);
            }
        }
        Ok(parts.join("\n"))
    }

    fn refresh_fts_contexts(&self, collection: &str) -> Result<()> {
        let docs = self.all_active_documents(Some(collection))?;
        let conn = self.conn()?;
        for doc in docs {
            let context = self.context_for(collection, &doc.path)?;
            conn.execute(
                "UPDATE docs_fts SET context = ?1 WHERE rowid = ?2",
                params![context, doc.id],
            )?;
        }
        Ok(())
    }

    // -- Documents --

    /// Insert or update a document, deduplicating content by digest.
    ///
    /// The content row is created on first sight of the hash and never
    /// touched afterwards; re-indexing a document whose content changed
    /// points it at a new hash while the old content stays for any other
    /// document still referencing it.
    pub fn index_document(
        &self,
        collection: &str,
        path: &str,
        title: &str,
        text: &str,
        mtime: u64,
    ) -> Result<DocumentRecord> {
        let hash = content_hash(text);
        let context = self.context_for(collection, path)?;

        let mut conn = self.conn()?;
        let txn = conn.transaction()?;

        txn.execute(
            "INSERT OR IGNORE INTO content (hash, text) VALUES (?1, ?2)",
            params![hash, text],
        )?;

        let existing: Option<i64> = txn
            .query_row(
                "SELECT id FROM documents WHERE collection = ?1 AND path = ?2",
                params![collection, path],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                txn.execute(
                    "UPDATE documents
                     SET hash = ?1, title = ?2, active = 1, mtime = ?3
                     WHERE id = ?4",
                    params![hash, title, mtime, id],
                )?;
                txn.execute(
                    "DELETE FROM docs_fts WHERE rowid = ?1",
                    params![id],
                )?;
                id
            }
            None => {
                txn.execute(
                    "INSERT INTO documents
                       (collection, path, hash, title, active, mtime)
                     VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                    params![collection, path, hash, title, mtime],
                )?;
                txn.last_insert_rowid()
            }
        };

        txn.execute(
            "INSERT INTO docs_fts (rowid, title, context, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, title, context, text],
        )?;
        txn.commit()?;

        Ok(DocumentRecord {
            id,
            collection: collection.to_string(),
            path: path.to_string(),
            hash,
            title: title.to_string(),
            active: true,
            mtime,
        })
    }

    /// Soft-delete a document: clear its active flag and full-text row.
    pub fn deactivate_document(
        &self,
        collection: &str,
        path: &str,
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let txn = conn.transaction()?;
        let id: Option<i64> = txn
            .query_row(
                "SELECT id FROM documents
                 WHERE collection = ?1 AND path = ?2 AND active = 1",
                params![collection, path],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(false);
        };
        txn.execute(
            "UPDATE documents SET active = 0 WHERE id = ?1",
            params![id],
        )?;
        txn.execute("DELETE FROM docs_fts WHERE rowid = ?1", params![id])?;
        txn.commit()?;
        Ok(true)
    }

    pub fn get_document(
        &self,
        collection: &str,
        path: &str,
    ) -> Result<Option<DocumentRecord>> {
        let conn = self.conn()?;
        let doc = conn
            .query_row(
                "SELECT id, collection, path, hash, title, active, mtime
                 FROM documents WHERE collection = ?1 AND path = ?2",
                params![collection, path],
                parse_document_row,
            )
            .optional()?;
        Ok(doc)
    }

    pub fn all_active_documents(
        &self,
        collection: Option<&str>,
    ) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn()?;
        let (sql, filter) = match collection {
            Some(c) => (
                "SELECT id, collection, path, hash, title, active, mtime
                 FROM documents WHERE active = 1 AND collection = ?1
                 ORDER BY collection, path",
                Some(c),
            ),
            None => (
                "SELECT id, collection, path, hash, title, active, mtime
                 FROM documents WHERE active = 1
                 ORDER BY collection, path",
                None,
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = match filter {
            Some(c) => stmt
                .query_map(params![c], parse_document_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], parse_document_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Distinct content hashes across active documents.
    pub fn active_hashes(
        &self,
        collection: Option<&str>,
    ) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let (sql, filter) = match collection {
            Some(c) => (
                "SELECT DISTINCT hash FROM documents
                 WHERE active = 1 AND collection = ?1 ORDER BY hash",
                Some(c),
            ),
            None => (
                "SELECT DISTINCT hash FROM documents
                 WHERE active = 1 ORDER BY hash",
                None,
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = match filter {
            Some(c) => stmt
                .query_map(params![c], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Distinct collection names that currently have active documents.
    pub fn active_collection_names(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT collection FROM documents
             WHERE active = 1 ORDER BY collection",
        )?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn documents_for_hash(&self, hash: &str) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, collection, path, hash, title, active, mtime
             FROM documents WHERE hash = ?1 AND active = 1
             ORDER BY collection, path",
        )?;
        let rows = stmt
            .query_map(params![hash], parse_document_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn content_text(&self, hash: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let text = conn
            .query_row(
                "SELECT text FROM content WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }

    pub fn count_active_documents(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_content_rows(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM content", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    // -- Full-text query --

    /// Run a weighted full-text query against active documents.
    ///
    /// `match_expr` must be a valid FTS5 match expression (the lexical
    /// searcher builds sanitized prefix/AND expressions). Title counts 10x
    /// against body, inherited path context 1x. Rows come back in the
    /// underlying rank order (most relevant first by bm25).
    pub fn fts_query(
        &self,
        match_expr: &str,
        collection: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FtsRow>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT d.collection, d.path, d.title, d.hash,
                    bm25(docs_fts, {TITLE_WEIGHT}, {CONTEXT_WEIGHT}, \
                    {BODY_WEIGHT}) AS score,
                    snippet(docs_fts, 2, '', '', '…', 12) AS snip
             FROM docs_fts
             JOIN documents d ON d.id = docs_fts.rowid
             WHERE docs_fts MATCH ?1 AND d.active = 1{}
             ORDER BY score
             LIMIT {limit}",
            if collection.is_some() {
                " AND d.collection = ?2"
            } else {
                ""
            },
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row| {
            Ok(FtsRow {
                collection: row.get(0)?,
                path: row.get(1)?,
                title: row.get(2)?,
                hash: row.get(3)?,
                raw_rank: row.get::<_, f64>(4)? as f32,
                snippet: row.get(5)?,
            })
        };
        let rows = match collection {
            Some(c) => stmt
                .query_map(params![match_expr, c], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![match_expr], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

/// blake3 digest of document content, hex-encoded.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Ancestor prefixes for a relative path, root-first.
///
/// `"dir/sub/file.md"` yields `["", "dir", "dir/sub"]`.
fn ancestor_prefixes(path: &str) -> Vec<String> {
    let mut prefixes = vec![String::new()];
    let mut acc = String::new();
    let components: Vec<&str> = path.split('/').collect();
    for dir in &components[..components.len().saturating_sub(1)] {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(dir);
        prefixes.push(acc.clone());
    }
    prefixes
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            root_path TEXT NOT NULL,
            glob TEXT
        );
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            path TEXT NOT NULL,
            hash TEXT NOT NULL,
            title TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            mtime INTEGER NOT NULL,
            UNIQUE(collection, path)
        );
        CREATE INDEX IF NOT EXISTS idx_documents_hash
            ON documents(hash);
        CREATE INDEX IF NOT EXISTS idx_documents_collection
            ON documents(collection);
        CREATE TABLE IF NOT EXISTS content (
            hash TEXT PRIMARY KEY,
            text TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS path_contexts (
            collection TEXT NOT NULL,
            prefix TEXT NOT NULL,
            context TEXT NOT NULL,
            UNIQUE(collection, prefix)
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS docs_fts USING fts5(
            title, context, body,
            tokenize = 'porter unicode61'
        );",
    )?;
    Ok(())
}

fn parse_collection_row(
    row: &rusqlite::Row,
) -> rusqlite::Result<CollectionInfo> {
    Ok(CollectionInfo {
        name: row.get(0)?,
        root_path: row.get(1)?,
        glob: row.get(2)?,
    })
}

fn parse_document_row(row: &rusqlite::Row) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        collection: row.get(1)?,
        path: row.get(2)?,
        hash: row.get(3)?,
        title: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
        mtime: row.get::<_, i64>(6)? as u64,
    })
}

/// Look up a collection or fail with a typed not-found error.
pub fn require_collection(store: &Store, name: &str) -> Result<CollectionInfo> {
    store.get_collection(name)?.ok_or_else(|| Error::NotFound {
        kind: "collection",
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("store.sqlite3")).unwrap();
        (tmp, store)
    }

    #[test]
    fn collections_crud() {
        let (_tmp, store) = test_store();

        assert!(store.list_collections().unwrap().is_empty());
        store
            .add_collection("notes", "/home/user/notes", Some("**/*.md"))
            .unwrap();

        let info = store.get_collection("notes").unwrap().unwrap();
        assert_eq!(info.root_path, "/home/user/notes");
        assert_eq!(info.glob.as_deref(), Some("**/*.md"));

        assert!(store.remove_collection("notes").unwrap());
        assert!(!store.remove_collection("notes").unwrap());
        assert!(store.get_collection("notes").unwrap().is_none());
    }

    #[test]
    fn identical_content_shares_one_row() {
        let (_tmp, store) = test_store();
        let text = "Shared body of text about sourdough starters.";

        store
            .index_document("notes", "a.md", "A", text, 100)
            .unwrap();
        store
            .index_document("docs", "b.md", "B", text, 200)
            .unwrap();

        assert_eq!(store.count_content_rows().unwrap(), 1);
        assert_eq!(store.count_active_documents().unwrap(), 2);

        let a = store.get_document("notes", "a.md").unwrap().unwrap();
        let b = store.get_document("docs", "b.md").unwrap().unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(store.documents_for_hash(&a.hash).unwrap().len(), 2);
    }

    #[test]
    fn reindex_updates_in_place() {
        let (_tmp, store) = test_store();

        store
            .index_document("notes", "a.md", "Old", "old content", 100)
            .unwrap();
        store
            .index_document("notes", "a.md", "New", "new content", 200)
            .unwrap();

        assert_eq!(store.count_active_documents().unwrap(), 1);
        let doc = store.get_document("notes", "a.md").unwrap().unwrap();
        assert_eq!(doc.title, "New");
        assert_eq!(doc.mtime, 200);

        // Both content rows stay; hashes are never garbage-collected.
        assert_eq!(store.count_content_rows().unwrap(), 2);

        let hits = store.fts_query("\"new\"*", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        let stale = store.fts_query("\"old\"*", None, 10).unwrap();
        assert!(stale.is_empty());
    }

    #[test]
    fn deactivated_documents_leave_search() {
        let (_tmp, store) = test_store();
        store
            .index_document("notes", "a.md", "Title", "searchable body", 100)
            .unwrap();

        assert_eq!(store.fts_query("\"searchable\"*", None, 10).unwrap().len(), 1);
        assert!(store.deactivate_document("notes", "a.md").unwrap());
        assert!(!store.deactivate_document("notes", "a.md").unwrap());

        assert!(store.fts_query("\"searchable\"*", None, 10).unwrap().is_empty());
        // The row itself is retained for audit.
        let doc = store.get_document("notes", "a.md").unwrap().unwrap();
        assert!(!doc.active);
        assert_eq!(store.count_active_documents().unwrap(), 0);
    }

    #[test]
    fn reindexing_reactivates() {
        let (_tmp, store) = test_store();
        store
            .index_document("notes", "a.md", "T", "body text", 100)
            .unwrap();
        store.deactivate_document("notes", "a.md").unwrap();
        store
            .index_document("notes", "a.md", "T", "body text", 300)
            .unwrap();

        let doc = store.get_document("notes", "a.md").unwrap().unwrap();
        assert!(doc.active);
        assert_eq!(store.fts_query("\"body\"*", None, 10).unwrap().len(), 1);
    }

    #[test]
    fn title_outweighs_body() {
        let (_tmp, store) = test_store();
        store
            .index_document(
                "notes",
                "in-title.md",
                "Ferment guide",
                "a plain document about pickling vegetables at home",
                100,
            )
            .unwrap();
        store
            .index_document(
                "notes",
                "in-body.md",
                "Kitchen notes",
                "a plain document where ferment appears in the body only",
                100,
            )
            .unwrap();

        let hits = store.fts_query("\"ferment\"*", None, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "in-title.md");
        // bm25 ranks are negative; the better match is more negative.
        assert!(hits[0].raw_rank < hits[1].raw_rank);
    }

    #[test]
    fn fts_collection_filter() {
        let (_tmp, store) = test_store();
        store
            .index_document("notes", "a.md", "A", "hello from notes", 1)
            .unwrap();
        store
            .index_document("docs", "b.md", "B", "hello from docs", 1)
            .unwrap();

        let all = store.fts_query("\"hello\"*", None, 10).unwrap();
        assert_eq!(all.len(), 2);
        let notes = store.fts_query("\"hello\"*", Some("notes"), 10).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].collection, "notes");
    }

    #[test]
    fn snippet_comes_from_body() {
        let (_tmp, store) = test_store();
        store
            .index_document(
                "notes",
                "a.md",
                "Title",
                "Some long body. The interesting keyword is right here. More.",
                1,
            )
            .unwrap();

        let hits = store.fts_query("\"keyword\"*", None, 10).unwrap();
        assert!(hits[0].snippet.contains("keyword"));
    }

    #[test]
    fn ancestor_prefixes_root_first() {
        assert_eq!(ancestor_prefixes("file.md"), vec![""]);
        assert_eq!(
            ancestor_prefixes("dir/sub/file.md"),
            vec!["", "dir", "dir/sub"]
        );
    }

    #[test]
    fn context_inheritance_is_root_first() {
        let (_tmp, store) = test_store();
        store
            .index_document("notes", "api/http/routes.md", "Routes", "body", 1)
            .unwrap();
        store
            .set_path_context("notes", "api/http", "HTTP layer docs")
            .unwrap();
        store
            .set_path_context("notes", "", "Team knowledge base")
            .unwrap();
        store
            .set_path_context("notes", "api", "API reference")
            .unwrap();

        let ctx = store.context_for("notes", "api/http/routes.md").unwrap();
        assert_eq!(
            ctx,
            "Team knowledge base\nAPI reference\nHTTP layer docs"
        );
    }

    #[test]
    fn path_context_is_searchable() {
        let (_tmp, store) = test_store();
        store
            .index_document("notes", "api/routes.md", "Routes", "plain body", 1)
            .unwrap();
        store
            .set_path_context("notes", "api", "gateway subsystem")
            .unwrap();

        let hits = store.fts_query("\"gateway\"*", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "api/routes.md");
    }

    #[test]
    fn removing_collection_soft_deletes_documents() {
        let (_tmp, store) = test_store();
        store
            .index_document("notes", "a.md", "A", "some text", 1)
            .unwrap();
        store.add_collection("notes", "/tmp/notes", None).unwrap();

        store.remove_collection("notes").unwrap();
        assert!(store.fts_query("\"some\"*", None, 10).unwrap().is_empty());
        let doc = store.get_document("notes", "a.md").unwrap().unwrap();
        assert!(!doc.active);
    }

    #[test]
    fn active_hashes_are_distinct() {
        let (_tmp, store) = test_store();
        store
            .index_document("notes", "a.md", "A", "same text", 1)
            .unwrap();
        store
            .index_document("notes", "b.md", "B", "same text", 1)
            .unwrap();
        store
            .index_document("notes", "c.md", "C", "other text", 1)
            .unwrap();

        assert_eq!(store.active_hashes(None).unwrap().len(), 2);
        assert_eq!(store.active_hashes(Some("notes")).unwrap().len(), 2);
        assert!(store.active_hashes(Some("ghost")).unwrap().is_empty());
    }

    #[test]
    fn content_text_roundtrip() {
        let (_tmp, store) = test_store();
        let doc = store
            .index_document("notes", "a.md", "A", "the content body", 1)
            .unwrap();
        assert_eq!(
            store.content_text(&doc.hash).unwrap().as_deref(),
            Some("the content body")
        );
        assert!(store.content_text("missing").unwrap().is_none());
    }
}
