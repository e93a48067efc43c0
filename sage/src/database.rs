//! SQLite database layer for clip storage
//!
//! Single `clips` table keyed by UUID, tags as a JSON array, embeddings as
//! little-endian f32 blobs. Uses r2d2 connection pooling so reads proceed
//! concurrently with the pipeline's serialized writes; WAL mode keeps
//! readers off the writer's back.

use crate::models::StoredClip;
use crate::vector::{decode_embedding, encode_embedding};
use chrono::{DateTime, TimeZone, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("duplicate clip id: {0}")]
    DuplicateId(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Fixed-width timestamp format. Lexicographic order over these strings is
/// chronological order, which `ORDER BY timestamp` relies on.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Window of recent rows the short-query LIKE fallback scans.
const LIKE_SCAN_WINDOW: usize = 2000;

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp back to DateTime<Utc>, tolerating rows written
/// without fractional seconds.
fn parse_db_timestamp(timestamp_str: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(|_| Utc::now())
}

/// Thread-safe handle over the pooled SQLite connections.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create the clips database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA foreign_keys=ON;
                PRAGMA mmap_size=67108864;
                PRAGMA cache_size=-32000;
            ",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// In-memory database (for testing)
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA foreign_keys=ON;
            ",
            )?;
            Ok(())
        });

        // A second connection would see its own empty :memory: database
        let pool = Pool::builder().max_size(1).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS clips (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                contentHash TEXT NOT NULL,
                summary TEXT NOT NULL,
                tags TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                source TEXT,
                embedding BLOB,
                embeddingVersion TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_clips_hash ON clips(contentHash);
            CREATE INDEX IF NOT EXISTS idx_clips_timestamp ON clips(timestamp);
        "#,
        )?;
        Ok(())
    }

    /// On-disk size in bytes (page count times page size).
    pub fn database_size(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    /// Get total number of clips in the database
    pub fn count_clips(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM clips", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert a fully-assembled clip as a single atomic statement.
    /// Readers never observe a partial record. A primary-key collision
    /// surfaces as `DuplicateId`.
    pub fn insert_clip(&self, clip: &StoredClip) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let tags_json = serde_json::to_string(&clip.tags).unwrap_or_else(|_| "[]".to_string());
        let embedding_blob = clip.embedding.as_deref().map(encode_embedding);

        let result = conn.execute(
            r#"INSERT INTO clips (id, content, contentHash, summary, tags, timestamp, source, embedding, embeddingVersion)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                clip.id,
                clip.content,
                clip.content_hash,
                clip.summary,
                tags_json,
                format_timestamp(clip.timestamp),
                clip.source,
                embedding_blob,
                clip.embedding_version,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ffi::ErrorCode::ConstraintViolation =>
            {
                Err(DatabaseError::DuplicateId(clip.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Content hashes of the most recently committed clips, newest first.
    /// Seeds the pipeline's dedup state across restarts.
    pub fn latest_hashes(&self, depth: usize) -> DatabaseResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT contentHash FROM clips ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
        )?;
        let hashes = stmt
            .query_map([depth as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(hashes)
    }

    /// Most recent clips ordered by timestamp descending. Rowid breaks ties;
    /// commits are serial, so rowid order is insertion order.
    pub fn recent(&self, limit: usize) -> DatabaseResult<Vec<StoredClip>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, content, contentHash, summary, tags, timestamp, source, embedding, embeddingVersion
               FROM clips ORDER BY timestamp DESC, rowid DESC LIMIT ?1"#,
        )?;
        let clips = stmt
            .query_map([limit as i64], Self::row_to_clip)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clips)
    }

    /// Fetch clips by IDs, preserving the order of the input IDs
    pub fn fetch_by_ids(&self, ids: &[String]) -> DatabaseResult<Vec<StoredClip>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            r#"SELECT id, content, contentHash, summary, tags, timestamp, source, embedding, embeddingVersion
               FROM clips WHERE id IN ({})"#,
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<rusqlite::types::Value> =
            ids.iter().map(|id| id.clone().into()).collect();
        let clips: Vec<StoredClip> = stmt
            .query_map(rusqlite::params_from_iter(params), Self::row_to_clip)?
            .collect::<Result<Vec<_>, _>>()?;

        // IN (...) returns rows in table order; restore the caller's order
        let id_to_clip: std::collections::HashMap<String, StoredClip> = clips
            .into_iter()
            .map(|clip| (clip.id.clone(), clip))
            .collect();

        Ok(ids.iter().filter_map(|id| id_to_clip.get(id).cloned()).collect())
    }

    /// Fetch all clips (for index rebuilding)
    pub fn fetch_all_clips(&self) -> DatabaseResult<Vec<StoredClip>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, content, contentHash, summary, tags, timestamp, source, embedding, embeddingVersion
               FROM clips ORDER BY timestamp DESC, rowid DESC"#,
        )?;
        let clips = stmt
            .query_map([], Self::row_to_clip)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clips)
    }

    /// Substring search over content, summary, and tags for queries too short
    /// for the trigram index. Scans a bounded window of recent rows.
    pub fn search_like(&self, query: &str, limit: usize) -> DatabaseResult<Vec<String>> {
        let escaped = query
            .to_lowercase()
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id FROM (
                   SELECT id, content, summary, tags, timestamp, rowid AS rid
                   FROM clips ORDER BY timestamp DESC, rowid DESC LIMIT ?2
               )
               WHERE content LIKE ?1 ESCAPE '\' COLLATE NOCASE
                  OR summary LIKE ?1 ESCAPE '\' COLLATE NOCASE
                  OR tags LIKE ?1 ESCAPE '\' COLLATE NOCASE
               ORDER BY timestamp DESC, rid DESC
               LIMIT ?3"#,
        )?;
        let ids = stmt
            .query_map(
                params![pattern, LIKE_SCAN_WINDOW as i64, limit as i64],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// The most recent stored embeddings as (id, vector) pairs.
    pub fn recent_embeddings(&self, limit: usize) -> DatabaseResult<Vec<(String, Vec<f32>)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, embedding FROM clips
               WHERE embedding IS NOT NULL
               ORDER BY timestamp DESC, rowid DESC LIMIT ?1"#,
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, decode_embedding(&blob)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Clips committed without an embedding, oldest first — the work list
    /// for a re-embedding pass.
    pub fn pending_embeddings(&self, limit: usize) -> DatabaseResult<Vec<(String, String)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, content FROM clips
               WHERE embedding IS NULL
               ORDER BY timestamp ASC, rowid ASC LIMIT ?1"#,
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Attach an embedding to an existing clip (re-embedding pass).
    pub fn set_embedding(&self, id: &str, embedding: &[f32], version: &str) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE clips SET embedding = ?1, embeddingVersion = ?2 WHERE id = ?3",
            params![encode_embedding(embedding), version, id],
        )?;
        Ok(())
    }

    /// Delete a clip by ID. Returns whether a row was removed.
    pub fn delete_clip(&self, id: &str) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute("DELETE FROM clips WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// IDs of clips captured before `cutoff` (retention policy hook).
    pub fn ids_older_than(&self, cutoff: DateTime<Utc>) -> DatabaseResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM clips WHERE timestamp < ?1")?;
        let ids = stmt
            .query_map([format_timestamp(cutoff)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Delete a batch of clips by ID. Returns the number of rows removed.
    pub fn delete_clips(&self, ids: &[String]) -> DatabaseResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.get_conn()?;
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM clips WHERE id IN ({})", placeholders);
        let params: Vec<rusqlite::types::Value> =
            ids.iter().map(|id| id.clone().into()).collect();
        let changed = conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(changed)
    }

    /// Delete all clips
    pub fn clear_all(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM clips", [])?;
        Ok(())
    }

    fn row_to_clip(row: &rusqlite::Row) -> rusqlite::Result<StoredClip> {
        let id: String = row.get(0)?;
        let content: String = row.get(1)?;
        let content_hash: String = row.get(2)?;
        let summary: String = row.get(3)?;
        let tags_json: String = row.get(4)?;
        let timestamp_str: String = row.get(5)?;
        let source: Option<String> = row.get(6)?;
        let embedding_blob: Option<Vec<u8>> = row.get(7)?;
        let embedding_version: Option<String> = row.get(8)?;

        // Lenient on corrupt tag JSON: a well-formed (possibly empty) set is
        // part of the record contract.
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        Ok(StoredClip {
            id,
            content,
            content_hash,
            summary,
            tags,
            embedding: embedding_blob.as_deref().map(decode_embedding),
            embedding_version,
            timestamp: parse_db_timestamp(&timestamp_str),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hash_content;

    fn sample_clip(id: &str, content: &str, ts: DateTime<Utc>) -> StoredClip {
        StoredClip {
            id: id.to_string(),
            content: content.to_string(),
            content_hash: hash_content(content),
            summary: content.to_string(),
            tags: vec!["sample".to_string()],
            embedding: None,
            embedding_version: None,
            timestamp: ts,
            source: Some("clipboard".to_string()),
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    #[test]
    fn test_insert_and_recent_ordering() {
        let db = Database::open_in_memory().unwrap();
        db.insert_clip(&sample_clip("a", "first", ts(0))).unwrap();
        db.insert_clip(&sample_clip("b", "second", ts(1))).unwrap();
        db.insert_clip(&sample_clip("c", "third", ts(2))).unwrap();

        let recent = db.recent(10).unwrap();
        let ids: Vec<&str> = recent.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_same_second_ties_break_by_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_clip(&sample_clip("a", "first", ts(0))).unwrap();
        db.insert_clip(&sample_clip("b", "second", ts(0))).unwrap();

        let recent = db.recent(10).unwrap();
        let ids: Vec<&str> = recent.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_clip(&sample_clip("a", "first", ts(0))).unwrap();
        let err = db.insert_clip(&sample_clip("a", "other", ts(1))).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateId(id) if id == "a"));
        assert_eq!(db.count_clips().unwrap(), 1);
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let db = Database::open_in_memory().unwrap();
        let mut clip = sample_clip("a", "hello world", ts(0));
        clip.embedding = Some(vec![0.5, -0.25, 1.0]);
        clip.embedding_version = Some("test-model".to_string());
        db.insert_clip(&clip).unwrap();

        let fetched = db.fetch_by_ids(&["a".to_string()]).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].content, "hello world");
        assert_eq!(fetched[0].tags, vec!["sample".to_string()]);
        assert_eq!(fetched[0].embedding.as_deref(), Some(&[0.5, -0.25, 1.0][..]));
        assert_eq!(fetched[0].embedding_version.as_deref(), Some("test-model"));
    }

    #[test]
    fn test_fetch_by_ids_preserves_input_order() {
        let db = Database::open_in_memory().unwrap();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            db.insert_clip(&sample_clip(id, id, ts(i as i64))).unwrap();
        }
        let fetched = db
            .fetch_by_ids(&["c".to_string(), "a".to_string(), "missing".to_string()])
            .unwrap();
        let ids: Vec<&str> = fetched.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_search_like_matches_any_field() {
        let db = Database::open_in_memory().unwrap();
        let mut clip = sample_clip("a", "some plain words", ts(0));
        clip.summary = "shopping list".to_string();
        db.insert_clip(&clip).unwrap();

        assert_eq!(db.search_like("PLAIN", 10).unwrap(), vec!["a".to_string()]);
        assert_eq!(db.search_like("shopp", 10).unwrap(), vec!["a".to_string()]);
        assert_eq!(db.search_like("sample", 10).unwrap(), vec!["a".to_string()]);
        assert!(db.search_like("zebra", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_like_escapes_wildcards() {
        let db = Database::open_in_memory().unwrap();
        db.insert_clip(&sample_clip("a", "discount 50% off", ts(0))).unwrap();
        db.insert_clip(&sample_clip("b", "discount 50x off", ts(1))).unwrap();

        let ids = db.search_like("50%", 10).unwrap();
        assert_eq!(ids, vec!["a".to_string()]);
    }

    #[test]
    fn test_latest_hashes_depth() {
        let db = Database::open_in_memory().unwrap();
        for (i, content) in ["one", "two", "three"].iter().enumerate() {
            db.insert_clip(&sample_clip(content, content, ts(i as i64))).unwrap();
        }
        let hashes = db.latest_hashes(2).unwrap();
        assert_eq!(hashes, vec![hash_content("three"), hash_content("two")]);
    }

    #[test]
    fn test_pending_and_set_embedding() {
        let db = Database::open_in_memory().unwrap();
        db.insert_clip(&sample_clip("a", "no vector yet", ts(0))).unwrap();

        let pending = db.pending_embeddings(10).unwrap();
        assert_eq!(pending, vec![("a".to_string(), "no vector yet".to_string())]);

        db.set_embedding("a", &[1.0, 2.0], "test-model").unwrap();
        assert!(db.pending_embeddings(10).unwrap().is_empty());

        let embeddings = db.recent_embeddings(10).unwrap();
        assert_eq!(embeddings, vec![("a".to_string(), vec![1.0, 2.0])]);
    }

    #[test]
    fn test_delete_primitives() {
        let db = Database::open_in_memory().unwrap();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            db.insert_clip(&sample_clip(id, id, ts(i as i64))).unwrap();
        }

        assert!(db.delete_clip("b").unwrap());
        assert!(!db.delete_clip("b").unwrap());

        let old = db.ids_older_than(ts(2)).unwrap();
        assert_eq!(old, vec!["a".to_string()]);
        assert_eq!(db.delete_clips(&old).unwrap(), 1);
        assert_eq!(db.count_clips().unwrap(), 1);

        db.clear_all().unwrap();
        assert_eq!(db.count_clips().unwrap(), 0);
    }
}
