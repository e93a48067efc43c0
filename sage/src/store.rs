//! ClipStore - durable clip table plus keyword and vector indexes.
//!
//! Couples the SQLite table with the Tantivy index and keeps the two
//! consistent: every insert/delete touches both, and on open the index is
//! rebuilt from the table whenever the document counts diverge (a deleted
//! index directory, a crash between commit and index flush).
//!
//! The database is the source of truth. Index maintenance failures after a
//! successful row write are logged and repaired by the next rebuild rather
//! than reported as a lost capture.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::database::{Database, DatabaseResult};
use crate::indexer::Indexer;
use crate::interface::SageError;
use crate::models::StoredClip;
use crate::search::MIN_TRIGRAM_QUERY_LEN;
use crate::vector;

pub struct ClipStore {
    db: Database,
    indexer: Indexer,
}

impl ClipStore {
    /// Open or create a store. The keyword index lives in a directory next
    /// to the database file.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, SageError> {
        let db_path = db_path.as_ref();
        let db = Database::open(db_path)?;

        let index_path = db_path
            .parent()
            .map(|p| p.join("keyword_index_v1"))
            .unwrap_or_else(|| PathBuf::from("keyword_index_v1"));
        let indexer = Indexer::new(&index_path)?;

        let store = Self { db, indexer };
        store.rebuild_index_if_needed()?;
        Ok(store)
    }

    /// In-memory store (for testing)
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, SageError> {
        let db = Database::open_in_memory()?;
        let indexer = Indexer::new_in_memory()?;
        Ok(Self { db, indexer })
    }

    /// Rebuild the index from the database when the two have diverged.
    fn rebuild_index_if_needed(&self) -> Result<(), SageError> {
        let db_count = self.db.count_clips()?;
        let index_count = self.indexer.num_docs();
        if db_count == index_count {
            return Ok(());
        }

        tracing::info!(db_count, index_count, "keyword index out of sync, rebuilding");
        self.indexer.clear()?;

        let clips = self.db.fetch_all_clips()?;
        if clips.is_empty() {
            return Ok(());
        }

        use rayon::prelude::*;
        clips.par_iter().try_for_each(|clip| {
            self.indexer
                .add_document(&clip.id, &Self::index_text(clip), clip.timestamp.timestamp())
        })?;
        self.indexer.commit()?;

        Ok(())
    }

    /// The text the keyword index sees for a clip: content, summary, tags.
    fn index_text(clip: &StoredClip) -> String {
        format!("{}\n{}\n{}", clip.content, clip.summary, clip.tags.join(" "))
    }

    /// Commit a clip: row first (atomic, the source of truth), then index.
    pub fn insert(&self, clip: &StoredClip) -> DatabaseResult<()> {
        self.db.insert_clip(clip)?;

        let indexed = self
            .indexer
            .add_document(&clip.id, &Self::index_text(clip), clip.timestamp.timestamp())
            .and_then(|_| self.indexer.commit());
        if let Err(e) = indexed {
            // Row is durable; the startup rebuild reconciles the index.
            tracing::warn!(id = %clip.id, error = %e, "keyword index update failed");
        }

        Ok(())
    }

    /// Most recent clips, newest first.
    pub fn recent(&self, limit: usize) -> DatabaseResult<Vec<StoredClip>> {
        self.db.recent(limit)
    }

    /// Fetch clips by id, preserving input order.
    pub fn fetch_by_ids(&self, ids: &[String]) -> DatabaseResult<Vec<StoredClip>> {
        self.db.fetch_by_ids(ids)
    }

    /// Ranked keyword candidates for a query. Queries below the trigram
    /// threshold use a LIKE scan over recent rows so short searches still
    /// work while the user types.
    pub fn search_keyword(&self, query: &str, limit: usize) -> Result<Vec<String>, SageError> {
        if query.chars().count() < MIN_TRIGRAM_QUERY_LEN {
            return Ok(self.db.search_like(query, limit)?);
        }

        let hits = self.indexer.search(query, limit)?;
        if !hits.is_empty() {
            return Ok(hits.into_iter().map(|(id, _)| id).collect());
        }

        // Trigram recall can miss punctuation-heavy queries; the LIKE scan
        // is the safety net before reporting no matches.
        Ok(self.db.search_like(query, limit)?)
    }

    /// Nearest stored embeddings to `query_vec` by cosine similarity,
    /// scanning at most `scan_limit` of the most recent vectors.
    pub fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
        scan_limit: usize,
    ) -> DatabaseResult<Vec<(String, f32)>> {
        let candidates = self.db.recent_embeddings(scan_limit)?;
        Ok(vector::top_k(query_vec, candidates, limit))
    }

    /// Content hashes of the most recently committed clips, newest first.
    pub fn latest_hashes(&self, depth: usize) -> DatabaseResult<Vec<String>> {
        self.db.latest_hashes(depth)
    }

    /// Delete one clip from table and index.
    pub fn delete(&self, id: &str) -> Result<bool, SageError> {
        let removed = self.db.delete_clip(id)?;
        if removed {
            self.indexer.delete_document(id)?;
            self.indexer.commit()?;
        }
        Ok(removed)
    }

    /// Retention hook: delete every clip captured before `cutoff`.
    /// Returns the number of clips removed.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, SageError> {
        let ids = self.db.ids_older_than(cutoff)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self.db.delete_clips(&ids)?;
        for id in &ids {
            self.indexer.delete_document(id)?;
        }
        self.indexer.commit()?;
        Ok(removed)
    }

    /// User purge: drop everything from table and index.
    pub fn clear(&self) -> Result<(), SageError> {
        self.db.clear_all()?;
        self.indexer.clear()?;
        Ok(())
    }

    /// Clips committed without an embedding (re-embedding work list).
    pub fn pending_embeddings(&self, limit: usize) -> DatabaseResult<Vec<(String, String)>> {
        self.db.pending_embeddings(limit)
    }

    /// Attach an embedding produced by a later re-embedding pass.
    pub fn set_embedding(&self, id: &str, embedding: &[f32], version: &str) -> DatabaseResult<()> {
        self.db.set_embedding(id, embedding, version)
    }

    pub fn count(&self) -> DatabaseResult<u64> {
        self.db.count_clips()
    }

    /// Database size in bytes.
    pub fn database_size(&self) -> DatabaseResult<i64> {
        self.db.database_size()
    }
}
