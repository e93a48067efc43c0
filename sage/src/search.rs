//! Hybrid query engine: keyword and semantic candidates merged under a
//! lexicographic rank.
//!
//! An empty query is the UI's "no search box content" state and delegates to
//! the recent list. Otherwise keyword recall always runs; the query is
//! embedded under a short budget and the vector candidates join the merge.
//! If embedding is slow or unavailable the engine silently degrades to
//! keyword-only ranking — never an error to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::SageConfig;
use crate::enrichment::Embedder;
use crate::interface::SageError;
use crate::models::StoredClip;
use crate::ranking::rank_key;
use crate::store::ClipStore;

pub(crate) const MIN_TRIGRAM_QUERY_LEN: usize = 3;

/// Maximum recency boost multiplier for keyword recall.
/// 0.5 = up to 50% boost for brand new clips, ensuring recent items make the
/// candidate set.
pub(crate) const RECENCY_BOOST_MAX: f64 = 0.5;
/// Half-life for recency decay: 3 days.
pub(crate) const RECENCY_HALF_LIFE_SECS: f64 = 3.0 * 24.0 * 60.0 * 60.0;

pub struct QueryEngine {
    store: Arc<ClipStore>,
    embedder: Arc<dyn Embedder>,
    config: SageConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<ClipStore>, embedder: Arc<dyn Embedder>, config: SageConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// The most recent page of clips, newest first.
    pub async fn recent(&self) -> Result<Vec<StoredClip>, SageError> {
        let store = Arc::clone(&self.store);
        let limit = self.config.page_size;
        run_store_task(move || store.recent(limit).map_err(SageError::from)).await
    }

    /// Hybrid search. Empty or whitespace queries delegate to `recent`.
    pub async fn search(&self, query: &str) -> Result<Vec<StoredClip>, SageError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return self.recent().await;
        }

        let page_size = self.config.page_size;

        // Keyword candidates
        let store = Arc::clone(&self.store);
        let keyword_query = trimmed.to_string();
        let keyword_ids =
            run_store_task(move || store.search_keyword(&keyword_query, page_size)).await?;

        // Semantic candidates, bounded by the query embedding budget
        let semantic_ids = match tokio::time::timeout(
            self.config.query_embed_timeout,
            self.embedder.embed(trimmed),
        )
        .await
        {
            Ok(Ok(query_vec)) => {
                let store = Arc::clone(&self.store);
                let scan_limit = self.config.vector_scan_limit;
                let hits = run_store_task(move || {
                    store
                        .vector_search(&query_vec, page_size, scan_limit)
                        .map_err(SageError::from)
                })
                .await?;
                hits.into_iter().map(|(id, _)| id).collect()
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "query embedding failed, keyword-only ranking");
                Vec::new()
            }
            Err(_) => {
                tracing::debug!("query embedding timed out, keyword-only ranking");
                Vec::new()
            }
        };

        self.merge_and_rank(trimmed, keyword_ids, semantic_ids).await
    }

    /// Merge both candidate sets (dedup by id), fetch the records, and rank.
    async fn merge_and_rank(
        &self,
        query: &str,
        keyword_ids: Vec<String>,
        semantic_ids: Vec<String>,
    ) -> Result<Vec<StoredClip>, SageError> {
        let keyword_set: HashSet<String> = keyword_ids.iter().cloned().collect();
        let semantic_set: HashSet<String> = semantic_ids.iter().cloned().collect();

        let mut merged = keyword_ids;
        for id in semantic_ids {
            if !keyword_set.contains(&id) {
                merged.push(id);
            }
        }
        if merged.is_empty() {
            return Ok(Vec::new());
        }

        let store = Arc::clone(&self.store);
        let clips =
            run_store_task(move || store.fetch_by_ids(&merged).map_err(SageError::from)).await?;

        let query_lower = query.to_lowercase();
        let mut ranked: Vec<(crate::ranking::RankKey, StoredClip)> = clips
            .into_iter()
            .map(|clip| {
                let key = rank_key(
                    &clip,
                    &query_lower,
                    keyword_set.contains(&clip.id),
                    semantic_set.contains(&clip.id),
                );
                (key, clip)
            })
            .collect();

        ranked.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        ranked.truncate(self.config.page_size);

        Ok(ranked.into_iter().map(|(_, clip)| clip).collect())
    }
}

/// Run blocking store work off the async threads.
async fn run_store_task<T, F>(f: F) -> Result<T, SageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SageError::DatabaseError(format!("store task failed: {e}")))?
}
