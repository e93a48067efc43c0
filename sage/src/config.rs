//! Engine tuning knobs.
//!
//! Plain struct with defaults; loading from files or the environment is the
//! embedding application's business.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SageConfig {
    /// Clipboard poll cadence.
    pub poll_interval: Duration,
    /// Captures shorter than this (bytes, after normalization) are skipped.
    pub min_capture_len: usize,
    /// Capacity of the monitor → pipeline channel. Sized to absorb
    /// enrichment stalls so a slow capability never costs an OS poll.
    pub queue_capacity: usize,
    /// How many most-recently-committed content hashes suppress a repeat
    /// capture. 1 = immediate-duplicate rule only.
    pub dedupe_depth: usize,
    /// Per-step enrichment budgets; on expiry the local fallback is used.
    pub summarize_timeout: Duration,
    pub tag_timeout: Duration,
    pub embed_timeout: Duration,
    /// Budget for embedding a search query before the engine degrades to
    /// keyword-only ranking. Kept well under the UI's 300ms debounce.
    pub query_embed_timeout: Duration,
    /// Page size for recent/search results.
    pub page_size: usize,
    /// How many of the most recent stored embeddings a vector search scans.
    pub vector_scan_limit: usize,
    /// Drain budget for queued captures at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for SageConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            min_capture_len: 4,
            queue_capacity: 256,
            dedupe_depth: 1,
            summarize_timeout: Duration::from_secs(4),
            tag_timeout: Duration::from_secs(4),
            embed_timeout: Duration::from_secs(4),
            query_embed_timeout: Duration::from_millis(250),
            page_size: 50,
            vector_scan_limit: 4096,
            shutdown_grace: Duration::from_secs(3),
        }
    }
}
