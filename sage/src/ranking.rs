//! Lexicographic ranking for hybrid search results.
//!
//! Derived `Ord` on a tuple-shaped key: higher-priority signals always
//! dominate lower ones. Presence in both candidate sets beats one set,
//! a summary hit beats a content-only hit, recency breaks the rest.

use crate::models::StoredClip;

/// Rank key — all components: higher = better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct RankKey {
    /// 2 = recalled by both keyword and vector search, 1 = one of them.
    pub sources_matched: u8,
    /// Query appears as a case-insensitive substring of the summary.
    pub summary_hit: bool,
    /// Capture instant in microseconds; more recent wins.
    pub recency: i64,
}

pub(crate) fn rank_key(
    clip: &StoredClip,
    query_lower: &str,
    in_keyword: bool,
    in_semantic: bool,
) -> RankKey {
    RankKey {
        sources_matched: u8::from(in_keyword) + u8::from(in_semantic),
        summary_hit: clip.summary.to_lowercase().contains(query_lower),
        recency: clip.timestamp.timestamp_micros(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hash_content;
    use chrono::{TimeZone, Utc};

    fn clip(summary: &str, secs: i64) -> StoredClip {
        StoredClip {
            id: summary.to_string(),
            content: "content".to_string(),
            content_hash: hash_content("content"),
            summary: summary.to_string(),
            tags: vec![],
            embedding: None,
            embedding_version: None,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap(),
            source: None,
        }
    }

    #[test]
    fn test_both_sources_beat_single_source() {
        let old_both = rank_key(&clip("plain", 0), "q", true, true);
        let new_single = rank_key(&clip("plain", 100), "q", true, false);
        assert!(old_both > new_single);
    }

    #[test]
    fn test_summary_hit_beats_recency_within_tier() {
        let old_summary = rank_key(&clip("rust notes", 0), "rust", true, false);
        let new_content_only = rank_key(&clip("plain", 100), "rust", true, false);
        assert!(old_summary > new_content_only);
    }

    #[test]
    fn test_recency_breaks_full_ties() {
        let older = rank_key(&clip("plain", 0), "q", true, false);
        let newer = rank_key(&clip("plain", 1), "q", true, false);
        assert!(newer > older);
    }

    #[test]
    fn test_summary_hit_is_case_insensitive() {
        let key = rank_key(&clip("Rust Notes", 0), "rust", true, false);
        assert!(key.summary_hit);
    }
}
