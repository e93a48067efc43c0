//! Core data model for ClipSage
//!
//! `StoredClip` is the internal representation the store persists; the public
//! `ClipRecord` DTO is derived from it on the way out. Normalization and
//! hashing helpers live here because both the monitor and the pipeline use
//! them and their outputs must agree.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::interface::ClipRecord;

/// Internal clip representation for database storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredClip {
    /// UUID v4, assigned at commit, never reused.
    pub id: String,
    /// Normalized captured text, immutable once stored.
    pub content: String,
    /// SHA-256 hex of `content`; drives the immediate-duplicate rule.
    pub content_hash: String,
    pub summary: String,
    /// Well-formed tag set: lowercased, deduplicated, never absent.
    pub tags: Vec<String>,
    /// Semantic vector; `None` when the embedding capability was unavailable
    /// at ingestion (such rows are eligible for a later re-embedding pass).
    pub embedding: Option<Vec<f32>>,
    /// Capability version marker for `embedding` (model identifier).
    /// Present exactly when `embedding` is.
    pub embedding_version: Option<String>,
    /// Capture instant, not commit instant.
    pub timestamp: DateTime<Utc>,
    /// Best-effort origin label.
    pub source: Option<String>,
}

impl StoredClip {
    /// Convert to the UI-facing record, dropping internal-only fields.
    pub fn to_record(&self) -> ClipRecord {
        ClipRecord {
            id: self.id.clone(),
            content: self.content.clone(),
            summary: self.summary.clone(),
            tags: self.tags.clone(),
            timestamp: self.timestamp,
            source: self.source.clone(),
        }
    }
}

/// Normalize captured text: trim outer whitespace, unify line endings to LF.
pub fn normalize_content(raw: &str) -> String {
    raw.trim().replace("\r\n", "\n").replace('\r', "\n")
}

/// SHA-256 hex digest of content. Shared by the monitor's last-seen check
/// and the store's dedup column so the two views of "same content" agree.
pub fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Collapse a raw tag list into a well-formed set: trimmed, lowercased,
/// empties dropped, duplicates removed, sorted for deterministic storage.
pub fn normalize_tags(raw: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}
