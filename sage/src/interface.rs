//! ClipSage public interface
//!
//! Defines the records handed to the UI collaborator, the error type that
//! crosses that boundary, and the `ClipboardApi` trait it consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A committed clipboard capture, as surfaced to the UI.
///
/// The stored embedding and its version marker are internal to the engine
/// and deliberately absent here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub id: String,
    /// The raw captured text, restored to the clipboard on selection.
    pub content: String,
    pub summary: String,
    pub tags: Vec<String>,
    /// Capture instant; serialized as ISO-8601.
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Error type for ClipSage operations
#[derive(Debug, Error)]
pub enum SageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Index error: {0}")]
    IndexError(String),
    #[error("Clipboard error: {0}")]
    ClipboardError(String),
}

/// The operations exposed to the UI collaborator.
///
/// Read operations surface only store-level failures; enrichment degradation
/// is absorbed inside the engine and never reaches the caller.
#[async_trait::async_trait]
pub trait ClipboardApi: Send + Sync {
    /// Most recent clips, newest first. Same as `search_clips` with an
    /// empty query.
    async fn get_recent_clips(&self) -> Result<Vec<ClipRecord>, SageError>;

    /// Hybrid keyword + semantic search, ranked, bounded to one page.
    async fn search_clips(&self, query: String) -> Result<Vec<ClipRecord>, SageError>;

    /// Lifecycle command forwarded to the window delegate. Fire-and-forget;
    /// has no effect on stored data.
    async fn hide_window(&self);
}

/// Receives window lifecycle commands forwarded by [`ClipboardApi::hide_window`].
pub trait WindowDelegate: Send + Sync {
    fn hide(&self);
}

impl From<crate::database::DatabaseError> for SageError {
    fn from(e: crate::database::DatabaseError) -> Self {
        SageError::DatabaseError(e.to_string())
    }
}

impl From<crate::indexer::IndexerError> for SageError {
    fn from(e: crate::indexer::IndexerError) -> Self {
        SageError::IndexError(e.to_string())
    }
}
