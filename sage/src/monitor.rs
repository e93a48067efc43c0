//! Clipboard monitor: polls the OS clipboard and emits raw capture events.
//!
//! The monitor is the sole producer of captures. It keeps the hash of the
//! last content it observed as loop-local state, so unchanged clipboard
//! contents never re-emit, and hands each distinct transition to the
//! pipeline over a bounded channel.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SageConfig;
use crate::models::{hash_content, normalize_content};

/// A detected clipboard-content change, before enrichment.
#[derive(Debug, Clone)]
pub struct RawCapture {
    /// Normalized text content.
    pub content: String,
    /// Hash of `content`; recomputed by nobody downstream.
    pub content_hash: String,
    /// Capture instant — committed records carry this, not the commit time.
    pub captured_at: DateTime<Utc>,
    pub source: Option<String>,
}

impl RawCapture {
    /// Build a capture from raw clipboard text, stamped now.
    pub fn from_text(raw: &str, source: Option<String>) -> Self {
        let content = normalize_content(raw);
        let content_hash = hash_content(&content);
        Self {
            content,
            content_hash,
            captured_at: Utc::now(),
            source,
        }
    }
}

#[derive(Debug, Error)]
#[error("clipboard access failed: {0}")]
pub struct ClipboardAccessError(pub String);

/// Read access to the current clipboard text. `SystemClipboard` wraps the
/// OS clipboard; tests substitute a scripted source.
pub trait ClipboardSource: Send {
    /// Current text content; `Ok(None)` when the clipboard is empty or holds
    /// non-text content.
    fn read_text(&mut self) -> Result<Option<String>, ClipboardAccessError>;

    /// Best-effort origin label attached to captures from this source.
    fn source_label(&self) -> Option<String> {
        Some("clipboard".to_string())
    }
}

/// OS clipboard via arboard.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardAccessError> {
        arboard::Clipboard::new()
            .map(|inner| Self { inner })
            .map_err(|e| ClipboardAccessError(e.to_string()))
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardAccessError> {
        match self.inner.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardAccessError(e.to_string())),
        }
    }
}

/// Polling loop emitting one `RawCapture` per distinct content transition.
pub struct ClipboardMonitor<S: ClipboardSource> {
    source: S,
    poll_interval: std::time::Duration,
    min_capture_len: usize,
    events: mpsc::Sender<RawCapture>,
    token: CancellationToken,
}

impl<S: ClipboardSource> ClipboardMonitor<S> {
    pub fn new(
        source: S,
        config: &SageConfig,
        events: mpsc::Sender<RawCapture>,
        token: CancellationToken,
    ) -> Self {
        Self {
            source,
            poll_interval: config.poll_interval,
            min_capture_len: config.min_capture_len,
            events,
            token,
        }
    }

    /// Poll until cancelled. Consumes the monitor; run it on its own task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Hash of the last clipboard content this loop has seen. Distinct
        // from the store's dedup hash: this one only stops re-emission of
        // unchanged clipboard state on every tick.
        let mut last_seen: Option<String> = None;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let text = match self.source.read_text() {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    // Transient OS failure: skip this tick, retry on the next
                    tracing::debug!(error = %e, "clipboard read failed, retrying next tick");
                    continue;
                }
            };

            let content = normalize_content(&text);
            if content.len() < self.min_capture_len {
                continue;
            }

            let content_hash = hash_content(&content);
            if last_seen.as_deref() == Some(content_hash.as_str()) {
                continue;
            }
            last_seen = Some(content_hash.clone());

            let capture = RawCapture {
                content,
                content_hash,
                captured_at: Utc::now(),
                source: self.source.source_label(),
            };

            // The channel capacity absorbs enrichment stalls; a full queue
            // delays the next poll rather than dropping the capture.
            if self.events.send(capture).await.is_err() {
                // Pipeline gone; nothing left to produce for.
                break;
            }
        }
    }
}
