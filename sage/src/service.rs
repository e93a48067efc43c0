//! ClipSage service facade.
//!
//! Wires the monitor and pipeline tasks to an open store, owns shutdown
//! ordering, and implements the `ClipboardApi` surface the UI consumes.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SageConfig;
use crate::enrichment::Capabilities;
use crate::interface::{ClipRecord, ClipboardApi, SageError, WindowDelegate};
use crate::monitor::{ClipboardMonitor, ClipboardSource, RawCapture, SystemClipboard};
use crate::pipeline::EnrichmentPipeline;
use crate::search::QueryEngine;
use crate::store::ClipStore;

pub struct ClipSage {
    store: Arc<ClipStore>,
    engine: QueryEngine,
    capabilities: Capabilities,
    config: SageConfig,
    token: CancellationToken,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    pipeline_task: Mutex<Option<JoinHandle<()>>>,
    window: RwLock<Option<Arc<dyn WindowDelegate>>>,
}

impl ClipSage {
    /// Open the engine over a database path. Background tasks are not
    /// started until `spawn` (or `spawn_with_source`) is called.
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        capabilities: Capabilities,
        config: SageConfig,
    ) -> Result<Arc<Self>, SageError> {
        let store = Arc::new(ClipStore::open(db_path)?);
        let engine = QueryEngine::new(
            Arc::clone(&store),
            capabilities.embedder.clone(),
            config.clone(),
        );

        Ok(Arc::new(Self {
            store,
            engine,
            capabilities,
            config,
            token: CancellationToken::new(),
            monitor_task: Mutex::new(None),
            pipeline_task: Mutex::new(None),
            window: RwLock::new(None),
        }))
    }

    /// Start the monitor and pipeline tasks against the OS clipboard.
    pub fn spawn(&self) -> Result<(), SageError> {
        let clipboard =
            SystemClipboard::new().map_err(|e| SageError::ClipboardError(e.to_string()))?;
        self.spawn_with_source(clipboard)
    }

    /// Start the background tasks with a custom clipboard source.
    pub fn spawn_with_source<S: ClipboardSource + 'static>(
        &self,
        source: S,
    ) -> Result<(), SageError> {
        let (tx, rx) = mpsc::channel::<RawCapture>(self.config.queue_capacity);

        let monitor = ClipboardMonitor::new(source, &self.config, tx, self.token.clone());
        let pipeline = EnrichmentPipeline::new(
            Arc::clone(&self.store),
            self.capabilities.clone(),
            self.config.clone(),
            rx,
            self.token.clone(),
        )?;

        *self.monitor_task.lock() = Some(tokio::spawn(monitor.run()));
        *self.pipeline_task.lock() = Some(tokio::spawn(pipeline.run()));
        Ok(())
    }

    /// Register the delegate that receives `hide_window`.
    pub fn set_window_delegate(&self, delegate: Arc<dyn WindowDelegate>) {
        *self.window.write() = Some(delegate);
    }

    /// Stop the engine: the monitor stops polling immediately, then the
    /// pipeline drains queued captures within the configured grace period.
    /// Enrichment calls still pending are abandoned; their captures commit
    /// with local enrichment or not at all.
    pub async fn shutdown(&self) {
        self.token.cancel();

        let monitor = self.monitor_task.lock().take();
        if let Some(handle) = monitor {
            let _ = handle.await;
        }
        let pipeline = self.pipeline_task.lock().take();
        if let Some(handle) = pipeline {
            let _ = handle.await;
        }
    }

    /// Re-embedding pass: fill vectors for clips committed without one,
    /// using the current embedding capability. Failures leave rows
    /// untouched for a later attempt. Returns the number of clips updated.
    pub async fn reembed_missing(&self, limit: usize) -> Result<usize, SageError> {
        let pending = self.store.pending_embeddings(limit)?;
        let mut updated = 0usize;

        for (id, content) in pending {
            match tokio::time::timeout(
                self.config.embed_timeout,
                self.capabilities.embedder.embed(&content),
            )
            .await
            {
                Ok(Ok(vector)) if vector.len() == self.capabilities.embedder.dimensions() => {
                    self.store
                        .set_embedding(&id, &vector, self.capabilities.embedder.version())?;
                    updated += 1;
                }
                Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                    tracing::debug!(%id, "re-embedding unavailable, leaving clip pending");
                }
            }
        }

        Ok(updated)
    }

    /// Retention hook: delete clips older than `cutoff`.
    pub async fn purge_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<usize, SageError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.purge_older_than(cutoff))
            .await
            .map_err(|e| SageError::DatabaseError(format!("store task failed: {e}")))?
    }

    /// User purge: drop the whole history.
    pub async fn clear_history(&self) -> Result<(), SageError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.clear())
            .await
            .map_err(|e| SageError::DatabaseError(format!("store task failed: {e}")))?
    }
}

#[async_trait::async_trait]
impl ClipboardApi for ClipSage {
    async fn get_recent_clips(&self) -> Result<Vec<ClipRecord>, SageError> {
        let clips = self.engine.recent().await?;
        Ok(clips.iter().map(|c| c.to_record()).collect())
    }

    async fn search_clips(&self, query: String) -> Result<Vec<ClipRecord>, SageError> {
        let clips = self.engine.search(&query).await?;
        Ok(clips.iter().map(|c| c.to_record()).collect())
    }

    async fn hide_window(&self) {
        let delegate = self.window.read().clone();
        if let Some(delegate) = delegate {
            delegate.hide();
        }
    }
}
