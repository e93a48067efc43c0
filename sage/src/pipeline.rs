//! Ingestion pipeline: dedupe → enrich → commit.
//!
//! One capture is processed fully before the next, so commit order matches
//! arrival order and the store sees exactly one writer. Every enrichment
//! step is fail-soft behind its own timeout: a dead model server degrades
//! summaries and tags to local heuristics and leaves the embedding empty,
//! but never blocks a capture from committing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SageConfig;
use crate::database::DatabaseError;
use crate::enrichment::{fallback_summary, heuristic_tags, Capabilities};
use crate::models::{normalize_tags, StoredClip};
use crate::monitor::RawCapture;
use crate::store::ClipStore;

pub struct EnrichmentPipeline {
    store: Arc<ClipStore>,
    capabilities: Capabilities,
    config: SageConfig,
    events: mpsc::Receiver<RawCapture>,
    token: CancellationToken,
    /// Hashes of the most recently committed clips, newest first.
    /// Depth 1 is the immediate-duplicate rule.
    recent_hashes: VecDeque<String>,
}

impl EnrichmentPipeline {
    /// Build a pipeline over an open store. Dedup state is seeded from the
    /// store so a restart does not re-admit the clip already on the
    /// clipboard.
    pub fn new(
        store: Arc<ClipStore>,
        capabilities: Capabilities,
        config: SageConfig,
        events: mpsc::Receiver<RawCapture>,
        token: CancellationToken,
    ) -> Result<Self, DatabaseError> {
        let recent_hashes = store.latest_hashes(config.dedupe_depth)?.into();
        Ok(Self {
            store,
            capabilities,
            config,
            events,
            token,
            recent_hashes,
        })
    }

    /// Process captures until cancelled, then drain what is already queued
    /// within the shutdown grace period. Consumes the pipeline; run it on
    /// its own task.
    pub async fn run(mut self) {
        loop {
            let capture = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                capture = self.events.recv() => match capture {
                    Some(capture) => capture,
                    // Monitor gone and queue empty — nothing left to drain.
                    None => return,
                },
            };

            // Cancellation mid-enrichment abandons the capability calls and
            // drops the uncommitted capture; queued captures are still
            // drained below with local enrichment.
            let token = self.token.clone();
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("shutdown during enrichment, in-flight capture dropped");
                    break;
                }
                _ = self.process(capture) => {}
            }
        }
        self.drain();
    }

    /// Commit already-queued captures with local enrichment only, under a
    /// hard deadline. In-flight capability calls were abandoned by `run`
    /// returning from `select!`; no record is ever half-written.
    fn drain(&mut self) {
        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut drained = 0usize;

        while Instant::now() < deadline {
            match self.events.try_recv() {
                Ok(capture) => {
                    self.commit_with_local_enrichment(capture);
                    drained += 1;
                }
                Err(_) => break,
            }
        }

        let dropped = self.events.len();
        if drained > 0 || dropped > 0 {
            tracing::info!(drained, dropped, "pipeline drained at shutdown");
        }
    }

    /// One full pipeline run for a single capture.
    async fn process(&mut self, capture: RawCapture) {
        if self.is_duplicate(&capture) {
            tracing::debug!(hash = %capture.content_hash, "suppressing immediate duplicate capture");
            return;
        }

        let (summary, tags, embedding) = self.enrich(&capture).await;
        self.commit(capture, summary, tags, embedding);
    }

    fn commit_with_local_enrichment(&mut self, capture: RawCapture) {
        if self.is_duplicate(&capture) {
            return;
        }
        let summary = fallback_summary(&capture.content);
        let tags = normalize_tags(heuristic_tags(&capture.content));
        self.commit(capture, summary, tags, None);
    }

    fn is_duplicate(&self, capture: &RawCapture) -> bool {
        self.recent_hashes.iter().any(|h| h == &capture.content_hash)
    }

    /// Run the three capability steps, each under its own budget, each
    /// falling back locally on failure.
    async fn enrich(&self, capture: &RawCapture) -> (String, Vec<String>, Option<Vec<f32>>) {
        let content = &capture.content;
        let caps = &self.capabilities;

        let summary = match timeout(
            self.config.summarize_timeout,
            caps.summarizer.summarize(content),
        )
        .await
        {
            Ok(Ok(summary)) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(Ok(_)) => fallback_summary(content),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "summarizer unavailable, using local fallback");
                fallback_summary(content)
            }
            Err(_) => {
                tracing::debug!("summarizer timed out, using local fallback");
                fallback_summary(content)
            }
        };

        let tags = match timeout(self.config.tag_timeout, caps.tagger.tag(content, &summary)).await
        {
            Ok(Ok(tags)) => normalize_tags(tags),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "tagger unavailable, using heuristic tags");
                normalize_tags(heuristic_tags(content))
            }
            Err(_) => {
                tracing::debug!("tagger timed out, using heuristic tags");
                normalize_tags(heuristic_tags(content))
            }
        };

        let embedding = match timeout(self.config.embed_timeout, caps.embedder.embed(content)).await
        {
            Ok(Ok(vector)) if vector.len() == caps.embedder.dimensions() => Some(vector),
            Ok(Ok(vector)) => {
                tracing::warn!(
                    got = vector.len(),
                    expected = caps.embedder.dimensions(),
                    "embedder returned wrong dimensionality, committing without vector"
                );
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "embedder unavailable, committing without vector");
                None
            }
            Err(_) => {
                tracing::debug!("embedder timed out, committing without vector");
                None
            }
        };

        (summary, tags, embedding)
    }

    /// Assemble the record and write it. A store failure loses this capture
    /// only; the pipeline moves on.
    fn commit(
        &mut self,
        capture: RawCapture,
        summary: String,
        tags: Vec<String>,
        embedding: Option<Vec<f32>>,
    ) {
        let embedding_version = embedding
            .is_some()
            .then(|| self.capabilities.embedder.version().to_string());

        let clip = StoredClip {
            id: Uuid::new_v4().to_string(),
            content: capture.content,
            content_hash: capture.content_hash.clone(),
            summary,
            tags,
            embedding,
            embedding_version,
            timestamp: capture.captured_at,
            source: capture.source,
        };

        match self.store.insert(&clip) {
            Ok(()) => {
                tracing::info!(id = %clip.id, "clip committed");
                self.recent_hashes.push_front(capture.content_hash);
                self.recent_hashes.truncate(self.config.dedupe_depth.max(1));
            }
            Err(DatabaseError::DuplicateId(id)) => {
                tracing::error!(%id, "generated clip id collided, capture lost");
            }
            Err(e) => {
                tracing::error!(error = %e, "store write failed, capture lost");
            }
        }
    }
}
