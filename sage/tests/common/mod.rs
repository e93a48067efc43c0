//! Shared fixtures: deterministic mock capabilities, a scripted clipboard,
//! and a helper that drives the pipeline over a list of captures.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sage::enrichment::{Capabilities, Embedder, Summarizer, Tagger};
use sage::monitor::{ClipboardAccessError, ClipboardSource, RawCapture};
use sage::pipeline::EnrichmentPipeline;
use sage::{ClipStore, SageConfig};

pub const MOCK_EMBED_DIMS: usize = 64;

/// Route engine tracing through the test harness. Safe to call from every
/// fixture; only the first install wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One model standing in for all three capabilities. Failure and latency
/// are switchable mid-test; every successful call is counted.
pub struct MockModel {
    fail: AtomicBool,
    latency: Mutex<Duration>,
    pub calls: AtomicUsize,
    /// Axis assignment per distinct text: identical texts embed identically,
    /// distinct texts embed orthogonally. No hash collisions to reason about.
    axes: Mutex<HashMap<String, usize>>,
}

impl MockModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            axes: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    async fn gate(&self) -> Result<()> {
        let latency = *self.latency.lock().unwrap();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("mock capability offline");
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Unit vector on the axis assigned to this exact text.
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut axes = self.axes.lock().unwrap();
        let next = axes.len();
        let axis = *axes.entry(text.to_string()).or_insert(next);
        let mut vector = vec![0.0f32; MOCK_EMBED_DIMS];
        vector[axis % MOCK_EMBED_DIMS] = 1.0;
        vector
    }
}

#[async_trait]
impl Summarizer for MockModel {
    async fn summarize(&self, content: &str) -> Result<String> {
        self.gate().await?;
        let head: String = content.chars().take(24).collect();
        Ok(format!("mock summary of {}", head))
    }
}

#[async_trait]
impl Tagger for MockModel {
    async fn tag(&self, _content: &str, _summary: &str) -> Result<Vec<String>> {
        self.gate().await?;
        // Deliberately messy output — the pipeline owns tag hygiene
        Ok(vec![
            " Mock ".to_string(),
            "mock".to_string(),
            String::new(),
            "TAGGED".to_string(),
        ])
    }
}

#[async_trait]
impl Embedder for MockModel {
    fn version(&self) -> &str {
        "mock-embed-1"
    }

    fn dimensions(&self) -> usize {
        MOCK_EMBED_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.gate().await?;
        Ok(self.embedding_for(text))
    }
}

pub fn capabilities(model: &Arc<MockModel>) -> Capabilities {
    Capabilities {
        summarizer: model.clone(),
        tagger: model.clone(),
        embedder: model.clone(),
    }
}

/// Clipboard source that yields one scripted step per poll, then reads as
/// empty forever.
pub struct ScriptedClipboard {
    steps: Mutex<VecDeque<Result<Option<String>, ClipboardAccessError>>>,
}

impl ScriptedClipboard {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            steps: Mutex::new(
                texts
                    .iter()
                    .map(|t| Ok(Some(t.to_string())))
                    .collect(),
            ),
        }
    }
}

impl ClipboardSource for ScriptedClipboard {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardAccessError> {
        self.steps.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// Drive the pipeline over `captures` to completion and return.
pub async fn run_pipeline(
    store: Arc<ClipStore>,
    caps: Capabilities,
    config: SageConfig,
    captures: Vec<RawCapture>,
) {
    let (tx, rx) = mpsc::channel(64);
    let token = CancellationToken::new();
    let pipeline = EnrichmentPipeline::new(store, caps, config, rx, token).unwrap();
    let handle = tokio::spawn(pipeline.run());

    for capture in captures {
        tx.send(capture).await.unwrap();
    }
    drop(tx);
    handle.await.unwrap();
}

/// A tight-timeout config so capability stalls resolve quickly in tests.
pub fn test_config() -> SageConfig {
    SageConfig {
        poll_interval: Duration::from_millis(10),
        min_capture_len: 1,
        summarize_timeout: Duration::from_millis(100),
        tag_timeout: Duration::from_millis(100),
        embed_timeout: Duration::from_millis(100),
        query_embed_timeout: Duration::from_millis(100),
        ..SageConfig::default()
    }
}
