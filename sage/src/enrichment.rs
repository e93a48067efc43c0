//! Enrichment capabilities: summarize, tag, embed.
//!
//! Three independent capability traits with one network-backed implementation
//! (an Ollama-compatible endpoint) and local heuristic fallbacks. The
//! pipeline bounds every capability call with its own timeout; the
//! implementations here stay oblivious to scheduling.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Produces a short human-readable description of captured text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, content: &str) -> Result<String>;
}

/// Derives a small set of topical tags from content and its summary.
#[async_trait]
pub trait Tagger: Send + Sync {
    async fn tag(&self, content: &str, summary: &str) -> Result<Vec<String>>;
}

/// Computes fixed-length semantic vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model behind the vectors. Persisted with
    /// each embedding so records from different versions coexist.
    fn version(&self) -> &str;

    /// Dimensionality every returned vector must have.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// The capability bundle the pipeline and query engine run against.
#[derive(Clone)]
pub struct Capabilities {
    pub summarizer: Arc<dyn Summarizer>,
    pub tagger: Arc<dyn Tagger>,
    pub embedder: Arc<dyn Embedder>,
}

impl Capabilities {
    /// All three capabilities backed by one Ollama client.
    pub fn ollama(client: Arc<OllamaClient>) -> Self {
        Self {
            summarizer: client.clone(),
            tagger: client.clone(),
            embedder: client,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for an Ollama-compatible local model server.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    generate_model: String,
    embed_model: String,
    embed_dimensions: usize,
}

impl OllamaClient {
    /// Build a client against `base_url` (e.g. `http://localhost:11434`).
    /// The HTTP-level timeout is a hard backstop; the pipeline applies its
    /// own tighter per-step budgets.
    pub fn new(
        base_url: &str,
        generate_model: &str,
        embed_model: &str,
        embed_dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!generate_model.trim().is_empty(), "missing generation model name");
        anyhow::ensure!(!embed_model.trim().is_empty(), "missing embedding model name");
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            generate_model: generate_model.to_string(),
            embed_model: embed_model.to_string(),
            embed_dimensions,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.generate_model,
            prompt,
            stream: false,
        };
        let response: GenerateResponse = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("failed to parse Ollama generate response")?;
        Ok(response.response)
    }
}

#[async_trait]
impl Summarizer for OllamaClient {
    async fn summarize(&self, content: &str) -> Result<String> {
        let prompt = format!(
            "Summarize the following text in one short sentence:\n\n{}",
            content
        );
        let summary = self.generate(&prompt).await?;
        let summary = summary.trim();
        anyhow::ensure!(!summary.is_empty(), "model returned an empty summary");
        Ok(summary.to_string())
    }
}

#[async_trait]
impl Tagger for OllamaClient {
    async fn tag(&self, content: &str, summary: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "List up to five short topical tags for the following text, \
             comma-separated, lowercase, no explanations.\n\nSummary: {}\n\nText:\n{}",
            summary, content
        );
        let raw = self.generate(&prompt).await?;
        let tags: Vec<String> = raw
            .split([',', '\n'])
            .map(|t| t.trim().trim_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Ok(tags)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn version(&self) -> &str {
        &self.embed_model
    }

    fn dimensions(&self) -> usize {
        self.embed_dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embed_model,
            prompt: text,
        };
        let response: EmbeddingResponse = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("failed to parse Ollama embedding response")?;
        anyhow::ensure!(
            response.embedding.len() == self.embed_dimensions,
            "model returned {} dimensions, expected {}",
            response.embedding.len(),
            self.embed_dimensions
        );
        Ok(response.embedding)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Local fallbacks
// ─────────────────────────────────────────────────────────────────────────────

const FALLBACK_SUMMARY_MAX_CHARS: usize = 80;

/// Local summary heuristic: first sentence of the first line, hard-truncated.
pub fn fallback_summary(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let sentence = first_line
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(first_line)
        .trim();
    let base = if sentence.is_empty() { first_line } else { sentence };

    if base.chars().count() <= FALLBACK_SUMMARY_MAX_CHARS {
        base.to_string()
    } else {
        let truncated: String = base.chars().take(FALLBACK_SUMMARY_MAX_CHARS - 1).collect();
        format!("{}…", truncated.trim_end())
    }
}

/// Local tag heuristics: structural signals only, no model required.
pub fn heuristic_tags(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    let mut tags = Vec::new();

    if is_link(trimmed) {
        tags.push("url".to_string());
    }
    if is_email_like(trimmed) {
        tags.push("email".to_string());
    }
    if looks_like_code(content) {
        tags.push("code".to_string());
    }
    if content.chars().count() > 200 {
        tags.push("long-text".to_string());
    }

    tags
}

/// Common web protocols only. Exotic schemes like javascript: or data: are
/// not useful as a topical tag.
fn is_link(text: &str) -> bool {
    if text.contains('\n') || text.len() > 2000 {
        return false;
    }
    match url::Url::parse(text) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https" | "ftp" | "ftps"),
        Err(_) => false,
    }
}

fn is_email_like(text: &str) -> bool {
    if text.contains(char::is_whitespace) {
        return false;
    }
    match text.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

fn looks_like_code(text: &str) -> bool {
    const MARKERS: &[&str] = &[
        "fn ", "function ", "const ", "let ", "def ", "class ", "impl ", "=>", "#include",
    ];
    MARKERS.iter().any(|m| text.contains(m))
        || (text.contains('{') && text.contains('}') && text.contains(';'))
}
