//! Tantivy keyword index over clip content, summary, and tags.
//!
//! Trigram tokenization (lowercased) gives case-insensitive substring-style
//! recall; a minimum-should-match threshold keeps scattered coincidental
//! trigrams out of the candidate set. Queries under 3 characters return
//! empty — the store falls back to a LIKE scan for those.

use chrono::Utc;
use parking_lot::RwLock;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::{NgramTokenizer, TextAnalyzer};
use tantivy::{DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Score, Term};
use thiserror::Error;

use crate::search::{RECENCY_BOOST_MAX, RECENCY_HALF_LIFE_SECS};

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("Directory error: {0}")]
    Directory(#[from] tantivy::directory::error::OpenDirectoryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

/// Keyword index handle. Writer and reader sit behind their own locks so
/// the pipeline's adds never block a concurrent search.
pub struct Indexer {
    index: Index,
    writer: RwLock<IndexWriter>,
    reader: RwLock<IndexReader>,
    id_field: Field,
    text_field: Field,
    timestamp_field: Field,
}

impl Indexer {
    /// Create or open an indexer at the given path
    pub fn new(path: &Path) -> IndexerResult<Self> {
        std::fs::create_dir_all(path)?;
        let dir = MmapDirectory::open(path)?;
        let schema = Self::build_schema();
        let index = Index::open_or_create(dir, schema.clone())?;
        Self::register_tokenizer(&index);

        let writer = index.writer(50_000_000)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self::from_parts(index, writer, reader, schema))
    }

    /// In-memory index (for testing)
    #[cfg(test)]
    pub(crate) fn new_in_memory() -> IndexerResult<Self> {
        let schema = Self::build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::register_tokenizer(&index);

        let writer = index.writer(15_000_000)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self::from_parts(index, writer, reader, schema))
    }

    fn from_parts(index: Index, writer: IndexWriter, reader: IndexReader, schema: Schema) -> Self {
        Self {
            id_field: schema.get_field("id").unwrap(),
            text_field: schema.get_field("text").unwrap(),
            timestamp_field: schema.get_field("timestamp").unwrap(),
            index,
            writer: RwLock::new(writer),
            reader: RwLock::new(reader),
        }
    }

    fn build_schema() -> Schema {
        let mut builder = Schema::builder();

        // Clip id: raw term, used for retrieval and upsert-by-id
        builder.add_text_field("id", STRING | STORED);

        // Combined content/summary/tags text with trigram tokenization
        let text_field_indexing = TextFieldIndexing::default()
            .set_tokenizer("trigram")
            .set_index_option(IndexRecordOption::WithFreqs);
        let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
        builder.add_text_field("text", text_options);

        builder.add_i64_field("timestamp", STORED | FAST);
        builder.build()
    }

    fn register_tokenizer(index: &Index) {
        let tokenizer = TextAnalyzer::builder(NgramTokenizer::new(3, 3, false).unwrap())
            .filter(tantivy::tokenizer::LowerCaser)
            .build();
        index.tokenizers().register("trigram", tokenizer);
    }

    /// Add or update a document. Any earlier document carrying the same clip
    /// id is deleted first, so re-adding is an upsert.
    pub fn add_document(&self, id: &str, text: &str, timestamp: i64) -> IndexerResult<()> {
        let writer = self.writer.read();
        writer.delete_term(Term::from_field_text(self.id_field, id));

        let mut doc = tantivy::TantivyDocument::default();
        doc.add_text(self.id_field, id);
        doc.add_text(self.text_field, text);
        doc.add_i64(self.timestamp_field, timestamp);
        writer.add_document(doc)?;

        Ok(())
    }

    pub fn commit(&self) -> IndexerResult<()> {
        self.writer.write().commit()?;
        self.reader.write().reload()?;
        Ok(())
    }

    pub fn delete_document(&self, id: &str) -> IndexerResult<()> {
        let writer = self.writer.read();
        let id_term = Term::from_field_text(self.id_field, id);
        writer.delete_term(id_term);
        Ok(())
    }

    pub fn clear(&self) -> IndexerResult<()> {
        let mut writer = self.writer.write();
        writer.delete_all_documents()?;
        writer.commit()?;
        drop(writer);
        self.reader.write().reload()?;
        Ok(())
    }

    /// Number of committed documents.
    pub fn num_docs(&self) -> u64 {
        self.reader.read().searcher().num_docs()
    }

    /// Tokenize text with the trigram tokenizer, deduplicated, as index terms.
    fn trigram_terms(&self, text: &str) -> Vec<Term> {
        let mut tokenizer = self.index.tokenizers().get("trigram").unwrap();
        let mut stream = tokenizer.token_stream(text);
        let mut seen = std::collections::HashSet::new();
        let mut terms = Vec::new();
        while let Some(token) = stream.next() {
            let term = Term::from_field_text(self.text_field, &token.text);
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        terms
    }

    /// Trigram recall with a recency-blended score.
    /// Returns ranked (clip id, blended score) pairs, best first.
    pub fn search(&self, query: &str, limit: usize) -> IndexerResult<Vec<(String, f64)>> {
        let reader = self.reader.read();
        let searcher = reader.searcher();

        let terms = self.trigram_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let num_terms = terms.len();

        let clauses = terms
            .into_iter()
            .map(|term| {
                let clause: Box<dyn tantivy::query::Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                (Occur::Should, clause)
            })
            .collect::<Vec<_>>();
        let mut recall = BooleanQuery::new(clauses);

        // Require most trigrams to hit so common-trigram noise doesn't recall
        // unrelated clips. Thresholds loosen for very short queries where a
        // single miss would otherwise reject legitimate matches.
        if let Some(required) = min_should_match(num_terms) {
            recall.set_minimum_number_should_match(required);
        }

        // Blend BM25 with recency at collection time so fresh clips make the
        // candidate set even against higher-frequency older matches.
        let now = Utc::now().timestamp();
        let collector =
            TopDocs::with_limit(limit).tweak_score(move |segment: &tantivy::SegmentReader| {
                let timestamps = segment
                    .fast_fields()
                    .i64("timestamp")
                    .expect("timestamp fast field");
                move |doc: DocId, bm25: Score| {
                    let captured = timestamps.first(doc).unwrap_or(0);
                    let age = (now - captured).max(0) as f64;
                    let freshness = (-age * 2.0_f64.ln() / RECENCY_HALF_LIFE_SECS).exp();
                    (bm25 as f64).max(0.001) * (1.0 + RECENCY_BOOST_MAX * freshness)
                }
            });

        let mut hits = Vec::new();
        for (blended, address) in searcher.search(&recall, &collector)? {
            let doc: tantivy::TantivyDocument = searcher.doc(address)?;
            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
                if !id.is_empty() {
                    hits.push((id.to_string(), blended));
                }
            }
        }

        Ok(hits)
    }
}

/// How many of `num_terms` Should-clauses a match must satisfy.
/// `None` below 3 trigrams: every clause stays optional.
fn min_should_match(num_terms: usize) -> Option<usize> {
    match num_terms {
        0..=2 => None,
        3..=6 => Some(num_terms.div_ceil(2)),
        7..=19 => Some((num_terms * 2 / 3).max(5)),
        _ => Some(num_terms * 4 / 5),
    }
}
