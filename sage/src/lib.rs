//! ClipSage Core - clipboard capture and semantic indexing engine
//!
//! This library implements the background engine behind the ClipSage
//! clipboard manager: a polling clipboard monitor, a serial enrichment
//! pipeline (summarize/tag/embed with fail-soft fallbacks), a SQLite-backed
//! store with Tantivy keyword and cosine vector indexes, and a hybrid query
//! engine serving the UI's recent/search operations.

pub mod config;
pub mod database;
pub mod enrichment;
mod indexer;
pub mod interface;
pub mod models;
pub mod monitor;
pub mod pipeline;
mod ranking;
pub mod search;
pub mod service;
mod store;
pub mod vector;

pub use config::SageConfig;
pub use interface::*;
pub use service::ClipSage;
pub use store::ClipStore;
