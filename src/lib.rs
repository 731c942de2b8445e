//! # docgraph
//!
//! Concurrent document ingestion that projects enriched metadata into a
//! property graph.
//!
//! A directory tree is walked without following links. Every file gets a
//! content-hash identity and tags from its first three directory levels
//! (domain / region / client). A bounded worker pool extracts text (PDF,
//! DOCX, plain text), enriches it (language, summary, industries, key
//! phrases, named entities) and records one outcome per file. Once the
//! queue is drained, every processed document is merged into the graph in
//! its own transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌────────────┐   ┌────────────┐
//! │ PathSource │──▶│ WorkDispatcher (N)   │──▶│ Aggregator │──▶│ Projector  │──▶ GraphStore
//! │  walkdir   │   │ extract → enrich     │   │  records   │   │  merges    │   memory/SQLite
//! └────────────┘   └──────────────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Per-boundary error types |
//! | [`models`] | Core data types |
//! | [`source_fs`] | Filesystem discovery |
//! | [`extract`] | Extractor registry and built-in extractors |
//! | [`enrich`] | Enricher trait and keyword enricher |
//! | [`aggregate`] | Concurrent record sink |
//! | [`dispatch`] | Worker pool with drain barrier and cancellation |
//! | [`graph`] | Graph store contract, in-memory and SQLite backends |
//! | [`project`] | Document → graph merges |
//! | [`db`] | Database connection |
//! | [`migrate`] | Graph schema |
//! | [`export`] | JSON / CSV metadata output |
//! | [`progress`] | Progress reporting |
//! | [`ingest`] | Pipeline orchestration |
//! | [`stats`] | Graph statistics |

pub mod aggregate;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod project;
pub mod source_fs;
pub mod stats;
