//! Error taxonomy for the ingestion pipeline.
//!
//! Each component boundary has its own error type. Per-item errors
//! (traversal, extraction, enrichment, graph writes) are caught where they
//! occur and turned into recorded outcomes; only configuration and startup
//! failures travel up to `main` as `anyhow::Error`.

use std::path::PathBuf;

use thiserror::Error;

/// A subtree or entry could not be read during discovery.
#[derive(Error, Debug)]
pub enum TraversalError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Extraction of a single file failed. Never raised past a worker.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("unsupported extension: {0}")]
    Unsupported(String),

    #[error("extractor panicked: {0}")]
    Panicked(String),
}

/// Text analysis failed for a document.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("invalid vocabulary pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("vocabulary term {0:?} has no keywords")]
    EmptyTerm(String),

    #[error("enrichment task failed: {0}")]
    Task(String),
}

/// Writing one document's subgraph failed.
#[derive(Error, Debug)]
pub enum GraphWriteError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    #[error("graph write rejected: {0}")]
    Rejected(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for GraphWriteError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => GraphWriteError::Unavailable(e.to_string()),
            other => GraphWriteError::Rejected(other.to_string()),
        }
    }
}
