//! Core data models that flow through the ingestion pipeline.
//!
//! A [`SourceDocument`] is produced once per file by discovery and never
//! changes afterwards. Workers turn it into exactly one [`DocumentRecord`],
//! which is what the aggregator collects and the graph projector consumes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag value used when a path has fewer than three directory segments.
pub const UNKNOWN_TAG: &str = "Unknown";

/// Tags inferred from the directory layout beneath the ingestion root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredTags {
    pub domain: String,
    pub region: String,
    pub client: String,
}

impl InferredTags {
    /// Assign the first three directory segments of `relative` to
    /// domain / region / client. The file name itself is never a tag.
    pub fn from_relative_path(relative: &Path) -> Self {
        let mut segments = relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            });

        let mut next = || segments.next().unwrap_or_else(|| UNKNOWN_TAG.to_string());
        let domain = next();
        let region = next();
        let client = next();
        Self {
            domain,
            region,
            client,
        }
    }
}

/// A discovered file, described before any extraction happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Full SHA-256 of the file bytes, hex encoded. Stable document identity.
    pub id: String,
    pub absolute_path: PathBuf,
    /// Path beneath the root with `/` separators.
    pub relative_path: String,
    pub filename: String,
    /// Lowercase extension without the leading dot; empty when absent.
    pub extension: String,
    pub tags: InferredTags,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    /// Pages for paged formats, 0 for everything else.
    pub page_count: u32,
}

/// Output of a successful extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub text: String,
    /// Pages for PDFs, 1 for flat text.
    pub unit_count: u32,
    pub byte_size: u64,
    pub line_count: Option<usize>,
    /// Entries of the PDF `Info` dictionary (Title, Author, ...).
    pub properties: BTreeMap<String, String>,
}

/// Result of running an extractor on one path.
pub type ExtractionResult = Result<ExtractedContent, crate::error::ExtractionError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub document_type: String,
    pub sub_type: String,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            document_type: "RFX Response".to_string(),
            sub_type: "Technical Proposal".to_string(),
        }
    }
}

/// Named entities found in a document, each deduplicated by exact match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub clients: BTreeSet<String>,
    pub products: BTreeSet<String>,
    pub technologies: BTreeSet<String>,
    pub partners: BTreeSet<String>,
}

/// Structured tags returned by an [`Enricher`](crate::enrich::Enricher).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub language: String,
    pub summary: String,
    pub word_count: usize,
    pub page_count: u32,
    pub classification: Classification,
    pub industries: BTreeSet<String>,
    /// Most frequent key phrases, bounded to the configured top-K.
    pub domain_phrases: Vec<String>,
    pub entities: Entities,
}

/// A fully processed document, ready for output and graph projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedDocument {
    #[serde(flatten)]
    pub source: SourceDocument,
    pub content_length: usize,
    pub line_count: Option<usize>,
    pub content_preview: String,
    pub overview: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    pub enrichment: Enrichment,
    /// Set when analysis failed; the enrichment fields are then partial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub extraction_time_secs: f64,
}

impl EnrichedDocument {
    pub fn id(&self) -> &str {
        &self.source.id
    }

    /// Pages as counted at discovery; 0 for formats without pages.
    pub fn page_count(&self) -> u32 {
        self.source.page_count
    }
}

/// Why an item did not produce an [`EnrichedDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Extraction,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub document_id: String,
    pub relative_path: String,
    pub kind: FailureKind,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub relative_path: String,
    pub extension: String,
}

/// Exactly one of these is recorded per dequeued item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentRecord {
    Processed(Box<EnrichedDocument>),
    Failed(FailureRecord),
    Skipped(SkippedRecord),
}

impl DocumentRecord {
    pub fn relative_path(&self) -> &str {
        match self {
            DocumentRecord::Processed(doc) => &doc.source.relative_path,
            DocumentRecord::Failed(f) => &f.relative_path,
            DocumentRecord::Skipped(s) => &s.relative_path,
        }
    }

    pub fn as_processed(&self) -> Option<&EnrichedDocument> {
        match self {
            DocumentRecord::Processed(doc) => Some(doc),
            _ => None,
        }
    }
}

/// First `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Whitespace-collapsed, bounded single-line overview of `text`.
pub fn quick_overview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    preview(&collapsed, max_chars)
}
