//! Write aggregated records to disk.
//!
//! JSON output is the full list of [`DocumentRecord`]s (processed, failed and
//! skipped). CSV output has one flattened row per processed document;
//! set-valued fields are joined with `;`.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::OutputFormat;
use crate::models::{DocumentRecord, EnrichedDocument};

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    relative_path: &'a str,
    filename: &'a str,
    extension: &'a str,
    domain: &'a str,
    region: &'a str,
    client: &'a str,
    size_bytes: u64,
    modified_at: String,
    page_count: u32,
    content_length: usize,
    line_count: Option<usize>,
    language: &'a str,
    word_count: usize,
    summary: &'a str,
    document_type: &'a str,
    sub_type: &'a str,
    industries: String,
    domain_phrases: String,
    clients: String,
    products: String,
    technologies: String,
    partners: String,
    enrichment_error: Option<&'a str>,
    ingested_at: String,
    extraction_time_secs: f64,
}

fn joined<'a, I: IntoIterator<Item = &'a String>>(values: I) -> String {
    values
        .into_iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

impl<'a> From<&'a EnrichedDocument> for CsvRow<'a> {
    fn from(doc: &'a EnrichedDocument) -> Self {
        let src = &doc.source;
        let e = &doc.enrichment;
        Self {
            id: &src.id,
            relative_path: &src.relative_path,
            filename: &src.filename,
            extension: &src.extension,
            domain: &src.tags.domain,
            region: &src.tags.region,
            client: &src.tags.client,
            size_bytes: src.size_bytes,
            modified_at: src.modified_at.to_rfc3339(),
            page_count: doc.page_count(),
            content_length: doc.content_length,
            line_count: doc.line_count,
            language: &e.language,
            word_count: e.word_count,
            summary: &e.summary,
            document_type: &e.classification.document_type,
            sub_type: &e.classification.sub_type,
            industries: joined(&e.industries),
            domain_phrases: joined(&e.domain_phrases),
            clients: joined(&e.entities.clients),
            products: joined(&e.entities.products),
            technologies: joined(&e.entities.technologies),
            partners: joined(&e.entities.partners),
            enrichment_error: doc.enrichment_error.as_deref(),
            ingested_at: doc.ingested_at.to_rfc3339(),
            extraction_time_secs: doc.extraction_time_secs,
        }
    }
}

pub fn write_json<W: Write>(writer: W, records: &[DocumentRecord]) -> Result<()> {
    serde_json::to_writer_pretty(writer, records)?;
    Ok(())
}

pub fn write_csv<W: Write>(writer: W, records: &[DocumentRecord]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for doc in records.iter().filter_map(DocumentRecord::as_processed) {
        out.serialize(CsvRow::from(doc))?;
    }
    out.flush()?;
    Ok(())
}

/// Write `records` to `path` in `format`, creating parent directories.
pub fn write_records(path: &Path, format: OutputFormat, records: &[DocumentRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let writer = std::io::BufWriter::new(file);
    match format {
        OutputFormat::Json => write_json(writer, records)?,
        OutputFormat::Csv => write_csv(writer, records)?,
    }
    tracing::info!(
        path = %path.display(),
        records = records.len(),
        "wrote aggregated metadata"
    );
    Ok(())
}
