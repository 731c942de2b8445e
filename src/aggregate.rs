//! Thread-safe collection of per-item outcomes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::models::{DocumentRecord, EnrichedDocument, FailureKind};

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSummary {
    /// Every item handed to the aggregator, whatever its outcome.
    pub files_processed: u64,
    pub folders: u64,
    pub documents: u64,
    pub extraction_failures: u64,
    pub enrichment_failures: u64,
    pub internal_failures: u64,
    pub skipped: u64,
}

impl AggregateSummary {
    pub fn total_failures(&self) -> u64 {
        self.extraction_failures + self.enrichment_failures + self.internal_failures
    }
}

/// Sink shared by all workers. One [`DocumentRecord`] per processed item.
#[derive(Debug, Default)]
pub struct MetadataAggregator {
    records: Mutex<Vec<DocumentRecord>>,
    files: AtomicU64,
    folders: AtomicU64,
}

impl MetadataAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DocumentRecord>> {
        // a panicking holder cannot leave the Vec half-written, so keep using it
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, record: DocumentRecord) {
        let mut records = self.lock();
        records.push(record);
        self.files.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_folders(&self, n: u64) {
        self.folders.fetch_add(n, Ordering::SeqCst);
    }

    pub fn file_count(&self) -> u64 {
        self.files.load(Ordering::SeqCst)
    }

    pub fn folder_count(&self) -> u64 {
        self.folders.load(Ordering::SeqCst)
    }

    /// Snapshot of all records accumulated so far, in completion order.
    pub fn records(&self) -> Vec<DocumentRecord> {
        self.lock().clone()
    }

    /// Successfully enriched documents only.
    pub fn documents(&self) -> Vec<EnrichedDocument> {
        self.lock()
            .iter()
            .filter_map(|r| r.as_processed().cloned())
            .collect()
    }

    pub fn into_records(self) -> Vec<DocumentRecord> {
        self.records.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    pub fn summary(&self) -> AggregateSummary {
        let records = self.lock();
        let mut summary = AggregateSummary {
            files_processed: records.len() as u64,
            folders: self.folder_count(),
            ..Default::default()
        };
        for record in records.iter() {
            match record {
                DocumentRecord::Processed(doc) => {
                    summary.documents += 1;
                    if doc.enrichment_error.is_some() {
                        summary.enrichment_failures += 1;
                    }
                }
                DocumentRecord::Failed(f) => match f.kind {
                    FailureKind::Extraction => summary.extraction_failures += 1,
                    FailureKind::Internal => summary.internal_failures += 1,
                },
                DocumentRecord::Skipped(_) => summary.skipped += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureRecord, SkippedRecord};
    use std::sync::Arc;

    fn skipped(i: usize) -> DocumentRecord {
        DocumentRecord::Skipped(SkippedRecord {
            relative_path: format!("file{}.bin", i),
            extension: "bin".to_string(),
        })
    }

    #[test]
    fn concurrent_inserts_are_neither_lost_nor_doubled() {
        let agg = Arc::new(MetadataAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        agg.record(skipped(t * 1000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(agg.file_count(), 2000);
        let records = agg.records();
        assert_eq!(records.len(), 2000);
        let unique: std::collections::HashSet<_> =
            records.iter().map(|r| r.relative_path().to_string()).collect();
        assert_eq!(unique.len(), 2000);
    }

    #[test]
    fn summary_counts_by_category() {
        let agg = MetadataAggregator::new();
        agg.record(skipped(1));
        agg.record(DocumentRecord::Failed(FailureRecord {
            document_id: "abc".to_string(),
            relative_path: "bad.pdf".to_string(),
            kind: FailureKind::Extraction,
            error: "PDF extraction failed".to_string(),
        }));
        agg.add_folders(4);

        let summary = agg.summary();
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.extraction_failures, 1);
        assert_eq!(summary.total_failures(), 1);
        assert_eq!(summary.folders, 4);
        assert!(agg.documents().is_empty());
    }
}
