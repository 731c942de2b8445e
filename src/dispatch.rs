//! Bounded worker pool for extraction and enrichment.
//!
//! ```text
//!  discovery (blocking thread)          N worker tasks
//!  ┌──────────────┐   bounded mpsc   ┌────────────────────────────┐
//!  │ SourceDocument├────────────────▶│ extract → enrich → record  │──▶ MetadataAggregator
//!  └──────────────┘                   └────────────────────────────┘
//! ```
//!
//! [`WorkDispatcher::run`] returns only after the producer has finished
//! enqueuing and every worker has exited. A worker exits only once the
//! queue is closed and empty, and it never abandons the item it holds, so
//! joining all workers means every enqueued item has been recorded.
//!
//! Each item is processed in its own task so that a panicking extractor or
//! enricher turns into a failure record instead of taking a worker down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;

use crate::aggregate::MetadataAggregator;
use crate::enrich::{detect_language, Enricher};
use crate::error::ExtractionError;
use crate::extract::ExtractorRegistry;
use crate::models::{
    preview, quick_overview, DocumentRecord, EnrichedDocument, Enrichment, FailureKind,
    FailureRecord, SkippedRecord, SourceDocument,
};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::source_fs::PathSource;

/// Tells a running dispatcher to stop taking new work.
///
/// Workers finish the item they hold and exit; items still queued are not
/// processed.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Outcome of one [`WorkDispatcher::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub enqueued: u64,
    pub completed: u64,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl DispatchReport {
    /// True when every enqueued item was fully processed.
    pub fn drained(&self) -> bool {
        self.enqueued == self.completed
    }
}

/// Read-only state shared by workers.
struct Shared {
    registry: Arc<ExtractorRegistry>,
    enricher: Arc<dyn Enricher>,
    aggregator: Arc<MetadataAggregator>,
    progress: Arc<dyn ProgressReporter>,
    preview_chars: usize,
    overview_chars: usize,
}

pub struct WorkDispatcher {
    registry: Arc<ExtractorRegistry>,
    enricher: Arc<dyn Enricher>,
    aggregator: Arc<MetadataAggregator>,
    progress: Arc<dyn ProgressReporter>,
    preview_chars: usize,
    overview_chars: usize,
    concurrency: usize,
    queue_capacity: usize,
    cancel: CancelHandle,
}

impl WorkDispatcher {
    pub fn new(
        registry: ExtractorRegistry,
        enricher: Arc<dyn Enricher>,
        aggregator: Arc<MetadataAggregator>,
    ) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            registry: Arc::new(registry),
            enricher,
            aggregator,
            progress: Arc::new(NoProgress),
            preview_chars: 1500,
            overview_chars: 500,
            concurrency: 8,
            queue_capacity: 64,
            cancel: CancelHandle { tx: Arc::new(tx) },
        }
    }

    /// Number of worker tasks; values below 1 are raised to 1.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_text_limits(mut self, preview_chars: usize, overview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self.overview_chars = overview_chars;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn aggregator(&self) -> &Arc<MetadataAggregator> {
        &self.aggregator
    }

    /// Walk `source` and process everything it yields.
    pub async fn run_source(&self, source: &PathSource) -> DispatchReport {
        self.progress.report(ProgressEvent::Discovering {
            root: source.root().display().to_string(),
        });
        let documents = source.documents();
        let folders = documents.folder_counter();
        let report = self.run(documents).await;
        self.aggregator.add_folders(folders.load(Ordering::SeqCst));
        report
    }

    /// Feed `items` through the worker pool and wait until all of them have
    /// been recorded (or until cancellation).
    pub async fn run<I>(&self, items: I) -> DispatchReport
    where
        I: IntoIterator<Item = SourceDocument>,
        I::IntoIter: Send + 'static,
    {
        let started = Instant::now();
        let shared = Arc::new(Shared {
            registry: Arc::clone(&self.registry),
            enricher: Arc::clone(&self.enricher),
            aggregator: Arc::clone(&self.aggregator),
            progress: Arc::clone(&self.progress),
            preview_chars: self.preview_chars,
            overview_chars: self.overview_chars,
        });
        let (tx, rx) = mpsc::channel::<SourceDocument>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let enqueued = Arc::new(AtomicU64::new(0));
        let completed = Arc::new(AtomicU64::new(0));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&shared),
                Arc::clone(&rx),
                self.cancel.tx.subscribe(),
                Arc::clone(&enqueued),
                Arc::clone(&completed),
            ));
        }

        // Discovery hashes files, so it runs on the blocking pool. Dropping
        // `tx` at the end closes the queue and lets idle workers exit.
        let producer = {
            let items = items.into_iter();
            let cancel = self.cancel.clone();
            let enqueued = Arc::clone(&enqueued);
            tokio::task::spawn_blocking(move || {
                for doc in items {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if tx.blocking_send(doc).is_err() {
                        break;
                    }
                    enqueued.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        // Workers only see a closed, empty queue once the producer has
        // dropped `tx`, so joining them is the drain barrier. After a
        // cancellation they exit early; dropping the last receiver then
        // unblocks a producer waiting on a full queue.
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
        drop(rx);
        if let Err(e) = producer.await {
            tracing::error!(error = %e, "discovery task failed");
        }

        let report = DispatchReport {
            enqueued: enqueued.load(Ordering::SeqCst),
            completed: completed.load(Ordering::SeqCst),
            cancelled: self.cancel.is_cancelled(),
            elapsed: started.elapsed(),
        };
        if !report.drained() && !report.cancelled {
            tracing::error!(
                enqueued = report.enqueued,
                completed = report.completed,
                "queue not fully drained"
            );
        }
        tracing::info!(
            enqueued = report.enqueued,
            completed = report.completed,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "dispatch finished"
        );
        report
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<Shared>,
    queue: Arc<Mutex<mpsc::Receiver<SourceDocument>>>,
    mut cancel: watch::Receiver<bool>,
    enqueued: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                tracing::debug!(worker_id, "worker cancelled");
                return;
            }
            doc = async { queue.lock().await.recv().await } => doc,
        };
        let Some(doc) = next else {
            tracing::debug!(worker_id, "queue closed, worker exiting");
            return;
        };

        let document_id = doc.id.clone();
        let relative_path = doc.relative_path.clone();
        let record = match tokio::spawn(process_item(Arc::clone(&shared), doc)).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(path = %relative_path, error = %e, "item processing panicked");
                DocumentRecord::Failed(FailureRecord {
                    document_id,
                    relative_path,
                    kind: FailureKind::Internal,
                    error: e.to_string(),
                })
            }
        };
        shared.aggregator.record(record);

        let n = completed.fetch_add(1, Ordering::SeqCst) + 1;
        shared.progress.report(ProgressEvent::Processing {
            n,
            enqueued: enqueued.load(Ordering::SeqCst).max(n),
        });
    }
}

/// Resolves once cancellation has been requested. Never resolves if the
/// sender is gone without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Extract, enrich and package one document. Never fails: every problem
/// becomes part of the returned record.
async fn process_item(shared: Arc<Shared>, doc: SourceDocument) -> DocumentRecord {
    if !shared.registry.supports(&doc.extension) {
        tracing::warn!(path = %doc.relative_path, extension = %doc.extension, "unsupported file type, skipping");
        return DocumentRecord::Skipped(SkippedRecord {
            relative_path: doc.relative_path,
            extension: doc.extension,
        });
    }

    let started = Instant::now();
    let extracted = {
        let registry = Arc::clone(&shared.registry);
        let extension = doc.extension.clone();
        let path = doc.absolute_path.clone();
        tokio::task::spawn_blocking(move || registry.extract(&extension, &path))
            .await
            .unwrap_or_else(|e| Err(ExtractionError::Panicked(e.to_string())))
    };
    let content = match extracted {
        Ok(content) => content,
        Err(e) => {
            tracing::error!(path = %doc.relative_path, id = %doc.id, error = %e, "extraction failed");
            return DocumentRecord::Failed(FailureRecord {
                document_id: doc.id,
                relative_path: doc.relative_path,
                kind: FailureKind::Extraction,
                error: e.to_string(),
            });
        }
    };

    let (enrichment, enrichment_error) = match shared
        .enricher
        .enrich(&content.text, doc.page_count)
        .await
    {
        Ok(enrichment) => (enrichment, None),
        Err(e) => {
            tracing::warn!(path = %doc.relative_path, id = %doc.id, error = %e, "enrichment failed, keeping partial record");
            let partial = Enrichment {
                language: detect_language(&content.text),
                word_count: content.text.split_whitespace().count(),
                page_count: doc.page_count,
                ..Default::default()
            };
            (partial, Some(e.to_string()))
        }
    };
    let elapsed = started.elapsed().as_secs_f64();

    tracing::info!(path = %doc.relative_path, "processed file");
    DocumentRecord::Processed(Box::new(EnrichedDocument {
        content_length: content.text.chars().count(),
        line_count: content.line_count,
        content_preview: preview(&content.text, shared.preview_chars),
        overview: quick_overview(&content.text, shared.overview_chars),
        properties: content.properties,
        enrichment,
        enrichment_error,
        ingested_at: Utc::now(),
        extraction_time_secs: (elapsed * 1000.0).round() / 1000.0,
        source: doc,
    }))
}
