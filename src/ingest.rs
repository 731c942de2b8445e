//! Ingestion pipeline orchestration.
//!
//! Wires the pieces together for one run: PathSource → WorkDispatcher →
//! MetadataAggregator, then (after the drain barrier) GraphProjector over
//! every processed document, then the optional metadata output file.
//! Per-item failures never abort a run; only configuration and store
//! startup errors do.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::aggregate::{AggregateSummary, MetadataAggregator};
use crate::config::{Config, GraphBackend};
use crate::dispatch::{DispatchReport, WorkDispatcher};
use crate::enrich::KeywordEnricher;
use crate::export;
use crate::extract::ExtractorRegistry;
use crate::graph::memory::InMemoryGraph;
use crate::graph::sqlite::SqliteGraph;
use crate::graph::GraphStore;
use crate::models::{DocumentRecord, SourceDocument};
use crate::progress::{NoProgress, ProgressReporter};
use crate::project::{GraphProjector, ProjectionReport};
use crate::source_fs::PathSource;

/// Everything a finished run produced.
#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    pub summary: AggregateSummary,
    #[serde(skip)]
    pub dispatch: DispatchReport,
    /// `None` when the graph backend is disabled.
    pub projection: Option<ProjectionReport>,
    #[serde(skip)]
    pub records: Vec<DocumentRecord>,
}

/// Open the configured graph store, or `None` for the disabled backend.
pub async fn open_graph_store(config: &Config) -> Result<Option<Arc<dyn GraphStore>>> {
    let store: Arc<dyn GraphStore> = match config.graph.backend {
        GraphBackend::Disabled => return Ok(None),
        GraphBackend::Memory => Arc::new(InMemoryGraph::new()),
        GraphBackend::Sqlite => Arc::new(
            SqliteGraph::open(&config.graph.path)
                .await
                .with_context(|| "Failed to open graph store")?,
        ),
    };
    tracing::info!(backend = store.name(), "graph store opened");
    Ok(Some(store))
}

/// Build a dispatcher with the default extractors and the keyword enricher.
pub fn build_dispatcher(
    config: &Config,
    progress: Arc<dyn ProgressReporter>,
) -> Result<WorkDispatcher> {
    let registry = ExtractorRegistry::with_defaults().with_max_bytes(config.pipeline.max_extract_bytes);
    let enricher = KeywordEnricher::from_config(config)
        .with_context(|| "Invalid enrichment vocabulary")?;

    Ok(WorkDispatcher::new(
        registry,
        Arc::new(enricher),
        Arc::new(MetadataAggregator::new()),
    )
    .with_concurrency(config.pipeline.concurrency)
    .with_queue_capacity(config.pipeline.queue_capacity)
    .with_text_limits(config.pipeline.preview_chars, config.pipeline.overview_chars)
    .with_progress(progress))
}

/// Run discovery, processing and projection for `config.source.root`.
pub async fn run_pipeline(
    config: &Config,
    dispatcher: &WorkDispatcher,
    store: Option<Arc<dyn GraphStore>>,
    progress: Arc<dyn ProgressReporter>,
) -> Result<IngestOutcome> {
    let source = PathSource::from_config(&config.source)?;
    let dispatch = dispatcher.run_source(&source).await;
    let aggregator = dispatcher.aggregator();
    let summary = aggregator.summary();

    let projection = match store {
        Some(store) => {
            let projector = GraphProjector::new(store).with_progress(progress);
            Some(projector.project_all(&aggregator.documents()).await)
        }
        None => None,
    };

    Ok(IngestOutcome {
        summary,
        dispatch,
        projection,
        records: aggregator.records(),
    })
}

/// Run the `ingest` command: full pipeline, summary on stdout, optional
/// metadata file. Ctrl-C stops workers from taking new items.
pub async fn run_ingest(config: &Config, progress: Box<dyn ProgressReporter>) -> Result<()> {
    let progress: Arc<dyn ProgressReporter> = Arc::from(progress);
    let store = open_graph_store(config).await?;
    let dispatcher = build_dispatcher(config, Arc::clone(&progress))?;

    let cancel = dispatcher.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight items");
            cancel.cancel();
        }
    });

    let result = run_pipeline(config, &dispatcher, store.clone(), progress).await;
    ctrl_c.abort();
    if let Some(store) = &store {
        store.close().await;
    }
    let outcome = result?;

    if let Some(path) = &config.output.path {
        export::write_records(path, config.output.format, &outcome.records)?;
    }

    print_summary(config, &outcome);
    Ok(())
}

fn print_summary(config: &Config, outcome: &IngestOutcome) {
    let s = &outcome.summary;
    let d = &outcome.dispatch;
    println!(
        "ingest {}{}",
        config.source.root.display(),
        if d.cancelled { " (cancelled)" } else { "" }
    );
    println!("  folders scanned: {}", s.folders);
    println!("  files processed: {} / {} enqueued", s.files_processed, d.enqueued);
    println!("  documents: {}", s.documents);
    println!("  skipped (unsupported): {}", s.skipped);
    println!(
        "  failures: {} (extraction {}, enrichment {}, internal {})",
        s.total_failures(),
        s.extraction_failures,
        s.enrichment_failures,
        s.internal_failures
    );
    match &outcome.projection {
        Some(p) => {
            println!(
                "  graph: {} documents written, {} node merges, {} edge merges",
                p.documents_written, p.nodes_merged, p.edges_merged
            );
            if !p.failures.is_empty() {
                println!("  graph write failures: {}", p.failures.len());
            }
        }
        None => println!("  graph: disabled"),
    }
    println!("  elapsed: {:.2}s", d.elapsed.as_secs_f64());
    println!("ok");
}

/// Describe every file under the root without extracting anything.
pub fn scan(config: &Config) -> Result<Vec<SourceDocument>> {
    let source = PathSource::from_config(&config.source)?;
    Ok(source.documents().collect())
}

/// Run the `scan` command: print the sitemap as JSON on stdout.
pub fn run_scan(config: &Config) -> Result<()> {
    let documents = scan(config)?;
    println!("{}", serde_json::to_string_pretty(&documents)?);
    tracing::info!(files = documents.len(), "scan finished");
    Ok(())
}

/// Library entry point for callers that want the outcome rather than the
/// printed summary.
pub async fn ingest(config: &Config) -> Result<IngestOutcome> {
    let progress: Arc<dyn ProgressReporter> = Arc::new(NoProgress);
    let store = open_graph_store(config).await?;
    let dispatcher = build_dispatcher(config, Arc::clone(&progress))?;
    let result = run_pipeline(config, &dispatcher, store.clone(), progress).await;
    if let Some(store) = &store {
        store.close().await;
    }
    result
}
