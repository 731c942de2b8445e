//! Projection of enriched documents into the property graph.
//!
//! [`plan`] turns one [`EnrichedDocument`] into an ordered list of merges:
//! the Document node first, then its Client / Region / Domain from the path
//! tags, then one node and edge per industry, technology, partner and
//! product. The plan is a pure function of the document, and every
//! operation in it is a merge, so projecting the same document again
//! leaves the graph as it was.
//!
//! [`GraphProjector`] writes each plan in its own transaction. A failed
//! document is recorded in the [`ProjectionReport`] and the remaining
//! documents are still written.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::GraphWriteError;
use crate::graph::{EdgeType, GraphOp, GraphStore, NodeLabel, Properties};
use crate::models::EnrichedDocument;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Merge operations for one document, in write order.
pub fn plan(doc: &EnrichedDocument) -> Vec<GraphOp> {
    let id = doc.id().to_string();
    let mut ops = vec![GraphOp::MergeNode {
        label: NodeLabel::Document,
        key: id.clone(),
        properties: document_properties(doc),
    }];

    let mut link = |edge: EdgeType, name: &str| {
        let label = edge.target();
        let mut properties = Properties::new();
        properties.insert(label.key_property().to_string(), Value::from(name));
        ops.push(GraphOp::MergeNode {
            label,
            key: name.to_string(),
            properties,
        });
        ops.push(GraphOp::MergeEdge {
            edge,
            from_key: id.clone(),
            to_key: name.to_string(),
        });
    };

    let tags = &doc.source.tags;
    link(EdgeType::BelongsTo, &tags.client);
    link(EdgeType::LocatedIn, &tags.region);
    link(EdgeType::PartOf, &tags.domain);

    let enrichment = &doc.enrichment;
    let entities = &enrichment.entities;
    let named = [
        (EdgeType::TaggedAs, &enrichment.industries),
        (EdgeType::Mentions, &entities.technologies),
        (EdgeType::PartneredWith, &entities.partners),
        (EdgeType::Describes, &entities.products),
    ];
    for (edge, names) in named {
        for name in names {
            link(edge, name);
        }
    }

    ops
}

/// Scalar properties written onto the Document node.
fn document_properties(doc: &EnrichedDocument) -> Properties {
    let mut p = Properties::new();
    p.insert("id".into(), Value::from(doc.id()));
    p.insert("filename".into(), Value::from(doc.source.filename.as_str()));
    p.insert("path".into(), Value::from(doc.source.relative_path.as_str()));
    p.insert(
        "language".into(),
        Value::from(doc.enrichment.language.as_str()),
    );
    p.insert("page_count".into(), Value::from(doc.page_count()));
    p.insert("content_length".into(), Value::from(doc.content_length));
    p.insert(
        "summary".into(),
        Value::from(doc.enrichment.summary.as_str()),
    );
    p.insert(
        "ingested_at".into(),
        Value::from(doc.ingested_at.to_rfc3339()),
    );
    p
}

/// A document whose subgraph could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionFailure {
    pub document_id: String,
    pub relative_path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectionReport {
    pub documents_written: u64,
    pub nodes_merged: u64,
    pub edges_merged: u64,
    pub failures: Vec<ProjectionFailure>,
}

/// Counts of merges issued by one successful projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Projected {
    pub nodes: u64,
    pub edges: u64,
}

/// Writes document subgraphs into an injected [`GraphStore`].
pub struct GraphProjector {
    store: Arc<dyn GraphStore>,
    progress: Arc<dyn ProgressReporter>,
}

impl GraphProjector {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Write one document in a single transaction. Nothing is committed
    /// if any merge fails.
    pub async fn project(&self, doc: &EnrichedDocument) -> Result<Projected, GraphWriteError> {
        let mut tx = self.store.begin().await?;
        let mut counts = Projected::default();
        for op in plan(doc) {
            match op {
                GraphOp::MergeNode {
                    label,
                    key,
                    properties,
                } => {
                    tx.merge_node(label, &key, &properties).await?;
                    counts.nodes += 1;
                }
                GraphOp::MergeEdge {
                    edge,
                    from_key,
                    to_key,
                } => {
                    tx.merge_edge(edge, &from_key, &to_key).await?;
                    counts.edges += 1;
                }
            }
        }
        tx.commit().await?;
        Ok(counts)
    }

    /// Project every document, continuing past failures.
    pub async fn project_all(&self, docs: &[EnrichedDocument]) -> ProjectionReport {
        let total = docs.len() as u64;
        let mut report = ProjectionReport::default();

        for (i, doc) in docs.iter().enumerate() {
            match self.project(doc).await {
                Ok(counts) => {
                    report.documents_written += 1;
                    report.nodes_merged += counts.nodes;
                    report.edges_merged += counts.edges;
                }
                Err(e) => {
                    tracing::warn!(
                        document_id = %doc.id(),
                        path = %doc.source.relative_path,
                        store = self.store.name(),
                        "graph write failed: {}",
                        e
                    );
                    report.failures.push(ProjectionFailure {
                        document_id: doc.id().to_string(),
                        relative_path: doc.source.relative_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
            self.progress.report(ProgressEvent::Projecting {
                n: i as u64 + 1,
                total,
            });
        }

        tracing::info!(
            written = report.documents_written,
            failed = report.failures.len(),
            nodes = report.nodes_merged,
            edges = report.edges_merged,
            "graph projection finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraph;
    use crate::models::{Enrichment, InferredTags, SourceDocument};
    use crate::enrich::dedup_names;
    use chrono::Utc;
    use std::path::{Path, PathBuf};

    fn doc(id: &str, relative: &str) -> EnrichedDocument {
        EnrichedDocument {
            source: SourceDocument {
                id: id.to_string(),
                absolute_path: PathBuf::from("/root").join(relative),
                relative_path: relative.to_string(),
                filename: relative.rsplit('/').next().unwrap_or(relative).to_string(),
                extension: "pdf".to_string(),
                tags: InferredTags::from_relative_path(Path::new(relative)),
                size_bytes: 10,
                modified_at: Utc::now(),
                page_count: 1,
            },
            content_length: 42,
            line_count: None,
            content_preview: String::new(),
            overview: String::new(),
            properties: Default::default(),
            enrichment: Enrichment {
                language: "en".to_string(),
                page_count: 1,
                ..Default::default()
            },
            enrichment_error: None,
            ingested_at: Utc::now(),
            extraction_time_secs: 0.0,
        }
    }

    #[test]
    fn plan_covers_tags_and_entities() {
        let mut d = doc("h1", "Finance/US/Acme/report.pdf");
        d.enrichment.industries = dedup_names(["Finance"]);
        d.enrichment.entities.technologies = dedup_names(["Kubernetes", "Azure"]);
        d.enrichment.entities.partners = dedup_names(["Globex"]);

        let ops = plan(&d);
        let edges: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                GraphOp::MergeEdge { edge, to_key, .. } => Some((*edge, to_key.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(
            edges,
            vec![
                (EdgeType::BelongsTo, "Acme"),
                (EdgeType::LocatedIn, "US"),
                (EdgeType::PartOf, "Finance"),
                (EdgeType::TaggedAs, "Finance"),
                (EdgeType::Mentions, "Azure"),
                (EdgeType::Mentions, "Kubernetes"),
                (EdgeType::PartneredWith, "Globex"),
            ]
        );
        assert_eq!(plan(&d), ops);

        match &ops[0] {
            GraphOp::MergeNode {
                label, properties, ..
            } => {
                assert_eq!(*label, NodeLabel::Document);
                for key in [
                    "id",
                    "filename",
                    "path",
                    "language",
                    "page_count",
                    "content_length",
                    "summary",
                    "ingested_at",
                ] {
                    assert!(properties.contains_key(key), "missing {}", key);
                }
            }
            other => panic!("expected Document node first, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn projecting_twice_leaves_the_same_graph() {
        let store = Arc::new(InMemoryGraph::new());
        let projector = GraphProjector::new(store.clone());
        let mut d = doc("h1", "Finance/US/Acme/report.pdf");
        d.enrichment.entities.products = dedup_names(["Ledger"]);

        projector.project(&d).await.unwrap();
        let once = store.snapshot().await.unwrap();
        projector.project(&d).await.unwrap();
        let twice = store.snapshot().await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(once.node_count(), 5);
        assert_eq!(once.edge_count(), 4);
        assert!(once.has_edge(EdgeType::Describes, "h1", "Ledger"));
    }

    #[tokio::test]
    async fn shared_tags_become_one_node() {
        let store = Arc::new(InMemoryGraph::new());
        let projector = GraphProjector::new(store.clone());
        let docs = vec![
            doc("h1", "Finance/US/Acme/a.pdf"),
            doc("h2", "Finance/US/Acme/b.pdf"),
        ];
        let report = projector.project_all(&docs).await;
        assert_eq!(report.documents_written, 2);
        assert!(report.failures.is_empty());

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.keys(NodeLabel::Client), vec!["Acme"]);
        assert_eq!(snap.keys(NodeLabel::Document).len(), 2);
        assert_eq!(snap.edge_count(), 6);
    }

    #[tokio::test]
    async fn failures_are_recorded_per_document() {
        let store = Arc::new(InMemoryGraph::new());
        let projector = GraphProjector::new(store.clone());
        // an empty id is rejected by the store
        let docs = vec![doc("", "bad.pdf"), doc("h2", "good.pdf")];
        let report = projector.project_all(&docs).await;

        assert_eq!(report.documents_written, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].relative_path, "bad.pdf");
        let snap = store.snapshot().await.unwrap();
        assert!(snap.has_node(NodeLabel::Document, "h2"));
        assert_eq!(snap.keys(NodeLabel::Document).len(), 1);
    }
}
