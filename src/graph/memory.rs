//! In-process graph store.
//!
//! Transactions buffer their operations and apply them under one write lock
//! on commit, so readers never observe half a document.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{EdgeType, GraphOp, GraphSnapshot, GraphStore, GraphTransaction, NodeLabel, Properties};
use crate::error::GraphWriteError;

#[derive(Debug, Default)]
pub struct InMemoryGraph {
    graph: RwLock<GraphSnapshot>,
    closed: AtomicBool,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphSnapshot> {
        self.graph.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphSnapshot> {
        self.graph.write().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_open(&self) -> Result<(), GraphWriteError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GraphWriteError::Unavailable(
                "in-memory graph is closed".to_string(),
            ));
        }
        Ok(())
    }
}

struct MemoryTransaction<'a> {
    store: &'a InMemoryGraph,
    ops: Vec<GraphOp>,
}

#[async_trait]
impl GraphTransaction for MemoryTransaction<'_> {
    async fn merge_node(
        &mut self,
        label: NodeLabel,
        key: &str,
        properties: &Properties,
    ) -> Result<(), GraphWriteError> {
        if key.is_empty() {
            return Err(GraphWriteError::Rejected(format!(
                "{} node with empty key",
                label
            )));
        }
        self.ops.push(GraphOp::MergeNode {
            label,
            key: key.to_string(),
            properties: properties.clone(),
        });
        Ok(())
    }

    async fn merge_edge(
        &mut self,
        edge: EdgeType,
        from_key: &str,
        to_key: &str,
    ) -> Result<(), GraphWriteError> {
        if from_key.is_empty() || to_key.is_empty() {
            return Err(GraphWriteError::Rejected(format!(
                "{} edge with empty endpoint",
                edge
            )));
        }
        self.ops.push(GraphOp::MergeEdge {
            edge,
            from_key: from_key.to_string(),
            to_key: to_key.to_string(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), GraphWriteError> {
        self.store.ensure_open()?;
        let mut graph = self.store.write();
        for op in &self.ops {
            graph.apply(op);
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    fn name(&self) -> &str {
        "memory"
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn GraphTransaction + 'a>, GraphWriteError> {
        self.ensure_open()?;
        Ok(Box::new(MemoryTransaction {
            store: self,
            ops: Vec::new(),
        }))
    }

    async fn snapshot(&self) -> Result<GraphSnapshot, GraphWriteError> {
        Ok(self.read().clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(name: &str) -> Properties {
        let mut p = Properties::new();
        p.insert("name".into(), name.into());
        p
    }

    #[tokio::test]
    async fn uncommitted_transaction_writes_nothing() {
        let store = InMemoryGraph::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.merge_node(NodeLabel::Client, "Acme", &props("Acme"))
                .await
                .unwrap();
        }
        assert_eq!(store.snapshot().await.unwrap().node_count(), 0);
    }

    #[tokio::test]
    async fn repeated_merges_are_idempotent() {
        let store = InMemoryGraph::new();
        for _ in 0..2 {
            let mut tx = store.begin().await.unwrap();
            tx.merge_node(NodeLabel::Document, "d1", &Properties::new())
                .await
                .unwrap();
            tx.merge_node(NodeLabel::Client, "Acme", &props("Acme"))
                .await
                .unwrap();
            tx.merge_edge(EdgeType::BelongsTo, "d1", "Acme").await.unwrap();
            tx.commit().await.unwrap();
        }
        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.node_count(), 2);
        assert_eq!(snap.edge_count(), 1);
    }

    #[tokio::test]
    async fn closed_store_is_unavailable() {
        let store = InMemoryGraph::new();
        store.close().await;
        let err = store.begin().await.err().unwrap();
        assert!(matches!(err, GraphWriteError::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_keys_are_rejected() {
        let store = InMemoryGraph::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .merge_node(NodeLabel::Region, "", &Properties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphWriteError::Rejected(_)));
    }
}
