//! Graph statistics.
//!
//! Prints node counts per label and edge counts per type for the SQLite
//! graph. Used by `docgraph graph stats` after an ingest to confirm what
//! landed in the store.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::{Config, GraphBackend};
use crate::graph::sqlite::SqliteGraph;
use crate::graph::{EdgeType, NodeLabel};

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStats {
    pub nodes: BTreeMap<String, i64>,
    pub edges: BTreeMap<String, i64>,
}

impl GraphStats {
    pub fn total_nodes(&self) -> i64 {
        self.nodes.values().sum()
    }

    pub fn total_edges(&self) -> i64 {
        self.edges.values().sum()
    }
}

/// Count nodes and edges of the graph at `path`. Labels and types with no
/// rows are reported as zero.
pub async fn collect_stats(path: &Path) -> Result<GraphStats> {
    let store = SqliteGraph::open(path).await?;
    let node_counts = store.node_counts().await?;
    let edge_counts = store.edge_counts().await?;
    store.pool().close().await;

    Ok(GraphStats {
        nodes: NodeLabel::ALL
            .iter()
            .map(|l| (l.to_string(), node_counts.get(l).copied().unwrap_or(0)))
            .collect(),
        edges: EdgeType::ALL
            .iter()
            .map(|e| (e.to_string(), edge_counts.get(e).copied().unwrap_or(0)))
            .collect(),
    })
}

/// Run the `graph stats` command.
pub async fn run_stats(config: &Config) -> Result<()> {
    if config.graph.backend != GraphBackend::Sqlite {
        bail!("graph stats requires the sqlite graph backend");
    }
    let path = &config.graph.path;
    if !path.exists() {
        bail!(
            "no graph database at {} (run `docgraph init` or `docgraph ingest` first)",
            path.display()
        );
    }
    let stats = collect_stats(path).await?;
    let db_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    println!("docgraph graph stats");
    println!("====================");
    println!();
    println!("  Database:  {}", path.display());
    println!("  Size:      {}", format_bytes(db_size));
    println!();
    println!("  {:<16} {:>8}", "NODE LABEL", "COUNT");
    println!("  {}", "-".repeat(25));
    for (label, n) in &stats.nodes {
        println!("  {:<16} {:>8}", label, n);
    }
    println!("  {:<16} {:>8}", "total", stats.total_nodes());
    println!();
    println!("  {:<16} {:>8}", "EDGE TYPE", "COUNT");
    println!("  {}", "-".repeat(25));
    for (edge, n) in &stats.edges {
        println!("  {:<16} {:>8}", edge, n);
    }
    println!("  {:<16} {:>8}", "total", stats.total_edges());
    println!();

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, Properties};

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn stats_report_every_label_and_type() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("graph.sqlite");
        {
            let store = SqliteGraph::open(&path).await.unwrap();
            let mut tx = store.begin().await.unwrap();
            tx.merge_node(NodeLabel::Document, "d1", &Properties::new())
                .await
                .unwrap();
            tx.merge_node(NodeLabel::Client, "Acme", &Properties::new())
                .await
                .unwrap();
            tx.merge_edge(EdgeType::BelongsTo, "d1", "Acme").await.unwrap();
            tx.commit().await.unwrap();
            store.close().await;
        }

        let stats = collect_stats(&path).await.unwrap();
        assert_eq!(stats.nodes.len(), 8);
        assert_eq!(stats.edges.len(), 7);
        assert_eq!(stats.nodes["Client"], 1);
        assert_eq!(stats.nodes["Partner"], 0);
        assert_eq!(stats.edges["BELONGS_TO"], 1);
        assert_eq!(stats.total_nodes(), 2);
    }
}
