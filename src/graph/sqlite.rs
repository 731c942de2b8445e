//! SQLite-backed graph store.
//!
//! Nodes live in `graph_nodes (label, key, properties)` and edges in
//! `graph_edges (edge_type, from_key, to_key)`, both with the identity
//! columns as primary key. Merges are `INSERT .. ON CONFLICT`: a repeated
//! node has its JSON properties patched, a repeated edge is ignored.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::{EdgeType, GraphSnapshot, GraphStore, GraphTransaction, NodeLabel, Properties};
use crate::error::GraphWriteError;
use crate::{db, migrate};

pub struct SqliteGraph {
    pool: SqlitePool,
}

impl SqliteGraph {
    /// Open the database at `path` and make sure the graph tables exist.
    pub async fn open(path: &Path) -> Result<Self, GraphWriteError> {
        let pool = db::connect(path)
            .await
            .map_err(|e| GraphWriteError::Unavailable(format!("{}: {:#}", path.display(), e)))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, GraphWriteError> {
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| GraphWriteError::Unavailable(format!("{:#}", e)))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Node counts per label, computed in SQL.
    pub async fn node_counts(&self) -> Result<BTreeMap<NodeLabel, i64>, GraphWriteError> {
        let rows = sqlx::query("SELECT label, COUNT(*) AS n FROM graph_nodes GROUP BY label")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let label: String = row.get("label");
            counts.insert(label.parse::<NodeLabel>()?, row.get::<i64, _>("n"));
        }
        Ok(counts)
    }

    /// Edge counts per type, computed in SQL.
    pub async fn edge_counts(&self) -> Result<BTreeMap<EdgeType, i64>, GraphWriteError> {
        let rows =
            sqlx::query("SELECT edge_type, COUNT(*) AS n FROM graph_edges GROUP BY edge_type")
                .fetch_all(&self.pool)
                .await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let edge: String = row.get("edge_type");
            counts.insert(edge.parse::<EdgeType>()?, row.get::<i64, _>("n"));
        }
        Ok(counts)
    }
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl GraphTransaction for SqliteTransaction {
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
        let json = serde_json::to_string(properties)?;
        sqlx::query(
            r#"
            INSERT INTO graph_nodes (label, key, properties)
            VALUES (?, ?, json(?))
            ON CONFLICT(label, key) DO UPDATE SET
                properties = json_patch(graph_nodes.properties, excluded.properties)
            "#,
        )
        .bind(label.as_str())
        .bind(key)
        .bind(json)
        .execute(&mut *self.tx)
        .await?;
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
        sqlx::query(
            "INSERT INTO graph_edges (edge_type, from_key, to_key) VALUES (?, ?, ?) \
             ON CONFLICT DO NOTHING",
        )
        .bind(edge.as_str())
        .bind(from_key)
        .bind(to_key)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), GraphWriteError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SqliteGraph {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn GraphTransaction + 'a>, GraphWriteError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn snapshot(&self) -> Result<GraphSnapshot, GraphWriteError> {
        let mut snap = GraphSnapshot::default();

        let nodes = sqlx::query("SELECT label, key, properties FROM graph_nodes")
            .fetch_all(&self.pool)
            .await?;
        for row in nodes {
            let label: String = row.get("label");
            let properties: String = row.get("properties");
            snap.nodes.insert(
                (label.parse()?, row.get("key")),
                serde_json::from_str(&properties)?,
            );
        }

        let edges = sqlx::query("SELECT edge_type, from_key, to_key FROM graph_edges")
            .fetch_all(&self.pool)
            .await?;
        for row in edges {
            let edge: String = row.get("edge_type");
            snap.edges
                .insert((edge.parse()?, row.get("from_key"), row.get("to_key")));
        }

        Ok(snap)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
