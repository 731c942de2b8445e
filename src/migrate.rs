use anyhow::Result;
use sqlx::SqlitePool;

/// Create the graph tables. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per (label, key); properties is a JSON object.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_nodes (
            label TEXT NOT NULL,
            key TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (label, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_edges (
            edge_type TEXT NOT NULL,
            from_key TEXT NOT NULL,
            to_key TEXT NOT NULL,
            PRIMARY KEY (edge_type, from_key, to_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_from ON graph_edges(from_key)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges(to_key)")
        .execute(pool)
        .await?;

    Ok(())
}
