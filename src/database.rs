/// SQLite connection setup and schema
///
/// One database file holds the stored graphs and the flow logs. The schema
/// is created with `IF NOT EXISTS` so startup can run it every time.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Open (and create if missing) the flows database under `data_dir`
pub async fn open_pool(data_dir: &str, file_name: &str) -> Result<SqlitePool> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory '{}'", data_dir))?;
    let db_path = Path::new(data_dir).join(file_name);

    tracing::info!("🗄️ Opening flows database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database, used by tests and throwaway runs
pub async fn open_memory_pool() -> Result<SqlitePool> {
    // A single connection keeps every query on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_flows (
            resource_id INTEGER PRIMARY KEY,
            catalog_version INTEGER NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_flow_nodes (
            resource_id INTEGER NOT NULL,
            id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            type TEXT NOT NULL,
            data JSON,
            position_x REAL NOT NULL DEFAULT 0,
            position_y REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (resource_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_flow_edges (
            resource_id INTEGER NOT NULL,
            id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            source_handle TEXT,
            target_handle TEXT,
            PRIMARY KEY (resource_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_flow_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource_id INTEGER NOT NULL,
            flow_run_id TEXT NOT NULL,
            node_id TEXT,
            type TEXT NOT NULL,
            payload JSON,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_resource_flow_logs_resource
        ON resource_flow_logs(resource_id, id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_resource_flow_logs_run
        ON resource_flow_logs(flow_run_id, id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_resource_flow_logs_created
        ON resource_flow_logs(created_at)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
