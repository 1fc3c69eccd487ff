/// SQLite persistence for resource flow graphs
///
/// Nodes and edges are stored as rows per resource; saving replaces the
/// whole set in one transaction. Records are written exactly as given, the
/// engine never rewrites them on its own.

use crate::flow::types::{Position, ResourceId, StoredEdge, StoredFlow, StoredNode};
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::BTreeMap;

/// SQLite-based flow storage
#[derive(Debug, Clone)]
pub struct FlowStorage {
    pool: SqlitePool,
}

impl FlowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the stored graph of a resource
    pub async fn save_flow(&self, resource_id: ResourceId, flow: &StoredFlow) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM resource_flow_nodes WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM resource_flow_edges WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO resource_flows (resource_id, catalog_version, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(resource_id) DO UPDATE SET
                catalog_version = excluded.catalog_version,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(resource_id)
        .bind(i64::from(flow.catalog_version))
        .execute(&mut *tx)
        .await?;

        for (ordinal, node) in flow.nodes.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO resource_flow_nodes
                    (resource_id, id, ordinal, type, data, position_x, position_y)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(resource_id)
            .bind(&node.id)
            .bind(ordinal as i64)
            .bind(&node.node_type)
            .bind(serde_json::to_string(&node.data)?)
            .bind(node.position.x)
            .bind(node.position.y)
            .execute(&mut *tx)
            .await?;
        }

        for (ordinal, edge) in flow.edges.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO resource_flow_edges
                    (resource_id, id, ordinal, source, target, source_handle, target_handle)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(resource_id)
            .bind(&edge.id)
            .bind(ordinal as i64)
            .bind(&edge.source)
            .bind(&edge.target)
            .bind(&edge.source_handle)
            .bind(&edge.target_handle)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "💾 Saved flow for resource {} ({} nodes, {} edges)",
            resource_id,
            flow.nodes.len(),
            flow.edges.len()
        );
        Ok(())
    }

    /// Load the stored graph of a resource, `None` if it never saved one
    pub async fn load_flow(&self, resource_id: ResourceId) -> Result<Option<StoredFlow>> {
        let header = sqlx::query("SELECT catalog_version FROM resource_flows WHERE resource_id = ?")
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        let catalog_version: i64 = header.get("catalog_version");

        let nodes = self.load_nodes(resource_id).await?;
        let edges = self.load_edges(resource_id).await?;

        Ok(Some(StoredFlow {
            catalog_version: u32::try_from(catalog_version)?,
            nodes,
            edges,
        }))
    }

    /// Load every stored graph, keyed by resource
    pub async fn load_all(&self) -> Result<BTreeMap<ResourceId, StoredFlow>> {
        let rows = sqlx::query("SELECT resource_id FROM resource_flows ORDER BY resource_id")
            .fetch_all(&self.pool)
            .await?;

        let mut flows = BTreeMap::new();
        for row in rows {
            let resource_id: ResourceId = row.get("resource_id");
            if let Some(flow) = self.load_flow(resource_id).await? {
                flows.insert(resource_id, flow);
            }
        }
        Ok(flows)
    }

    /// Delete the graph of a resource
    pub async fn delete_flow(&self, resource_id: ResourceId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        for table in ["resource_flow_nodes", "resource_flow_edges"] {
            sqlx::query(&format!("DELETE FROM {} WHERE resource_id = ?", table))
                .bind(resource_id)
                .execute(&mut *tx)
                .await?;
        }
        let result = sqlx::query("DELETE FROM resource_flows WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_nodes(&self, resource_id: ResourceId) -> Result<Vec<StoredNode>> {
        let rows = sqlx::query(
            r#"
            SELECT id, type, data, position_x, position_y
            FROM resource_flow_nodes
            WHERE resource_id = ?
            ORDER BY ordinal
            "#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let data: Option<String> = row.get("data");
            nodes.push(StoredNode {
                id: row.get("id"),
                node_type: row.get("type"),
                data: match data {
                    Some(json) => serde_json::from_str(&json)?,
                    None => serde_json::Value::Null,
                },
                position: Position {
                    x: row.get("position_x"),
                    y: row.get("position_y"),
                },
            });
        }
        Ok(nodes)
    }

    async fn load_edges(&self, resource_id: ResourceId) -> Result<Vec<StoredEdge>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, target, source_handle, target_handle
            FROM resource_flow_edges
            WHERE resource_id = ?
            ORDER BY ordinal
            "#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredEdge {
                id: row.get("id"),
                source: row.get("source"),
                target: row.get("target"),
                source_handle: row.get("source_handle"),
                target_handle: row.get("target_handle"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_pool;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_flow() -> StoredFlow {
        StoredFlow {
            catalog_version: 3,
            nodes: vec![
                StoredNode {
                    id: "t".into(),
                    node_type: "input.button".into(),
                    data: json!({ "label": "Fan" }),
                    position: Position { x: 10.0, y: 20.0 },
                },
                StoredNode {
                    id: "h".into(),
                    node_type: "output.http.sendRequest".into(),
                    data: json!({ "url": "http://example.com", "method": "GET" }),
                    position: Position { x: 200.0, y: 20.0 },
                },
            ],
            edges: vec![StoredEdge {
                id: "e1".into(),
                source: "t".into(),
                target: "h".into(),
                source_handle: Some("output".into()),
                target_handle: None,
            }],
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_records_unchanged() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        storage.save_flow(4, &sample_flow()).await.unwrap();

        assert_eq!(storage.load_flow(4).await.unwrap(), Some(sample_flow()));
        assert_eq!(storage.load_flow(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fractional_positions_survive_a_round_trip() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        let node: StoredNode = serde_json::from_str(
            r#"{"id":"n","type":"input.button","data":{},"position":{"x":120.5,"y":48.25}}"#,
        )
        .unwrap();
        let flow = StoredFlow {
            catalog_version: 3,
            nodes: vec![node],
            edges: vec![],
        };
        storage.save_flow(6, &flow).await.unwrap();

        let loaded = storage.load_flow(6).await.unwrap().unwrap();
        assert_eq!(loaded.nodes[0].position, Position { x: 120.5, y: 48.25 });
    }

    #[tokio::test]
    async fn saving_replaces_previous_graph() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        storage.save_flow(1, &sample_flow()).await.unwrap();

        let mut smaller = sample_flow();
        smaller.nodes.truncate(1);
        smaller.edges.clear();
        storage.save_flow(1, &smaller).await.unwrap();

        let loaded = storage.load_flow(1).await.unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 1);
        assert!(loaded.edges.is_empty());
    }

    #[tokio::test]
    async fn load_all_and_delete() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        storage.save_flow(1, &sample_flow()).await.unwrap();
        storage.save_flow(2, &sample_flow()).await.unwrap();

        let all = storage.load_all().await.unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 2]);

        assert!(storage.delete_flow(1).await.unwrap());
        assert!(!storage.delete_flow(1).await.unwrap());
        assert_eq!(storage.load_flow(1).await.unwrap(), None);
    }
}
