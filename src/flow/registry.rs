/// Hot-reload registry of validated flow graphs
///
/// Uses ArcSwap so lookups from the dispatcher never block. Every update
/// swaps the whole map; runs keep the `Arc<ExecutableGraph>` they started
/// with, so an edit never changes a run that is already in flight.
///
/// Writers for one resource are serialized from persist to activate, so the
/// active graph always matches the last committed one.

use crate::error::{GraphError, SaveError};
use crate::flow::catalog::{validate_node_data, NodeDataIssue};
use crate::flow::migration::migrate;
use crate::flow::storage::FlowStorage;
use crate::flow::types::{ResourceId, StoredFlow};
use crate::flow::validation::{build_graph, ExecutableGraph};
use anyhow::Result;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock-free map of resource id to its active graph
#[derive(Debug)]
pub struct FlowRegistry {
    graphs: ArcSwap<HashMap<ResourceId, Arc<ExecutableGraph>>>,
    storage: FlowStorage,
    write_locks: DashMap<ResourceId, Arc<Mutex<()>>>,
}

impl FlowRegistry {
    pub fn new(storage: FlowStorage) -> Self {
        Self {
            graphs: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
            write_locks: DashMap::new(),
        }
    }

    async fn lock_resource(&self, resource_id: ResourceId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.write_locks.entry(resource_id).or_default().value());
        lock.lock_owned().await
    }

    /// Load and compile every stored graph
    ///
    /// A graph that no longer validates is skipped with a warning rather than
    /// failing startup; its resource simply has no active automation.
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_all().await?;
        let mut compiled = HashMap::new();

        for (resource_id, flow) in stored {
            match compile(resource_id, flow) {
                Ok(graph) => {
                    compiled.insert(resource_id, Arc::new(graph));
                }
                Err(errors) => {
                    tracing::warn!(
                        "⚠️ Stored flow for resource {} is invalid and stays inactive: {}",
                        resource_id,
                        describe(&errors)
                    );
                }
            }
        }

        self.graphs.store(Arc::new(compiled));
        tracing::info!(
            "Initialized flow registry with {} resource graphs",
            self.graphs.load().len()
        );
        Ok(())
    }

    /// Re-read one resource from storage and swap it in (or out)
    pub async fn reload(&self, resource_id: ResourceId) -> Result<()> {
        let _guard = self.lock_resource(resource_id).await;
        let Some(flow) = self.storage.load_flow(resource_id).await? else {
            self.remove(resource_id);
            return Ok(());
        };

        match compile(resource_id, flow) {
            Ok(graph) => {
                self.insert(resource_id, Arc::new(graph));
                tracing::info!("Hot-reloaded flow for resource {}", resource_id);
                Ok(())
            }
            Err(errors) => {
                self.remove(resource_id);
                Err(anyhow::anyhow!(
                    "Stored flow for resource {} is invalid: {}",
                    resource_id,
                    describe(&errors)
                ))
            }
        }
    }

    /// Migrate, validate, persist and activate a flow
    ///
    /// Structural errors reject the save and nothing is written. Node data
    /// issues are returned alongside the stored flow; they surface at run
    /// time as failed nodes.
    pub async fn save(
        &self,
        resource_id: ResourceId,
        flow: StoredFlow,
    ) -> Result<SavedFlow, SaveError> {
        let flow = migrate(flow)?;
        let graph = build_graph(resource_id, &flow.nodes, &flow.edges).map_err(SaveError::Invalid)?;

        let issues: Vec<NodeDataIssue> = graph
            .nodes()
            .flat_map(|node| validate_node_data(&node.id, node.node_type, &node.data))
            .collect();

        let guard = self.lock_resource(resource_id).await;
        self.storage.save_flow(resource_id, &flow).await?;
        self.insert(resource_id, Arc::new(graph));
        drop(guard);

        tracing::info!(
            "✅ Saved flow for resource {} ({} nodes, {} data issues)",
            resource_id,
            flow.nodes.len(),
            issues.len()
        );
        Ok(SavedFlow { flow, issues })
    }

    /// Stored flow of a resource, migrated to the current catalog
    pub async fn load(&self, resource_id: ResourceId) -> Result<Option<StoredFlow>> {
        match self.storage.load_flow(resource_id).await? {
            Some(flow) => Ok(Some(migrate(flow)?)),
            None => Ok(None),
        }
    }

    /// Delete the stored flow and deactivate it; `false` if there was none
    pub async fn delete(&self, resource_id: ResourceId) -> Result<bool> {
        let _guard = self.lock_resource(resource_id).await;
        let deleted = self.storage.delete_flow(resource_id).await?;
        self.remove(resource_id);
        Ok(deleted)
    }

    /// Activate an already validated graph
    pub fn insert(&self, resource_id: ResourceId, graph: Arc<ExecutableGraph>) {
        self.graphs.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(resource_id, Arc::clone(&graph));
            next
        });
    }

    /// Active graph of a resource (lock-free read)
    pub fn get(&self, resource_id: ResourceId) -> Option<Arc<ExecutableGraph>> {
        self.graphs.load().get(&resource_id).cloned()
    }

    pub fn remove(&self, resource_id: ResourceId) {
        let mut removed = false;
        self.graphs.rcu(|current| {
            let mut next = HashMap::clone(current);
            removed = next.remove(&resource_id).is_some();
            next
        });
        if removed {
            tracing::info!("Removed flow for resource {} from registry", resource_id);
        }
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.graphs.load().keys().copied().collect()
    }
}

/// Result of a successful save
#[derive(Debug)]
pub struct SavedFlow {
    pub flow: StoredFlow,
    pub issues: Vec<NodeDataIssue>,
}

/// Migrate and validate a stored flow
pub fn compile(resource_id: ResourceId, flow: StoredFlow) -> Result<ExecutableGraph, Vec<String>> {
    let flow = migrate(flow).map_err(|e| vec![e.to_string()])?;
    build_graph(resource_id, &flow.nodes, &flow.edges)
        .map_err(|errors| errors.iter().map(GraphError::to_string).collect())
}

fn describe(errors: &[String]) -> String {
    errors.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_pool;
    use crate::flow::types::{Position, StoredEdge, StoredNode};
    use serde_json::Value;

    fn flow(edges: Vec<StoredEdge>) -> StoredFlow {
        StoredFlow {
            catalog_version: 3,
            nodes: vec![
                StoredNode {
                    id: "t".into(),
                    node_type: "input.button".into(),
                    data: Value::Null,
                    position: Position::default(),
                },
                StoredNode {
                    id: "w".into(),
                    node_type: "processing.wait".into(),
                    data: Value::Null,
                    position: Position::default(),
                },
            ],
            edges,
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> StoredEdge {
        StoredEdge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    #[tokio::test]
    async fn reload_swaps_graph_without_touching_held_arcs() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        let registry = FlowRegistry::new(storage.clone());

        storage.save_flow(1, &flow(vec![])).await.unwrap();
        registry.init_from_storage().await.unwrap();
        let before = registry.get(1).unwrap();
        assert!(before.successors("t", "output").is_empty());

        storage.save_flow(1, &flow(vec![edge("e", "t", "w")])).await.unwrap();
        registry.reload(1).await.unwrap();

        // The held graph is the old version; new lookups see the edit
        assert!(before.successors("t", "output").is_empty());
        assert_eq!(registry.get(1).unwrap().successors("t", "output").len(), 1);
    }

    #[tokio::test]
    async fn invalid_stored_graph_stays_inactive() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        storage.save_flow(2, &flow(vec![edge("e", "t", "ghost")])).await.unwrap();

        let registry = FlowRegistry::new(storage);
        registry.init_from_storage().await.unwrap();

        assert!(registry.get(2).is_none());
        assert!(registry.reload(2).await.is_err());
    }

    #[tokio::test]
    async fn save_rejects_structural_errors_without_persisting() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        let registry = FlowRegistry::new(storage.clone());

        let result = registry.save(5, flow(vec![edge("e", "w", "t")])).await;

        assert!(matches!(result, Err(SaveError::Invalid(errors)) if errors.len() == 1));
        assert_eq!(storage.load_flow(5).await.unwrap(), None);
        assert!(registry.get(5).is_none());
    }

    #[tokio::test]
    async fn save_activates_graph_and_reports_data_issues() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        let registry = FlowRegistry::new(storage);

        let saved = registry.save(6, flow(vec![edge("e", "t", "w")])).await.unwrap();

        // The wait node has no duration or unit
        assert_eq!(saved.issues.len(), 2);
        assert!(saved.issues.iter().all(|i| i.node_id == "w"));
        assert!(registry.get(6).is_some());
        assert_eq!(registry.load(6).await.unwrap(), Some(saved.flow));
    }

    fn waits(count: usize) -> StoredFlow {
        let mut nodes = flow(vec![]).nodes;
        nodes.truncate(1);
        nodes.extend((0..count).map(|i| StoredNode {
            id: format!("w{}", i),
            node_type: "processing.wait".into(),
            data: Value::Null,
            position: Position::default(),
        }));
        StoredFlow {
            catalog_version: 3,
            nodes,
            edges: vec![],
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_leave_registry_matching_storage() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        let registry = Arc::new(FlowRegistry::new(storage.clone()));

        for round in 0..10 {
            let mut writers = tokio::task::JoinSet::new();
            for count in 0..8 {
                let registry = Arc::clone(&registry);
                writers.spawn(async move {
                    if count == 5 && round % 3 == 0 {
                        registry.delete(7).await.map(|_| ())
                    } else {
                        registry.save(7, waits(count)).await.map(|_| ()).map_err(Into::into)
                    }
                });
            }
            while let Some(joined) = writers.join_next().await {
                joined.unwrap().unwrap();
            }

            let stored = storage.load_flow(7).await.unwrap();
            let active = registry.get(7);
            assert_eq!(
                active.map(|graph| graph.node_count()),
                stored.map(|flow| flow.nodes.len()),
                "round {}",
                round
            );
        }
    }

    #[tokio::test]
    async fn reload_of_deleted_flow_removes_it() {
        let storage = FlowStorage::new(open_memory_pool().await.unwrap());
        storage.save_flow(3, &flow(vec![])).await.unwrap();
        let registry = FlowRegistry::new(storage.clone());
        registry.init_from_storage().await.unwrap();
        assert_eq!(registry.resource_ids(), vec![3]);

        storage.delete_flow(3).await.unwrap();
        registry.reload(3).await.unwrap();
        assert!(registry.get(3).is_none());
    }
}
