/// Graph validation and executable graph construction
///
/// Turns the stored node/edge records of one resource into an
/// [`ExecutableGraph`]: a petgraph `DiGraph` plus an adjacency map from node
/// id to its targets grouped by output handle. Building is pure and collects
/// every structural error rather than stopping at the first.

use crate::error::GraphError;
use crate::flow::catalog::HandleIssue;
use crate::flow::types::{NodeType, ResourceId, StoredEdge, StoredNode, TriggerKind};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A node ready for execution
#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: String,
    pub node_type: NodeType,
    pub data: Value,
}

/// A validated connection between two ports
#[derive(Debug, Clone)]
pub struct FlowLink {
    pub edge_id: String,
    pub source_handle: &'static str,
    pub target_handle: &'static str,
}

/// Read-only, validated graph of one resource
///
/// Runs hold it behind an `Arc`, so a saved edit only affects runs that
/// start afterwards.
#[derive(Debug)]
pub struct ExecutableGraph {
    resource_id: ResourceId,
    graph: DiGraph<FlowNode, FlowLink>,
    node_id_to_index: HashMap<String, NodeIndex>,
    /// node id -> output handle -> target node ids, in edge order
    adjacency: HashMap<String, HashMap<&'static str, Vec<String>>>,
}

impl ExecutableGraph {
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    pub fn node(&self, node_id: &str) -> Option<&FlowNode> {
        self.node_id_to_index
            .get(node_id)
            .map(|index| &self.graph[*index])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.graph.node_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Target node ids connected to `handle` of `node_id`
    pub fn successors(&self, node_id: &str, handle: &str) -> &[String] {
        self.adjacency
            .get(node_id)
            .and_then(|by_handle| by_handle.get(handle))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Output handles of `node_id` that have at least one edge
    pub fn connected_handles(&self, node_id: &str) -> Vec<&'static str> {
        let mut handles: Vec<_> = self
            .adjacency
            .get(node_id)
            .map(|by_handle| by_handle.keys().copied().collect())
            .unwrap_or_default();
        handles.sort_unstable();
        handles
    }

    /// Trigger nodes firing on `kind`
    pub fn triggers(&self, kind: TriggerKind) -> Vec<&FlowNode> {
        self.graph
            .node_weights()
            .filter(|node| node.node_type.trigger_kind() == Some(kind))
            .collect()
    }

    /// Every node reachable from `node_id` along directed edges, excluding itself
    pub fn reachable_from(&self, node_id: &str) -> HashSet<String> {
        let Some(start) = self.node_id_to_index.get(node_id) else {
            return HashSet::new();
        };

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, *start);
        while let Some(index) = bfs.next(&self.graph) {
            if index != *start {
                reachable.insert(self.graph[index].id.clone());
            }
        }
        reachable
    }
}

/// Validate the records of one resource and build its executable graph
pub fn build_graph(
    resource_id: ResourceId,
    nodes: &[StoredNode],
    edges: &[StoredEdge],
) -> Result<ExecutableGraph, Vec<GraphError>> {
    tracing::debug!(
        "🏗️ Building flow graph for resource {} ({} nodes, {} edges)",
        resource_id,
        nodes.len(),
        edges.len()
    );

    let mut errors = Vec::new();
    let mut graph = DiGraph::new();
    let mut node_id_to_index = HashMap::new();

    for node in nodes {
        if node_id_to_index.contains_key(&node.id) {
            errors.push(GraphError::DuplicateNode {
                node_id: node.id.clone(),
            });
            continue;
        }
        let node_type = match node.node_type.parse::<NodeType>() {
            Ok(node_type) => node_type,
            Err(_) => {
                errors.push(GraphError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                });
                continue;
            }
        };
        let index = graph.add_node(FlowNode {
            id: node.id.clone(),
            node_type,
            data: node.data.clone(),
        });
        node_id_to_index.insert(node.id.clone(), index);
    }

    let known_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut edge_ids = HashSet::new();
    let mut adjacency: HashMap<String, HashMap<&'static str, Vec<String>>> = HashMap::new();

    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            errors.push(GraphError::DuplicateEdge {
                edge_id: edge.id.clone(),
            });
            continue;
        }

        let mut endpoints_missing = false;
        for endpoint in [&edge.source, &edge.target] {
            if !known_ids.contains(endpoint.as_str()) {
                errors.push(GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
                endpoints_missing = true;
            }
        }
        if endpoints_missing {
            continue;
        }

        // Nodes with an unknown type were already reported
        let (Some(&from), Some(&to)) = (
            node_id_to_index.get(&edge.source),
            node_id_to_index.get(&edge.target),
        ) else {
            continue;
        };

        let source_type = graph[from].node_type;
        let target_type = graph[to].node_type;
        let source_handle = source_type.resolve_output(edge.source_handle.as_deref());
        let target_handle = target_type.resolve_input(edge.target_handle.as_deref());

        let (source_handle, target_handle) = match (source_handle, target_handle) {
            (Ok(s), Ok(t)) => (s, t),
            (s, t) => {
                if let Err(issue) = s {
                    errors.push(handle_error(edge, &edge.source, issue));
                }
                if let Err(issue) = t {
                    errors.push(handle_error(edge, &edge.target, issue));
                }
                continue;
            }
        };

        graph.add_edge(
            from,
            to,
            FlowLink {
                edge_id: edge.id.clone(),
                source_handle,
                target_handle,
            },
        );
        adjacency
            .entry(edge.source.clone())
            .or_default()
            .entry(source_handle)
            .or_default()
            .push(edge.target.clone());
        tracing::debug!(
            "  🔗 Added edge '{}': '{}'[{}] → '{}'[{}]",
            edge.id,
            edge.source,
            source_handle,
            edge.target,
            target_handle
        );
    }

    errors.extend(detect_reachable_cycles(&graph));

    if !errors.is_empty() {
        tracing::warn!(
            "❌ Flow graph for resource {} rejected with {} error(s)",
            resource_id,
            errors.len()
        );
        return Err(errors);
    }

    Ok(ExecutableGraph {
        resource_id,
        graph,
        node_id_to_index,
        adjacency,
    })
}

fn handle_error(edge: &StoredEdge, node_id: &str, issue: HandleIssue) -> GraphError {
    match issue {
        HandleIssue::Unknown(handle) => GraphError::UnknownHandle {
            edge_id: edge.id.clone(),
            node_id: node_id.to_string(),
            handle,
        },
        HandleIssue::Ambiguous => GraphError::AmbiguousHandle {
            edge_id: edge.id.clone(),
            node_id: node_id.to_string(),
        },
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Depth-first search from every source node with an on-stack guard
///
/// Cycles not reachable from any trigger can never execute and are ignored.
fn detect_reachable_cycles(graph: &DiGraph<FlowNode, FlowLink>) -> Vec<GraphError> {
    let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
    let mut errors = Vec::new();

    for start in graph.node_indices() {
        if graph[start].node_type.trigger_kind().is_none() || marks.contains_key(&start) {
            continue;
        }

        // Explicit stack of (node, pending successors) keeps deep graphs off the call stack
        let mut stack = vec![(start, graph.neighbors_directed(start, Direction::Outgoing).detach())];
        marks.insert(start, Mark::OnStack);

        while let Some((current, walker)) = stack.last_mut() {
            let current = *current;
            match walker.next_node(graph) {
                Some(next) => match marks.get(&next) {
                    Some(Mark::OnStack) => errors.push(GraphError::Cycle {
                        trigger_id: graph[start].id.clone(),
                        node_id: graph[next].id.clone(),
                    }),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::OnStack);
                        stack.push((next, graph.neighbors_directed(next, Direction::Outgoing).detach()));
                    }
                },
                None => {
                    marks.insert(current, Mark::Done);
                    stack.pop();
                }
            }
        }
    }

    errors
}
