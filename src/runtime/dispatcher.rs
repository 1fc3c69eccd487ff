/// Trigger dispatch: domain event -> runs
///
/// A resource without a graph, or whose graph has no matching trigger, is a
/// silent no-op. Authorization is the caller's job.

use crate::flow::registry::FlowRegistry;
use crate::flow::types::{ResourceId, TriggerKind};
use crate::runtime::engine::{ExecutionEngine, StartedRun};
use serde_json::Value;
use std::sync::Arc;

/// An incoming event that may start runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Usage or door event; fires every trigger node of that kind
    Resource(TriggerKind),
    /// Manual press of one specific button node
    ButtonPressed { node_id: String },
}

impl TriggerEvent {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerEvent::Resource(kind) => *kind,
            TriggerEvent::ButtonPressed { .. } => TriggerKind::ButtonPressed,
        }
    }
}

pub struct TriggerDispatcher {
    registry: Arc<FlowRegistry>,
    engine: Arc<ExecutionEngine>,
}

impl TriggerDispatcher {
    pub fn new(registry: Arc<FlowRegistry>, engine: Arc<ExecutionEngine>) -> Self {
        Self { registry, engine }
    }

    /// Start one run per trigger node matching `event`
    pub fn dispatch(&self, resource_id: ResourceId, event: &TriggerEvent, context: Value) -> Vec<StartedRun> {
        let Some(graph) = self.registry.get(resource_id) else {
            tracing::debug!("No flow for resource {}, ignoring {:?}", resource_id, event);
            return Vec::new();
        };

        let trigger_ids: Vec<String> = graph
            .triggers(event.kind())
            .into_iter()
            .filter(|node| match event {
                TriggerEvent::ButtonPressed { node_id } => &node.id == node_id,
                TriggerEvent::Resource(_) => true,
            })
            .map(|node| node.id.clone())
            .collect();

        if trigger_ids.is_empty() {
            tracing::debug!(
                "No {:?} trigger in flow of resource {}",
                event.kind(),
                resource_id
            );
            return Vec::new();
        }

        tracing::info!(
            "📨 {:?} on resource {} matched {} trigger(s)",
            event.kind(),
            resource_id,
            trigger_ids.len()
        );

        trigger_ids
            .iter()
            .map(|trigger_id| self.engine.start_run(Arc::clone(&graph), trigger_id, context.clone()))
            .collect()
    }

    /// Press a button node; `None` when the resource has no such button
    pub fn press_button(&self, resource_id: ResourceId, node_id: &str, context: Value) -> Option<StartedRun> {
        let event = TriggerEvent::ButtonPressed {
            node_id: node_id.to_string(),
        };
        self.dispatch(resource_id, &event, context).into_iter().next()
    }
}
