/// Flow execution engine
///
/// Each run is a tokio task. Every node executes in its own task inside a
/// `JoinSet`; when a node finishes, tasks for its successors on the chosen
/// output handle are spawned. The set doubles as the run's wait-group:
/// `flow.completed` is emitted once it drains. Branches never join, so a
/// node reachable along two paths runs once per path.

use crate::error::NodeError;
use crate::flow::catalog::HANDLE_OUTPUT;
use crate::flow::types::ResourceId;
use crate::flow::validation::ExecutableGraph;
use crate::logs::sink::LogSink;
use crate::logs::types::{LogType, NewLogEntry};
use crate::runtime::executor::{NodeContext, NodeExecutor};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// What a finished run did, in completion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub flow_run_id: String,
    pub status: RunStatus,
    pub completed_nodes: Vec<String>,
    pub failed_nodes: Vec<String>,
}

/// A run that has been spawned
#[derive(Debug)]
pub struct StartedRun {
    pub flow_run_id: String,
    pub trigger_node_id: String,
    pub handle: JoinHandle<RunSummary>,
}

/// Result of one node task
struct NodeStep {
    node_id: String,
    failed: bool,
    next: Vec<String>,
    output: Value,
}

/// Shared state of one run, cloned into each node task
#[derive(Clone)]
struct RunContext {
    flow_run_id: String,
    graph: Arc<ExecutableGraph>,
}

impl RunContext {
    fn resource_id(&self) -> ResourceId {
        self.graph.resource_id()
    }
}

pub struct ExecutionEngine {
    executor: Arc<NodeExecutor>,
    sink: Arc<LogSink>,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<NodeExecutor>, sink: Arc<LogSink>) -> Self {
        Self { executor, sink }
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    /// Spawn a run starting at `trigger_node_id`
    ///
    /// The run keeps `graph` for its whole lifetime, so later edits to the
    /// resource never change it.
    pub fn start_run(
        self: &Arc<Self>,
        graph: Arc<ExecutableGraph>,
        trigger_node_id: &str,
        context: Value,
    ) -> StartedRun {
        let flow_run_id = Uuid::new_v4().to_string();
        let run = RunContext {
            flow_run_id: flow_run_id.clone(),
            graph,
        };

        tracing::info!(
            "🚀 Starting run {} for resource {} from trigger '{}'",
            flow_run_id,
            run.resource_id(),
            trigger_node_id
        );

        let engine = Arc::clone(self);
        let trigger = trigger_node_id.to_string();
        let handle = tokio::spawn(async move { engine.execute_run(run, trigger, context).await });

        StartedRun {
            flow_run_id,
            trigger_node_id: trigger_node_id.to_string(),
            handle,
        }
    }

    async fn execute_run(self: Arc<Self>, run: RunContext, trigger_id: String, context: Value) -> RunSummary {
        let trigger_type = run
            .graph
            .node(&trigger_id)
            .map(|node| node.node_type.as_str())
            .unwrap_or_default();

        self.log(
            &run,
            None,
            LogType::FlowStart,
            json!({
                "resourceId": run.resource_id(),
                "triggerNodeId": trigger_id,
                "triggerType": trigger_type,
                "input": context,
            }),
        )
        .await;

        let mut tasks = JoinSet::new();
        // The trigger is a pass-through: its successors receive the event context
        for next in run.graph.successors(&trigger_id, HANDLE_OUTPUT) {
            self.spawn_node(&mut tasks, &run, next.clone(), context.clone());
        }

        let mut completed_nodes = Vec::new();
        let mut failed_nodes = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let step = match joined {
                Ok(step) => step,
                Err(e) => {
                    // Executor panics are caught inside the task; this is cancellation
                    tracing::error!("❌ Node task of run {} did not finish: {}", run.flow_run_id, e);
                    continue;
                }
            };

            if step.failed {
                failed_nodes.push(step.node_id);
                continue;
            }
            for next in &step.next {
                self.spawn_node(&mut tasks, &run, next.clone(), step.output.clone());
            }
            completed_nodes.push(step.node_id);
        }

        let status = if failed_nodes.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };

        self.log(
            &run,
            None,
            LogType::FlowCompleted,
            json!({
                "status": status,
                "completedNodes": completed_nodes,
                "failedNodes": failed_nodes,
            }),
        )
        .await;

        tracing::info!(
            "🏁 Run {} finished: {:?} ({} completed, {} failed)",
            run.flow_run_id,
            status,
            completed_nodes.len(),
            failed_nodes.len()
        );

        RunSummary {
            flow_run_id: run.flow_run_id,
            status,
            completed_nodes,
            failed_nodes,
        }
    }

    fn spawn_node(&self, tasks: &mut JoinSet<NodeStep>, run: &RunContext, node_id: String, input: Value) {
        let executor = Arc::clone(&self.executor);
        let sink = Arc::clone(&self.sink);
        let run = run.clone();
        tasks.spawn(async move { execute_node(executor, sink, run, node_id, input).await });
    }

    async fn log(&self, run: &RunContext, node_id: Option<&str>, log_type: LogType, payload: Value) {
        emit(&self.sink, run, node_id, log_type, payload).await;
    }
}

async fn execute_node(
    executor: Arc<NodeExecutor>,
    sink: Arc<LogSink>,
    run: RunContext,
    node_id: String,
    input: Value,
) -> NodeStep {
    emit(&sink, &run, Some(&node_id), LogType::NodeStarted, json!({ "input": input })).await;

    let result = match run.graph.node(&node_id) {
        Some(node) => {
            let ctx = NodeContext {
                resource_id: run.resource_id(),
                flow_run_id: run.flow_run_id.clone(),
                input,
            };
            AssertUnwindSafe(executor.execute(node, &ctx))
                .catch_unwind()
                .await
                .unwrap_or(Err(NodeError::Panicked))
        }
        None => Err(NodeError::config(format!("node '{}' is not part of the graph", node_id))),
    };

    match result {
        Ok(outcome) => {
            emit(
                &sink,
                &run,
                Some(&node_id),
                LogType::NodeCompleted,
                json!({ "output": outcome.payload, "outputHandle": outcome.output_handle }),
            )
            .await;

            let next = outcome
                .output_handle
                .map(|handle| run.graph.successors(&node_id, handle).to_vec())
                .unwrap_or_default();
            NodeStep {
                node_id,
                failed: false,
                next,
                output: outcome.payload,
            }
        }
        Err(e) => {
            tracing::warn!("❌ Node '{}' failed in run {}: {}", node_id, run.flow_run_id, e);
            emit(
                &sink,
                &run,
                Some(&node_id),
                LogType::NodeFailed,
                json!({ "error": e.to_string(), "code": e.code() }),
            )
            .await;

            NodeStep {
                node_id,
                failed: true,
                next: Vec::new(),
                output: Value::Null,
            }
        }
    }
}

/// Log write failures never stop a run
async fn emit(sink: &LogSink, run: &RunContext, node_id: Option<&str>, log_type: LogType, payload: Value) {
    let entry = NewLogEntry {
        resource_id: run.resource_id(),
        flow_run_id: run.flow_run_id.clone(),
        node_id: node_id.map(str::to_string),
        log_type,
        payload,
    };
    if let Err(e) = sink.emit(entry).await {
        tracing::error!(
            "❌ Failed to record {} for run {}: {}",
            log_type.as_str(),
            run.flow_run_id,
            e
        );
    }
}
