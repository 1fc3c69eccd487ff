/// Resource flows: event-driven automation for shared equipment
///
/// Operators attach a node/edge graph to a machine or door. Usage, door and
/// button events start runs that walk the graph (wait, branch, send HTTP or
/// MQTT) and record every step to an ordered log with live fan-out.

// Configuration from environment
pub mod config;

// SQLite connection and schema
pub mod database;

// Domain error types
pub mod error;

// Graph model: catalog, migration, validation, storage and hot-reload registry
pub mod flow;

// Run logs: store, live sink and pagination types
pub mod logs;

// MQTT publishing for message nodes
pub mod mqtt;

// Dispatch, execution engine and node executors
pub mod runtime;

// HTTP API layer
pub mod api;

// Server setup and initialization
pub mod server;

pub use flow::{ExecutableGraph, FlowRegistry, NodeType, ResourceId, StoredFlow, TriggerKind};
pub use logs::{LogEntry, LogSink, LogType};
pub use runtime::{ExecutionEngine, TriggerDispatcher, TriggerEvent};
pub use server::start_server;
