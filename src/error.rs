/// Error types for flow graphs, execution and log storage
///
/// Domain failures are typed enums; startup and storage plumbing use
/// `anyhow::Result` instead.

use serde::Serialize;
use thiserror::Error;

/// Structural problem that keeps a graph from being activated
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GraphError {
    #[error("Node '{node_id}' is defined more than once")]
    #[serde(rename_all = "camelCase")]
    DuplicateNode { node_id: String },

    #[error("Edge '{edge_id}' is defined more than once")]
    #[serde(rename_all = "camelCase")]
    DuplicateEdge { edge_id: String },

    #[error("Node '{node_id}' has unknown type '{node_type}'")]
    #[serde(rename_all = "camelCase")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Edge '{edge_id}' references unknown node '{node_id}'")]
    #[serde(rename_all = "camelCase")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Edge '{edge_id}' uses handle '{handle}' which node '{node_id}' does not expose")]
    #[serde(rename_all = "camelCase")]
    UnknownHandle {
        edge_id: String,
        node_id: String,
        handle: String,
    },

    #[error("Edge '{edge_id}' needs an explicit handle on node '{node_id}'")]
    #[serde(rename_all = "camelCase")]
    AmbiguousHandle { edge_id: String, node_id: String },

    #[error("Cycle reachable from trigger '{trigger_id}' through node '{node_id}'")]
    #[serde(rename_all = "camelCase")]
    Cycle { trigger_id: String, node_id: String },
}

/// Failure while moving a stored graph to the current catalog version
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("Catalog version {found} is newer than the supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Catalog version 0 is not valid")]
    InvalidVersion,
}

/// Failure of a single node executor
///
/// Recorded as `node.processing.failed`; it stops the branch, never the run.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid node configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("MQTT server {0} is not configured")]
    UnknownServer(i64),

    #[error("MQTT publish failed: {0}")]
    Mqtt(String),

    #[error("Executor panicked")]
    Panicked,
}

impl NodeError {
    /// Shorthand for a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Machine-readable tag used in failure payloads
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalidConfig",
            Self::Http(_) => "http",
            Self::Timeout(_) => "timeout",
            Self::UnknownServer(_) => "unknownServer",
            Self::Mqtt(_) => "mqtt",
            Self::Panicked => "panicked",
        }
    }
}

/// Log persistence failure
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid pagination: {0}")]
    InvalidPage(String),

    #[error("Corrupt log row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Why a flow save was refused
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Flow graph has {} structural error(s)", .0.len())]
    Invalid(Vec<GraphError>),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
