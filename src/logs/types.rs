/// Log entry types

use crate::flow::types::ResourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State transition recorded for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    #[serde(rename = "flow.start")]
    FlowStart,
    #[serde(rename = "node.processing.started")]
    NodeStarted,
    #[serde(rename = "node.processing.completed")]
    NodeCompleted,
    #[serde(rename = "node.processing.failed")]
    NodeFailed,
    #[serde(rename = "flow.completed")]
    FlowCompleted,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::FlowStart => "flow.start",
            LogType::NodeStarted => "node.processing.started",
            LogType::NodeCompleted => "node.processing.completed",
            LogType::NodeFailed => "node.processing.failed",
            LogType::FlowCompleted => "flow.completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            LogType::FlowStart,
            LogType::NodeStarted,
            LogType::NodeCompleted,
            LogType::NodeFailed,
            LogType::FlowCompleted,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
    }
}

/// A persisted, immutable log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub node_id: Option<String>,
    pub flow_run_id: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub resource_id: ResourceId,
}

/// Entry as produced by the engine, before it has an id
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub resource_id: ResourceId,
    pub flow_run_id: String,
    pub node_id: Option<String>,
    pub log_type: LogType,
    pub payload: Value,
}

/// One page of historical entries, ascending by id
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub data: Vec<LogEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Page request, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "PageRequest::default_page")]
    pub page: u32,
    #[serde(default = "PageRequest::default_limit")]
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 500;

    fn default_page() -> u32 {
        1
    }

    fn default_limit() -> u32 {
        50
    }

    /// Row offset of the first entry, or an error message for out-of-range values
    pub fn offset(&self) -> Result<u64, String> {
        if self.page == 0 {
            return Err("page must be at least 1".to_string());
        }
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(format!("limit must be between 1 and {}", Self::MAX_LIMIT));
        }
        Ok(u64::from(self.page - 1) * u64::from(self.limit))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            limit: Self::default_limit(),
        }
    }
}

/// Entries of one run, in id order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogGroup {
    pub flow_run_id: String,
    pub entries: Vec<LogEntry>,
}

/// Group entries by run, keeping first-appearance order of runs and entry order within each
pub fn group_by_run(entries: Vec<LogEntry>) -> Vec<RunLogGroup> {
    let mut groups: Vec<RunLogGroup> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|g| g.flow_run_id == entry.flow_run_id) {
            Some(group) => group.entries.push(entry),
            None => groups.push(RunLogGroup {
                flow_run_id: entry.flow_run_id.clone(),
                entries: vec![entry],
            }),
        }
    }
    groups
}
