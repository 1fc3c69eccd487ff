/// Core flow type definitions
///
/// Stored records (`StoredNode`, `StoredEdge`, `StoredFlow`) are what the
/// authoring surface saves and what the database holds. `NodeType` is the
/// closed catalog those records are interpreted against.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Identifier of a controlled resource (machine or door)
pub type ResourceId = i64;

/// The full node/edge set of one resource as it is persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFlow {
    /// Catalog version the records were written against (absent = 1)
    #[serde(default = "legacy_catalog_version")]
    pub catalog_version: u32,
    #[serde(default)]
    pub nodes: Vec<StoredNode>,
    #[serde(default)]
    pub edges: Vec<StoredEdge>,
}

fn legacy_catalog_version() -> u32 {
    1
}

/// One node record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNode {
    pub id: String,
    /// Raw type tag; parsed into [`NodeType`] during validation
    #[serde(rename = "type")]
    pub node_type: String,
    /// Type-specific configuration
    #[serde(default)]
    pub data: Value,
    /// Editor layout, ignored by the engine
    #[serde(default)]
    pub position: Position,
}

/// Editor coordinates; fractional after a drag
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One directed edge record, pointing from producer (`source`) to consumer (`target`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

/// Kind of controlled equipment, used to decide which triggers apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Machine,
    Door,
}

/// Structural role of a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// No inputs, at least one output
    Source,
    /// At least one input and one output
    Processing,
    /// At least one input, no outputs
    Sink,
}

/// The closed catalog of node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "input.resource.usage.started")]
    UsageStarted,
    #[serde(rename = "input.resource.usage.stopped")]
    UsageStopped,
    #[serde(rename = "input.resource.usage.takeover")]
    UsageTakeover,
    #[serde(rename = "input.resource.door.locked")]
    DoorLocked,
    #[serde(rename = "input.resource.door.unlocked")]
    DoorUnlocked,
    #[serde(rename = "input.resource.door.unlatched")]
    DoorUnlatched,
    #[serde(rename = "input.button")]
    Button,
    #[serde(rename = "processing.wait")]
    Wait,
    #[serde(rename = "processing.if")]
    If,
    #[serde(rename = "output.http.sendRequest")]
    HttpSendRequest,
    #[serde(rename = "output.mqtt.sendMessage")]
    MqttSendMessage,
}

impl NodeType {
    pub const ALL: [NodeType; 11] = [
        NodeType::Button,
        NodeType::UsageStarted,
        NodeType::UsageStopped,
        NodeType::UsageTakeover,
        NodeType::DoorLocked,
        NodeType::DoorUnlocked,
        NodeType::DoorUnlatched,
        NodeType::HttpSendRequest,
        NodeType::MqttSendMessage,
        NodeType::Wait,
        NodeType::If,
    ];

    /// Type tag as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::UsageStarted => "input.resource.usage.started",
            NodeType::UsageStopped => "input.resource.usage.stopped",
            NodeType::UsageTakeover => "input.resource.usage.takeover",
            NodeType::DoorLocked => "input.resource.door.locked",
            NodeType::DoorUnlocked => "input.resource.door.unlocked",
            NodeType::DoorUnlatched => "input.resource.door.unlatched",
            NodeType::Button => "input.button",
            NodeType::Wait => "processing.wait",
            NodeType::If => "processing.if",
            NodeType::HttpSendRequest => "output.http.sendRequest",
            NodeType::MqttSendMessage => "output.mqtt.sendMessage",
        }
    }

    /// Domain event kind that fires this node, if it is a trigger
    pub fn trigger_kind(&self) -> Option<TriggerKind> {
        match self {
            NodeType::UsageStarted => Some(TriggerKind::UsageStarted),
            NodeType::UsageStopped => Some(TriggerKind::UsageStopped),
            NodeType::UsageTakeover => Some(TriggerKind::UsageTakeover),
            NodeType::DoorLocked => Some(TriggerKind::DoorLocked),
            NodeType::DoorUnlocked => Some(TriggerKind::DoorUnlocked),
            NodeType::DoorUnlatched => Some(TriggerKind::DoorUnlatched),
            NodeType::Button => Some(TriggerKind::ButtonPressed),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown node type: {}", s))
    }
}

/// Closed set of domain events that can start a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    UsageStarted,
    UsageStopped,
    UsageTakeover,
    DoorLocked,
    DoorUnlocked,
    DoorUnlatched,
    ButtonPressed,
}

impl TriggerKind {
    /// The node type a trigger of this kind fires
    pub fn node_type(&self) -> NodeType {
        match self {
            TriggerKind::UsageStarted => NodeType::UsageStarted,
            TriggerKind::UsageStopped => NodeType::UsageStopped,
            TriggerKind::UsageTakeover => NodeType::UsageTakeover,
            TriggerKind::DoorLocked => NodeType::DoorLocked,
            TriggerKind::DoorUnlocked => NodeType::DoorUnlocked,
            TriggerKind::DoorUnlatched => NodeType::DoorUnlatched,
            TriggerKind::ButtonPressed => NodeType::Button,
        }
    }
}

/// `processing.wait` configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub duration: u64,
    pub unit: WaitUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUnit {
    Seconds,
    Minutes,
    Hours,
}

impl WaitConfig {
    pub fn as_duration(&self) -> std::time::Duration {
        let factor = match self.unit {
            WaitUnit::Seconds => 1,
            WaitUnit::Minutes => 60,
            WaitUnit::Hours => 60 * 60,
        };
        std::time::Duration::from_secs(self.duration.saturating_mul(factor))
    }
}

/// `processing.if` configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfConfig {
    pub path: String,
    pub comparison_operator: ComparisonOperator,
    pub comparison_value: String,
    #[serde(default)]
    pub comparison_value_is_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<=")]
    LessThanOrEqual,
}

impl ComparisonOperator {
    pub const ALL: [&'static str; 6] = ["=", "!=", ">", "<", ">=", "<="];
}

/// `output.http.sendRequest` configuration; every string is a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestConfig {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl HttpRequestConfig {
    pub const METHODS: [&'static str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];
}

/// `output.mqtt.sendMessage` configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttMessageConfig {
    pub server_id: i64,
    pub topic: String,
    #[serde(default)]
    pub payload: String,
}

/// `input.button` configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonConfig {
    #[serde(default)]
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_tags_round_trip_through_from_str() {
        for node_type in NodeType::ALL {
            assert_eq!(node_type.as_str().parse::<NodeType>(), Ok(node_type));
        }
        assert!("action.util.wait".parse::<NodeType>().is_err());
    }

    #[test]
    fn serde_tag_matches_as_str() {
        let json = serde_json::to_value(NodeType::HttpSendRequest).unwrap();
        assert_eq!(json, Value::String("output.http.sendRequest".into()));
    }

    #[test]
    fn wait_units_scale_duration() {
        let wait = |duration, unit| WaitConfig { duration, unit }.as_duration().as_secs();
        assert_eq!(wait(2, WaitUnit::Seconds), 2);
        assert_eq!(wait(2, WaitUnit::Minutes), 120);
        assert_eq!(wait(1, WaitUnit::Hours), 3600);
    }

    #[test]
    fn missing_catalog_version_reads_as_legacy() {
        let flow: StoredFlow = serde_json::from_str(r#"{"nodes":[],"edges":[]}"#).unwrap();
        assert_eq!(flow.catalog_version, 1);
    }

    #[test]
    fn trigger_kinds_map_to_source_types() {
        assert_eq!(TriggerKind::ButtonPressed.node_type(), NodeType::Button);
        assert_eq!(NodeType::DoorUnlatched.trigger_kind(), Some(TriggerKind::DoorUnlatched));
        assert_eq!(NodeType::Wait.trigger_kind(), None);
    }
}
