/// Node type catalog
///
/// Fixed per-type facts: structural kind, handle names, the configuration
/// schema exported to the authoring surface, and config validation.

use crate::flow::types::{
    ButtonConfig, ComparisonOperator, HttpRequestConfig, IfConfig, MqttMessageConfig, NodeKind,
    NodeType, ResourceKind, WaitConfig,
};
use crate::error::NodeError;
use serde::Serialize;
use serde_json::{json, Value};

/// Current catalog version; stored graphs are migrated up to it
pub const CATALOG_VERSION: u32 = 3;

pub const HANDLE_INPUT: &str = "input";
pub const HANDLE_OUTPUT: &str = "output";
pub const HANDLE_OUTPUT_TRUE: &str = "output-true";
pub const HANDLE_OUTPUT_FALSE: &str = "output-false";

/// Alias accepted for the single input/output of a node
const HANDLE_DEFAULT_ALIAS: &str = "default";

/// Why an edge handle could not be bound to a node port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleIssue {
    /// The node type has no port by this name (or no ports on this side)
    Unknown(String),
    /// No handle given but the node has several ports on this side
    Ambiguous,
}

impl NodeType {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeType::Wait | NodeType::If => NodeKind::Processing,
            NodeType::HttpSendRequest | NodeType::MqttSendMessage => NodeKind::Sink,
            _ => NodeKind::Source,
        }
    }

    pub fn inputs(&self) -> &'static [&'static str] {
        match self.kind() {
            NodeKind::Source => &[],
            NodeKind::Processing | NodeKind::Sink => &[HANDLE_INPUT],
        }
    }

    pub fn outputs(&self) -> &'static [&'static str] {
        match self {
            NodeType::If => &[HANDLE_OUTPUT_TRUE, HANDLE_OUTPUT_FALSE],
            _ => match self.kind() {
                NodeKind::Sink => &[],
                NodeKind::Source | NodeKind::Processing => &[HANDLE_OUTPUT],
            },
        }
    }

    /// Whether the authoring surface should offer this type for a resource
    pub fn supported_by(&self, resource: ResourceKind) -> bool {
        match self {
            NodeType::UsageStarted
            | NodeType::UsageStopped
            | NodeType::UsageTakeover
            | NodeType::Button => resource == ResourceKind::Machine,
            NodeType::DoorLocked | NodeType::DoorUnlocked | NodeType::DoorUnlatched => {
                resource == ResourceKind::Door
            }
            _ => true,
        }
    }

    /// Bind an edge's source handle to one of this type's outputs
    pub fn resolve_output(&self, handle: Option<&str>) -> Result<&'static str, HandleIssue> {
        resolve_handle(self.outputs(), handle)
    }

    /// Bind an edge's target handle to one of this type's inputs
    pub fn resolve_input(&self, handle: Option<&str>) -> Result<&'static str, HandleIssue> {
        resolve_handle(self.inputs(), handle)
    }

    /// JSON schema of the `data` object for this type
    pub fn config_schema(&self) -> Value {
        match self {
            NodeType::Button => json!({
                "type": "object",
                "properties": { "label": { "type": "string" } },
                "required": []
            }),
            NodeType::Wait => json!({
                "type": "object",
                "properties": {
                    "duration": { "type": "integer", "exclusiveMinimum": 0 },
                    "unit": { "type": "string", "enum": ["seconds", "minutes", "hours"] }
                },
                "required": ["duration", "unit"]
            }),
            NodeType::If => json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "comparisonOperator": { "type": "string", "enum": ComparisonOperator::ALL },
                    "comparisonValue": { "type": "string" },
                    "comparisonValueIsPath": { "type": "boolean", "default": false }
                },
                "required": ["path", "comparisonOperator", "comparisonValue"]
            }),
            NodeType::HttpSendRequest => json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "format": "uri" },
                    "method": { "type": "string", "enum": HttpRequestConfig::METHODS },
                    "headers": {
                        "type": "object",
                        "additionalProperties": { "type": "string" },
                        "default": {}
                    },
                    "body": { "type": "string", "default": "" }
                },
                "required": ["url", "method"]
            }),
            NodeType::MqttSendMessage => json!({
                "type": "object",
                "properties": {
                    "serverId": { "type": "integer", "exclusiveMinimum": 0 },
                    "topic": { "type": "string", "minLength": 1 },
                    "payload": { "type": "string", "default": "" }
                },
                "required": ["serverId", "topic"]
            }),
            _ => json!({ "type": "object", "properties": {}, "required": [] }),
        }
    }
}

fn resolve_handle(
    ports: &'static [&'static str],
    handle: Option<&str>,
) -> Result<&'static str, HandleIssue> {
    let handle = handle.filter(|h| !h.is_empty());
    match handle {
        None | Some(HANDLE_DEFAULT_ALIAS) => match ports {
            [single] => Ok(*single),
            [] => Err(HandleIssue::Unknown(
                handle.unwrap_or(HANDLE_DEFAULT_ALIAS).to_string(),
            )),
            _ => Err(HandleIssue::Ambiguous),
        },
        Some(name) => ports
            .iter()
            .find(|p| **p == name)
            .copied()
            .ok_or_else(|| HandleIssue::Unknown(name.to_string())),
    }
}

/// Catalog entry as exposed to the authoring surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub kind: NodeKind,
    pub inputs: Vec<&'static str>,
    pub outputs: Vec<&'static str>,
    pub config_schema: Value,
    pub supported_by_resource: bool,
    pub is_output: bool,
}

/// Describe every node type; without a resource kind everything counts as supported
pub fn node_schemas(resource: Option<ResourceKind>) -> Vec<NodeSchema> {
    NodeType::ALL
        .iter()
        .map(|node_type| NodeSchema {
            node_type: *node_type,
            kind: node_type.kind(),
            inputs: node_type.inputs().to_vec(),
            outputs: node_type.outputs().to_vec(),
            config_schema: node_type.config_schema(),
            supported_by_resource: resource.map_or(true, |r| node_type.supported_by(r)),
            is_output: node_type.kind() == NodeKind::Sink,
        })
        .collect()
}

/// A problem with one field of a node's `data`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDataIssue {
    pub node_id: String,
    pub node_type: String,
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Check a node's configuration against its type
///
/// Returns every problem found; an empty vec means the data is usable.
pub fn validate_node_data(node_id: &str, node_type: NodeType, data: &Value) -> Vec<NodeDataIssue> {
    let mut checker = FieldChecker {
        node_id,
        node_type,
        data,
        issues: Vec::new(),
    };

    if !data.is_null() && !data.is_object() {
        checker.issue("data", "Node data must be an object", Some(data.clone()));
        return checker.issues;
    }

    match node_type {
        NodeType::Button => checker.optional_string("label"),
        NodeType::Wait => {
            checker.positive_integer("duration");
            checker.one_of("unit", &["seconds", "minutes", "hours"]);
        }
        NodeType::If => {
            checker.required_string("path", false);
            checker.one_of("comparisonOperator", &ComparisonOperator::ALL);
            checker.required_string("comparisonValue", true);
            checker.optional_bool("comparisonValueIsPath");
        }
        NodeType::HttpSendRequest => {
            checker.url("url");
            checker.one_of("method", &HttpRequestConfig::METHODS);
            checker.string_map("headers");
            checker.optional_string("body");
        }
        NodeType::MqttSendMessage => {
            checker.positive_integer("serverId");
            checker.required_string("topic", false);
            checker.optional_string("payload");
        }
        _ => {}
    }

    checker.issues
}

struct FieldChecker<'a> {
    node_id: &'a str,
    node_type: NodeType,
    data: &'a Value,
    issues: Vec<NodeDataIssue>,
}

impl FieldChecker<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field).filter(|v| !v.is_null())
    }

    fn issue(&mut self, field: &str, message: impl Into<String>, value: Option<Value>) {
        self.issues.push(NodeDataIssue {
            node_id: self.node_id.to_string(),
            node_type: self.node_type.to_string(),
            field: field.to_string(),
            message: message.into(),
            value,
        });
    }

    fn required_string(&mut self, field: &str, allow_empty: bool) {
        match self.get(field).cloned() {
            None => self.issue(field, format!("{} is required", field), None),
            Some(Value::String(s)) if s.is_empty() && !allow_empty => {
                self.issue(field, format!("{} must not be empty", field), Some(Value::String(s)))
            }
            Some(Value::String(_)) => {}
            Some(other) => self.issue(field, format!("{} must be a string", field), Some(other)),
        }
    }

    fn optional_string(&mut self, field: &str) {
        if let Some(value) = self.get(field).cloned() {
            if !value.is_string() {
                self.issue(field, format!("{} must be a string", field), Some(value));
            }
        }
    }

    fn optional_bool(&mut self, field: &str) {
        if let Some(value) = self.get(field).cloned() {
            if !value.is_boolean() {
                self.issue(field, format!("{} must be a boolean", field), Some(value));
            }
        }
    }

    fn positive_integer(&mut self, field: &str) {
        match self.get(field).cloned() {
            None => self.issue(field, format!("{} is required", field), None),
            Some(value) => match value.as_i64() {
                Some(n) if n > 0 => {}
                _ => self.issue(field, format!("{} must be a positive integer", field), Some(value)),
            },
        }
    }

    fn one_of(&mut self, field: &str, allowed: &[&str]) {
        match self.get(field).cloned() {
            None => self.issue(field, format!("{} is required", field), None),
            Some(value) => {
                if !value.as_str().is_some_and(|s| allowed.contains(&s)) {
                    self.issue(
                        field,
                        format!("{} must be one of: {}", field, allowed.join(", ")),
                        Some(value),
                    );
                }
            }
        }
    }

    fn url(&mut self, field: &str) {
        match self.get(field).cloned() {
            None => self.issue(field, "url is required", None),
            Some(Value::String(s)) => {
                // Templated URLs are only checkable once rendered
                let looks_like_url = s.contains("{{")
                    || reqwest::Url::parse(&s).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
                if !looks_like_url {
                    self.issue(field, "Invalid URL format", Some(Value::String(s)));
                }
            }
            Some(other) => self.issue(field, "url must be a string", Some(other)),
        }
    }

    fn string_map(&mut self, field: &str) {
        let Some(value) = self.get(field).cloned() else {
            return;
        };
        match value.as_object() {
            Some(map) => {
                for (key, v) in map {
                    if !v.is_string() {
                        self.issue(
                            &format!("{}.{}", field, key),
                            "Header values must be strings",
                            Some(v.clone()),
                        );
                    }
                }
            }
            None => self.issue(field, format!("{} must be an object", field), Some(value)),
        }
    }
}

/// Typed configuration of a node, decoded once its data validated
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Trigger,
    Button(ButtonConfig),
    Wait(WaitConfig),
    If(IfConfig),
    HttpRequest(HttpRequestConfig),
    MqttMessage(MqttMessageConfig),
}

impl NodeConfig {
    /// Decode `data` for `node_type`, failing with every issue joined into one message
    pub fn parse(node_id: &str, node_type: NodeType, data: &Value) -> Result<Self, NodeError> {
        let issues = validate_node_data(node_id, node_type, data);
        if !issues.is_empty() {
            let message = issues
                .iter()
                .map(|i| format!("{}: {}", i.field, i.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(NodeError::config(message));
        }

        let data = if data.is_null() { json!({}) } else { data.clone() };
        let decode_err = |e: serde_json::Error| NodeError::config(e.to_string());

        Ok(match node_type {
            NodeType::Button => NodeConfig::Button(serde_json::from_value(data).map_err(decode_err)?),
            NodeType::Wait => NodeConfig::Wait(serde_json::from_value(data).map_err(decode_err)?),
            NodeType::If => NodeConfig::If(serde_json::from_value(data).map_err(decode_err)?),
            NodeType::HttpSendRequest => {
                NodeConfig::HttpRequest(serde_json::from_value(data).map_err(decode_err)?)
            }
            NodeType::MqttSendMessage => {
                NodeConfig::MqttMessage(serde_json::from_value(data).map_err(decode_err)?)
            }
            _ => NodeConfig::Trigger,
        })
    }
}
