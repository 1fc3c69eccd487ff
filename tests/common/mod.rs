#![allow(dead_code)]

/// Shared fixtures for integration tests

use async_trait::async_trait;
use axum::{body::Bytes, extract::State, http::HeaderMap, routing::any, Router};
use resource_flows::database::open_memory_pool;
use resource_flows::error::NodeError;
use resource_flows::flow::types::{Position, StoredEdge, StoredFlow, StoredNode};
use resource_flows::flow::{FlowRegistry, FlowStorage, CATALOG_VERSION};
use resource_flows::logs::{LogEntry, LogSink, LogType, SqliteLogStore};
use resource_flows::mqtt::MqttPublisher;
use resource_flows::runtime::{ExecutionEngine, NodeExecutor, TriggerDispatcher};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

// ===========================================================================
// Graph builders
// ===========================================================================

pub fn node(id: &str, node_type: &str, data: Value) -> StoredNode {
    StoredNode {
        id: id.into(),
        node_type: node_type.into(),
        data,
        position: Position::default(),
    }
}

pub fn edge(source: &str, target: &str) -> StoredEdge {
    StoredEdge {
        id: format!("{}->{}", source, target),
        source: source.into(),
        target: target.into(),
        source_handle: None,
        target_handle: None,
    }
}

pub fn edge_from(source: &str, handle: &str, target: &str) -> StoredEdge {
    StoredEdge {
        source_handle: Some(handle.into()),
        ..edge(source, target)
    }
}

pub fn flow(nodes: Vec<StoredNode>, edges: Vec<StoredEdge>) -> StoredFlow {
    StoredFlow {
        catalog_version: CATALOG_VERSION,
        nodes,
        edges,
    }
}

// ===========================================================================
// Fakes
// ===========================================================================

/// MQTT publisher that records messages; server 99 is unreachable
#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<(i64, String, String)>>,
}

#[async_trait]
impl MqttPublisher for RecordingPublisher {
    async fn publish(&self, server_id: i64, topic: &str, payload: &str) -> Result<(), NodeError> {
        if server_id == 99 {
            return Err(NodeError::Mqtt("broker unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((server_id, topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

/// Local HTTP server that records every request and answers `{"ok": true}`
pub struct HttpTarget {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl HttpTarget {
    pub async fn spawn() -> Self {
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();

        async fn record(
            State(requests): State<Arc<Mutex<Vec<RecordedRequest>>>>,
            method: axum::http::Method,
            uri: axum::http::Uri,
            headers: HeaderMap,
            body: Bytes,
        ) -> axum::Json<Value> {
            requests.lock().unwrap().push(RecordedRequest {
                method: method.to_string(),
                path: uri.path().to_string(),
                headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
            axum::Json(serde_json::json!({ "ok": true }))
        }

        let app = Router::new()
            .route("/{*path}", any(record))
            .with_state(Arc::clone(&requests));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

// ===========================================================================
// Engine harness
// ===========================================================================

pub struct Harness {
    pub registry: Arc<FlowRegistry>,
    pub sink: Arc<LogSink>,
    pub dispatcher: TriggerDispatcher,
    pub mqtt: Arc<RecordingPublisher>,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = open_memory_pool().await.unwrap();
        let registry = Arc::new(FlowRegistry::new(FlowStorage::new(pool.clone())));
        let sink = Arc::new(LogSink::new(Arc::new(SqliteLogStore::new(pool)), 256));
        let mqtt = Arc::new(RecordingPublisher::default());
        let executor = Arc::new(NodeExecutor::new(mqtt.clone(), Duration::from_secs(5)).unwrap());
        let engine = Arc::new(ExecutionEngine::new(executor, Arc::clone(&sink)));
        let dispatcher = TriggerDispatcher::new(Arc::clone(&registry), engine);

        Self {
            registry,
            sink,
            dispatcher,
            mqtt,
        }
    }

    pub async fn run_entries(&self, run_id: &str) -> Vec<LogEntry> {
        self.sink.store().run_entries(run_id).await.unwrap()
    }
}

/// `(type, node id)` pairs, the shape most ordering assertions care about
pub fn shape(entries: &[LogEntry]) -> Vec<(LogType, Option<String>)> {
    entries
        .iter()
        .map(|e| (e.log_type, e.node_id.clone()))
        .collect()
}

pub fn find<'a>(entries: &'a [LogEntry], log_type: LogType, node_id: &str) -> &'a LogEntry {
    entries
        .iter()
        .find(|e| e.log_type == log_type && e.node_id.as_deref() == Some(node_id))
        .unwrap_or_else(|| panic!("no {:?} entry for node {}", log_type, node_id))
}
