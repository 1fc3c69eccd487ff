/// Node executors
///
/// The catalog is closed, so dispatch is a `match` over the decoded
/// [`NodeConfig`] rather than a lookup table. Every executor receives the
/// previous node's output as `input` and returns a [`NodeOutcome`] naming
/// the output handle to follow (or none for sinks).

use crate::error::NodeError;
use crate::flow::catalog::{NodeConfig, HANDLE_OUTPUT, HANDLE_OUTPUT_FALSE, HANDLE_OUTPUT_TRUE};
use crate::flow::types::{HttpRequestConfig, IfConfig, MqttMessageConfig, ResourceId, WaitConfig};
use crate::flow::validation::FlowNode;
use crate::mqtt::MqttPublisher;
use crate::runtime::condition;
use crate::runtime::template::render;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What a node hands to the engine on success
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
    /// Handle whose edges to follow; `None` ends the branch
    pub output_handle: Option<&'static str>,
    pub payload: Value,
}

impl NodeOutcome {
    fn pass_through(input: &Value) -> Self {
        Self {
            output_handle: Some(HANDLE_OUTPUT),
            payload: input.clone(),
        }
    }
}

/// Run-level information available to executors
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub resource_id: ResourceId,
    pub flow_run_id: String,
    /// Output of the upstream node, or the trigger context for the first node
    pub input: Value,
}

/// Executes nodes of every catalog type
pub struct NodeExecutor {
    http: reqwest::Client,
    http_timeout: Duration,
    mqtt: Arc<dyn MqttPublisher>,
}

impl NodeExecutor {
    pub fn new(mqtt: Arc<dyn MqttPublisher>, http_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("resource-flows/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            http_timeout,
            mqtt,
        })
    }

    /// Execute one node against its input
    pub async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeOutcome, NodeError> {
        tracing::debug!("⚙️ Executing node '{}' ({}) in run {}", node.id, node.node_type, ctx.flow_run_id);

        match NodeConfig::parse(&node.id, node.node_type, &node.data)? {
            NodeConfig::Trigger | NodeConfig::Button(_) => Ok(NodeOutcome::pass_through(&ctx.input)),
            NodeConfig::Wait(config) => self.wait(&config, ctx).await,
            NodeConfig::If(config) => Ok(self.branch(&config, ctx)),
            NodeConfig::HttpRequest(config) => self.send_http(&config, ctx).await,
            NodeConfig::MqttMessage(config) => self.send_mqtt(&config, ctx).await,
        }
    }

    /// Suspend this branch only; other branches and runs keep going
    async fn wait(&self, config: &WaitConfig, ctx: &NodeContext) -> Result<NodeOutcome, NodeError> {
        let duration = config.as_duration();
        tracing::debug!("⏳ Waiting {:?}", duration);
        tokio::time::sleep(duration).await;
        Ok(NodeOutcome::pass_through(&ctx.input))
    }

    fn branch(&self, config: &IfConfig, ctx: &NodeContext) -> NodeOutcome {
        let handle = if condition::evaluate(config, &ctx.input) {
            HANDLE_OUTPUT_TRUE
        } else {
            HANDLE_OUTPUT_FALSE
        };
        NodeOutcome {
            output_handle: Some(handle),
            payload: ctx.input.clone(),
        }
    }

    /// Any response counts as success, whatever its status
    async fn send_http(&self, config: &HttpRequestConfig, ctx: &NodeContext) -> Result<NodeOutcome, NodeError> {
        let url = render(&config.url, &ctx.input);
        let method = render(&config.method, &ctx.input).to_uppercase();
        let body = render(&config.body, &ctx.input);

        let mut request = match method.as_str() {
            "GET" => self.http.get(&url),
            "POST" => self.http.post(&url),
            "PUT" => self.http.put(&url),
            "PATCH" => self.http.patch(&url),
            "DELETE" => self.http.delete(&url),
            "HEAD" => self.http.head(&url),
            "OPTIONS" => self.http.request(reqwest::Method::OPTIONS, &url),
            other => return Err(NodeError::config(format!("Unsupported HTTP method: {}", other))),
        };

        for (name, value) in &config.headers {
            request = request.header(name.as_str(), render(value, &ctx.input));
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        tracing::debug!("🌍 HTTP Request: {} {}", method, url);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Timeout(self.http_timeout)
            } else {
                NodeError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| NodeError::Http(format!("Failed to read response body: {}", e)))?;
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        tracing::info!("✅ HTTP request completed: {} {} (status: {})", method, url, status);

        Ok(NodeOutcome {
            output_handle: None,
            payload: json!({
                "status": status.as_u16(),
                "headers": headers,
                "data": data,
            }),
        })
    }

    async fn send_mqtt(&self, config: &MqttMessageConfig, ctx: &NodeContext) -> Result<NodeOutcome, NodeError> {
        let topic = render(&config.topic, &ctx.input);
        let payload = render(&config.payload, &ctx.input);
        if topic.is_empty() {
            return Err(NodeError::config("topic rendered to an empty string"));
        }

        self.mqtt.publish(config.server_id, &topic, &payload).await?;
        tracing::info!("📤 MQTT message sent to server {} topic '{}'", config.server_id, topic);

        Ok(NodeOutcome {
            output_handle: None,
            payload: ctx.input.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::types::NodeType;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(i64, String, String)>>,
    }

    #[async_trait]
    impl MqttPublisher for RecordingPublisher {
        async fn publish(&self, server_id: i64, topic: &str, payload: &str) -> Result<(), NodeError> {
            if server_id == 99 {
                return Err(NodeError::UnknownServer(99));
            }
            self.sent
                .lock()
                .unwrap()
                .push((server_id, topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    fn node(node_type: NodeType, data: Value) -> FlowNode {
        FlowNode {
            id: "n".into(),
            node_type,
            data,
        }
    }

    fn ctx(input: Value) -> NodeContext {
        NodeContext {
            resource_id: 1,
            flow_run_id: "run".into(),
            input,
        }
    }

    fn executor(publisher: Arc<RecordingPublisher>) -> NodeExecutor {
        NodeExecutor::new(publisher, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn triggers_pass_input_through_default_output() {
        let exec = executor(Arc::default());
        let input = json!({ "user": { "id": 1 } });

        let outcome = exec
            .execute(&node(NodeType::UsageStarted, Value::Null), &ctx(input.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, NodeOutcome { output_handle: Some("output"), payload: input });
    }

    #[tokio::test]
    async fn if_node_selects_named_handle() {
        let exec = executor(Arc::default());
        let data = json!({ "path": "status", "comparisonOperator": "=", "comparisonValue": "open" });

        let open = exec
            .execute(&node(NodeType::If, data.clone()), &ctx(json!({ "status": "open" })))
            .await
            .unwrap();
        let closed = exec
            .execute(&node(NodeType::If, data), &ctx(json!({ "status": "closed" })))
            .await
            .unwrap();

        assert_eq!(open.output_handle, Some("output-true"));
        assert_eq!(closed.output_handle, Some("output-false"));
        assert_eq!(closed.payload, json!({ "status": "closed" }));
    }

    #[tokio::test]
    async fn malformed_config_fails_the_node() {
        let exec = executor(Arc::default());
        let err = exec
            .execute(&node(NodeType::Wait, json!({ "duration": -3, "unit": "days" })), &ctx(Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(msg) if msg.contains("duration") && msg.contains("unit")));
    }

    #[tokio::test]
    async fn mqtt_node_renders_topic_and_payload() {
        let publisher = Arc::new(RecordingPublisher::default());
        let exec = executor(Arc::clone(&publisher));
        let data = json!({
            "serverId": 2,
            "topic": "doors/{{ input.resource.id }}",
            "payload": "{{ input.user.username }} opened"
        });

        let outcome = exec
            .execute(
                &node(NodeType::MqttSendMessage, data),
                &ctx(json!({ "resource": { "id": 8 }, "user": { "username": "ada" } })),
            )
            .await
            .unwrap();

        assert_eq!(outcome.output_handle, None);
        assert_eq!(
            publisher.sent.lock().unwrap().as_slice(),
            &[(2, "doors/8".to_string(), "ada opened".to_string())]
        );
    }

    #[tokio::test]
    async fn mqtt_publisher_errors_fail_the_node() {
        let exec = executor(Arc::default());
        let data = json!({ "serverId": 99, "topic": "t" });
        let err = exec
            .execute(&node(NodeType::MqttSendMessage, data), &ctx(Value::Null))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unknownServer");
    }

    #[tokio::test]
    async fn unreachable_http_target_is_a_failure() {
        let exec = executor(Arc::default());
        let data = json!({ "url": "http://127.0.0.1:1/hook", "method": "POST" });
        let err = exec
            .execute(&node(NodeType::HttpSendRequest, data), &ctx(Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Http(_)));
    }

    #[tokio::test]
    async fn silent_http_target_times_out() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let exec = NodeExecutor::new(Arc::new(RecordingPublisher::default()), Duration::from_millis(200)).unwrap();
        let data = json!({ "url": format!("http://{}/hook", addr), "method": "GET" });
        let err = exec
            .execute(&node(NodeType::HttpSendRequest, data), &ctx(Value::Null))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "timeout");
        assert!(matches!(err, NodeError::Timeout(d) if d == Duration::from_millis(200)));
    }
}
