/// MQTT publishing for `output.mqtt.sendMessage` nodes
///
/// Servers are configured by numeric id. A client per server is created on
/// first use; its event loop runs in a background task and reports the
/// connection state through a watch channel.

use crate::error::NodeError;
use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Publishes a message to a configured broker
#[async_trait]
pub trait MqttPublisher: Send + Sync {
    async fn publish(&self, server_id: i64, topic: &str, payload: &str) -> Result<(), NodeError>;
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MqttServerConfig {
    pub id: i64,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    1883
}

impl MqttServerConfig {
    /// Parse the JSON array form used by the environment config
    pub fn parse_list(json: &str) -> anyhow::Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }
}

struct MqttConnection {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
    event_loop: JoinHandle<()>,
}

/// Lazily connected clients, one per configured server
pub struct MqttClientPool {
    servers: HashMap<i64, MqttServerConfig>,
    connections: DashMap<i64, MqttConnection>,
    connect_timeout: Duration,
    client_id_prefix: String,
}

impl MqttClientPool {
    pub fn new(servers: Vec<MqttServerConfig>, connect_timeout: Duration) -> Self {
        Self {
            servers: servers.into_iter().map(|s| (s.id, s)).collect(),
            connections: DashMap::new(),
            connect_timeout,
            client_id_prefix: format!("resource-flows-{}", std::process::id()),
        }
    }

    pub fn server_ids(&self) -> Vec<i64> {
        let mut ids: Vec<_> = self.servers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn connection(&self, server_id: i64) -> Result<(AsyncClient, watch::Receiver<bool>), NodeError> {
        let config = self
            .servers
            .get(&server_id)
            .ok_or(NodeError::UnknownServer(server_id))?;

        let connection = self
            .connections
            .entry(server_id)
            .or_insert_with(|| self.connect(config));
        Ok((connection.client.clone(), connection.connected.clone()))
    }

    fn connect(&self, config: &MqttServerConfig) -> MqttConnection {
        let client_id = format!("{}-{}", self.client_id_prefix, config.id);
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let (state_tx, state_rx) = watch::channel(false);
        let server_id = config.id;

        tracing::info!(
            "🔗 Connecting MQTT server {} at {}:{}",
            server_id,
            config.host,
            config.port
        );

        let event_loop = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        let ok = ack.code == ConnectReturnCode::Success;
                        state_tx.send_replace(ok);
                        if ok {
                            tracing::info!("✅ MQTT server {} connected", server_id);
                        } else {
                            tracing::warn!("❌ MQTT server {} refused connection: {:?}", server_id, ack.code);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if state_tx.send_replace(false) {
                            tracing::warn!("❌ MQTT server {} disconnected: {}", server_id, e);
                        } else {
                            tracing::debug!("MQTT server {} unreachable: {}", server_id, e);
                        }
                        // rumqttc reconnects on the next poll
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        MqttConnection {
            client,
            connected: state_rx,
            event_loop,
        }
    }
}

#[async_trait]
impl MqttPublisher for MqttClientPool {
    async fn publish(&self, server_id: i64, topic: &str, payload: &str) -> Result<(), NodeError> {
        let (client, mut connected) = self.connection(server_id)?;

        let ready = tokio::time::timeout(self.connect_timeout, connected.wait_for(|up| *up))
            .await
            .map_err(|_| NodeError::Timeout(self.connect_timeout))?
            .is_ok();
        if !ready {
            return Err(NodeError::Mqtt(format!("connection task for server {} stopped", server_id)));
        }

        client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| NodeError::Mqtt(e.to_string()))?;

        tracing::debug!("📤 Published {} bytes to MQTT server {} topic '{}'", payload.len(), server_id, topic);
        Ok(())
    }
}

impl Drop for MqttClientPool {
    fn drop(&mut self) {
        for connection in self.connections.iter() {
            connection.event_loop.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_list_parses_with_defaults() {
        let servers = MqttServerConfig::parse_list(
            r#"[{"id": 1, "host": "broker.local"}, {"id": 2, "host": "10.0.0.2", "port": 8883, "username": "u", "password": "p"}]"#,
        )
        .unwrap();

        assert_eq!(servers[0].port, 1883);
        assert_eq!(servers[0].username, None);
        assert_eq!(servers[1].port, 8883);
        assert_eq!(servers[1].password.as_deref(), Some("p"));
    }

    #[tokio::test]
    async fn unknown_server_fails_fast() {
        let pool = MqttClientPool::new(vec![], Duration::from_secs(1));
        let err = pool.publish(4, "t", "p").await.unwrap_err();
        assert!(matches!(err, NodeError::UnknownServer(4)));
    }

    #[tokio::test]
    async fn unreachable_server_times_out() {
        let pool = MqttClientPool::new(
            vec![MqttServerConfig {
                id: 1,
                host: "127.0.0.1".into(),
                port: 1,
                username: None,
                password: None,
            }],
            Duration::from_millis(200),
        );

        let err = pool.publish(1, "t", "p").await.unwrap_err();
        assert!(matches!(err, NodeError::Timeout(_)));
        assert_eq!(pool.server_ids(), vec![1]);
    }
}
