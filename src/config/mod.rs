/// Configuration for the resource flows service
///
/// Every value has a default and can be overridden through `FLOWS_*`
/// environment variables for container deployment.

use crate::mqtt::MqttServerConfig;
use anyhow::Context;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logs: LogConfig,
    pub http: HttpNodeConfig,
    pub mqtt: MqttConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite file (default: "data")
    pub data_dir: String,
    pub file_name: String,
}

/// Flow log retention and live streaming
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub ttl_days: u32,
    pub retention_schedule: String,
    pub keepalive_interval: Duration,
    /// Broadcast slots per resource before slow subscribers start skipping
    pub live_buffer: usize,
}

/// Settings for `output.http.sendRequest` nodes
#[derive(Debug, Clone)]
pub struct HttpNodeConfig {
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub servers: Vec<MqttServerConfig>,
    pub connect_timeout: Duration,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn mqtt_servers_from_env() -> anyhow::Result<Vec<MqttServerConfig>> {
    match std::env::var("FLOWS_MQTT_SERVERS") {
        Ok(raw) => MqttServerConfig::parse_list(&raw).context("Invalid FLOWS_MQTT_SERVERS"),
        Err(_) => Ok(Vec::new()),
    }
}

impl Config {
    /// Like `default()`, but an invalid MQTT server list is an error
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        config.mqtt.servers = mqtt_servers_from_env()?;
        Ok(config)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let servers = mqtt_servers_from_env().unwrap_or_else(|e| {
            tracing::warn!("⚠️ Ignoring {:#}", e);
            Vec::new()
        });

        Self {
            server: ServerConfig {
                host: std::env::var("FLOWS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("FLOWS_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("FLOWS_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
                file_name: "flows.db".to_string(),
            },
            logs: LogConfig {
                ttl_days: env_or("FLOWS_LOG_TTL_DAYS", 7),
                retention_schedule: crate::runtime::DEFAULT_RETENTION_SCHEDULE.to_string(),
                keepalive_interval: Duration::from_secs(env_or::<u64>("FLOWS_KEEPALIVE_SECS", 10).max(1)),
                live_buffer: env_or("FLOWS_LIVE_BUFFER", 256),
            },
            http: HttpNodeConfig {
                timeout: Duration::from_secs(env_or("FLOWS_HTTP_TIMEOUT_SECS", 30)),
            },
            mqtt: MqttConfig {
                servers,
                connect_timeout: Duration::from_secs(env_or("FLOWS_MQTT_CONNECT_TIMEOUT_SECS", 10)),
            },
        }
    }
}
