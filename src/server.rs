/// Server setup and initialization
///
/// Wires together storage, registry, log sink, MQTT pool, execution engine,
/// dispatcher and HTTP routes.

use crate::{
    api::{create_routes, AppState},
    config::Config,
    database::open_pool,
    flow::{registry::FlowRegistry, storage::FlowStorage},
    logs::{sink::LogSink, store::{LogStore, SqliteLogStore}},
    mqtt::{MqttClientPool, MqttPublisher},
    runtime::{
        dispatcher::TriggerDispatcher, engine::ExecutionEngine, executor::NodeExecutor,
        scheduler::LogRetentionScheduler,
    },
};
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Fully wired application
pub struct App {
    pub router: Router,
    pub state: AppState,
    pub retention: Arc<LogRetentionScheduler>,
}

/// Build the application on an already opened database
///
/// Starts the keepalive ticker and loads every stored flow. The retention
/// scheduler is created but not started; see [`start_server`].
pub async fn create_app(config: &Config, pool: SqlitePool) -> Result<App> {
    tracing::info!("📊 Initializing flow registry");
    let registry = Arc::new(FlowRegistry::new(FlowStorage::new(pool.clone())));
    registry
        .init_from_storage()
        .await
        .context("Failed to load flows from storage")?;

    tracing::info!("📝 Initializing log sink");
    let log_store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::new(pool));
    let sink = Arc::new(LogSink::new(Arc::clone(&log_store), config.logs.live_buffer));
    sink.spawn_keepalive(config.logs.keepalive_interval);

    tracing::info!(
        "🔗 Configuring {} MQTT server(s)",
        config.mqtt.servers.len()
    );
    let mqtt: Arc<dyn MqttPublisher> = Arc::new(MqttClientPool::new(
        config.mqtt.servers.clone(),
        config.mqtt.connect_timeout,
    ));

    tracing::info!("⚙️ Initializing node executor and execution engine");
    let executor = Arc::new(
        NodeExecutor::new(mqtt, config.http.timeout).context("Failed to initialize node executor")?,
    );
    let engine = Arc::new(ExecutionEngine::new(executor, Arc::clone(&sink)));
    let dispatcher = Arc::new(TriggerDispatcher::new(Arc::clone(&registry), engine));

    let retention = Arc::new(
        LogRetentionScheduler::new(log_store, config.logs.ttl_days, &config.logs.retention_schedule)
            .await
            .context("Failed to initialize log retention scheduler")?,
    );

    let state = AppState {
        registry,
        dispatcher,
        sink,
    };

    tracing::info!("📡 Creating HTTP router");
    let router = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_routes().with_state(state.clone()));

    tracing::info!("✅ Application initialized successfully");
    Ok(App {
        router,
        state,
        retention,
    })
}

/// Install the global subscriber; call before reading configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing::info!("Starting resource flows server...");

    let pool = open_pool(&config.database.data_dir, &config.database.file_name).await?;
    let app = create_app(&config, pool).await?;

    app.retention
        .start()
        .await
        .context("Failed to start log retention scheduler")?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.router.into_make_service()).await?;

    app.retention.stop().await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
