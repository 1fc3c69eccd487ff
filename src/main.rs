/// Resource flows server entry point
///
/// Serves:
/// - Flow save/load and node schemas at /api/resources/{id}/flow*
/// - Paginated and live (SSE) run logs at /api/resources/{id}/flow/logs*
/// - Trigger ingress at /api/resources/{id}/events and button presses
/// - Health check at /healthz

use resource_flows::{
    config::Config,
    server::{init_tracing, start_server},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    start_server(config).await?;

    Ok(())
}
