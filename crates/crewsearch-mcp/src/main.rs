use std::sync::Arc;

use anyhow::Result;
use crewsearch_agents::ResearchService;
use crewsearch_core::{ConfigLoader, TelemetryOptions, init_metrics_from_env, init_telemetry};
use crewsearch_mcp::McpServer;
use tokio::io::{BufReader, stdin, stdout};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load(None)?;

    // stdout carries protocol frames
    init_telemetry(TelemetryOptions {
        default_filter: Some(config.logging.level.clone()),
        with_ansi: false,
        to_stderr: true,
    })?;
    init_metrics_from_env("crewsearch-mcp");

    let service = ResearchService::from_config(&config)?;
    let server = McpServer::new(Arc::new(service));

    info!(model = %config.model.model, "crew_search tool server ready");
    server.serve(BufReader::new(stdin()), stdout()).await
}
