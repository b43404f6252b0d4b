use anyhow::Result;
use axum::Router;
use crewsearch_agents::ResearchService;
use crewsearch_api::{config::ApiConfig, routes, state::AppState};
use crewsearch_core::{ConfigLoader, TelemetryOptions, init_metrics_from_env, init_telemetry};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let core_config = ConfigLoader::load(None)?;
    init_telemetry(TelemetryOptions {
        default_filter: Some(core_config.logging.level.clone()),
        ..TelemetryOptions::default()
    })?;
    init_metrics_from_env("crewsearch-api");

    let config = ApiConfig::from_env()?;
    let service = ResearchService::from_config(&core_config)?;
    let state = AppState::new(service, &config);

    let app: Router = routes::build_router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        address = %config.listen_addr,
        max_concurrency = config.max_concurrency,
        auth = config.auth_token.is_some(),
        "crewsearch-api listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
