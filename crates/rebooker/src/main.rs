use std::sync::Arc;

use anyhow::Context;
use rebooker::client::VisaClient;
use rebooker::config::BotConfig;
use rebooker::handlers::{router, AppState};
use rebooker::logging::{init_tracing, LogBuffer};
use rebooker::manager::BotManager;
use rebooker::poller::LoopSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    let logs = LogBuffer::default();
    init_tracing(config.log_json, Some(logs.clone()));

    let client = VisaClient::new(config.base_url.clone(), config.client_options())
        .context("Failed to build HTTP client")?;
    let manager = BotManager::new(Arc::new(client), LoopSettings::from_config(&config), logs);

    let bind_addr = config.bind_addr;
    let app = router(AppState {
        manager: manager.clone(),
        config: Arc::new(config),
    });

    tracing::info!("Server listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
