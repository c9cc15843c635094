use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trojan_ledger::{AddressAllocator, LedgerService};

mod api;
mod config;
mod menu;
mod state;
mod webhook;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {err}");
            return Err(err).context("set BOT_TOKEN to the bot credential issued by @BotFather");
        }
    };
    let metrics_handle = install_metrics()?;

    info!(
        policy = %config.policy,
        pool = config.pool.len(),
        data_file = %config.data_file.display(),
        "Starting Trojan bot"
    );
    let allocator = AddressAllocator::new(config.pool.clone(), config.policy);
    let service = LedgerService::open(&config.data_file, allocator);

    let listen = config.listen;
    let app_state = AppState {
        service: service.clone(),
        metrics: Some(metrics_handle),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/metrics", get(api::metrics))
        .route("/users/:id", get(api::user))
        .route("/telegram/:token", post(webhook::webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    info!("listening on {}", listen);
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(err) = service.flush() {
        error!(error = %err, "final snapshot write failed");
    }
    info!("shutdown complete");
    Ok(())
}

fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("install metrics recorder")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("shutdown signal received");
}
