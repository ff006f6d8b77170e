use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use markup_gateway::build_router;
use markup_gateway::config::Args;
use markup_gateway::state::AppState;
use markup_gateway::store::{MemoryStore, Seed, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli args
    let args = Args::parse();

    let store: Arc<dyn Store> = match &args.seed {
        Some(path) => {
            let seed = Seed::load(path)
                .await
                .with_context(|| format!("loading seed file {}", path.display()))?;
            tracing::info!(path = %path.display(), "seeded in-memory store");
            Arc::new(MemoryStore::from_seed(seed))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let settings = args.settings();
    tracing::info!(
        port = args.port,
        cache_ttl = args.cache_ttl,
        public_per_minute = settings.presets.public_per_minute,
        public_per_hour = settings.presets.public_per_hour,
        project_per_day = settings.presets.project_per_day,
        default_plan_limit = settings.default_plan_limit,
        "starting markup gateway"
    );

    let state = AppState::new(store, settings);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("failed to install terminate handler: {e}");
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
}
