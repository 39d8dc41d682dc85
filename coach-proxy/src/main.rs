//! coach-proxy: forwards chat requests to the model API with the
//! server-held credential, buffered with retry or streamed as SSE.

mod config;
mod error;
mod proxy;
mod retry;
mod routes;
mod state;
#[cfg(test)]
mod testing;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, CREDENTIAL_VARS};
use crate::state::AppState;
use crate::upstream::HttpUpstream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cfg = Config::from_env();
    init_tracing(&cfg);

    info!(version = env!("CARGO_PKG_VERSION"), "coach-proxy starting");
    if cfg.credential.is_none() {
        warn!(
            vars = ?CREDENTIAL_VARS,
            "no upstream credential configured; chat requests will fail with 500"
        );
    }
    let upstream = Arc::new(HttpUpstream::new(&cfg.upstream_url));
    info!(
        endpoint = %upstream.endpoint(),
        model = %cfg.default_model,
        default_stream = cfg.default_stream,
        max_attempts = cfg.retry.max_attempts,
        retry_delay_ms = cfg.retry.delay.as_millis() as u64,
        "proxy configured"
    );

    let addr: SocketAddr = cfg.bind_address.parse()?;
    let state = Arc::new(AppState::new(cfg, upstream));
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("coach-proxy stopped");
    Ok(())
}

fn init_tracing(cfg: &Config) {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: COACH_LOG='{}' is not a valid tracing filter ({}); falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
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
