mod cache_layer;
mod config;
mod cors;
mod dispatch;
mod error;
mod routes;
mod server;
mod telemetry;
mod upstream;

use config::Config;
use page_cache::PageCache;
use routes::AppState;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use upstream::NotionPageSource;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = match load_config(Path::new(CONFIG_PATH)) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let addr = match config.listen_addr() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "invalid listen address");
            return ExitCode::FAILURE;
        }
    };

    let cors = match cors::cors_layer(&config.cors) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid CORS configuration");
            return ExitCode::FAILURE;
        }
    };

    let source = match NotionPageSource::new(&config.upstream) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to build upstream client");
            return ExitCode::FAILURE;
        }
    };

    let cache = Arc::new(PageCache::new(config.cache.capacity, config.cache.ttl()));
    tracing::info!(
        capacity = cache.capacity(),
        ttl_seconds = config.cache.ttl_seconds,
        "cache initialized"
    );

    let state = Arc::new(AppState {
        source: Arc::new(source),
        cache: Arc::clone(&cache),
        max_body_size: config.cache.max_body_size_bytes,
    });
    let app = routes::build_router(state, cors);

    let shutdown = CancellationToken::new();

    if let Some(metrics_addr) = config.server.metrics_addr.clone() {
        tokio::spawn(telemetry::run_metrics_server(metrics_addr, shutdown.clone()));
    }
    tokio::spawn(telemetry::cache_janitor(
        Arc::clone(&cache),
        config.cache.ttl(),
        shutdown.clone(),
    ));
    tokio::spawn(server::shutdown_signal(shutdown.clone()));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %addr, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        addr = %addr,
        upstream = %config.upstream.url,
        cors_origin = %config.cors.origin,
        "page proxy running on port {}",
        config.server.port
    );

    let result = server::serve(listener, app, shutdown.clone(), config.server.shutdown_grace()).await;
    shutdown.cancel();

    match result {
        Ok(()) => {
            tracing::info!("page proxy shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

/// Defaults, then `config.toml` if present, then env overrides.
fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    let mut config = if path.exists() {
        match Config::load(path) {
            Ok(c) => {
                tracing::info!(path = %path.display(), "loaded config");
                c
            }
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "failed to load config, using defaults");
                Config::default()
            }
        }
    } else {
        tracing::info!("no config.toml found, using defaults");
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
