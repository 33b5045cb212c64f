use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use page_cache::PageCache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Install the global Prometheus recorder and serve `/metrics` on `addr`
/// until `shutdown` fires.
pub async fn run_metrics_server(addr: String, shutdown: CancellationToken) {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "failed to install prometheus recorder");
            return;
        }
    };

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => {
            tracing::info!(addr = %addr, "metrics server listening");
            l
        }
        Err(e) => {
            tracing::error!(error = %e, addr = %addr, "failed to bind metrics server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, metrics_router(handle))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "metrics server error");
    }
}

fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}

/// Periodically drop expired cache entries and publish the cache size.
///
/// Lookups already refuse expired entries, so this only bounds how long dead
/// pages occupy memory.
pub async fn cache_janitor(cache: Arc<PageCache>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let purged = cache.purge_expired();
        let stats = cache.stats();
        metrics::gauge!("page_proxy_cache_entries").set(stats.current_size as f64);
        if purged > 0 {
            tracing::debug!(
                purged,
                size = stats.current_size,
                hit_rate = stats.hit_rate(),
                "purged expired cache entries"
            );
        }
    }
}
