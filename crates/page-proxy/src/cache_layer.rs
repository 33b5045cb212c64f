use crate::error::internal_error_response;
use crate::routes::AppState;
use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::BodyExt;
use page_cache::CachedPage;
use std::sync::Arc;
use std::time::Instant;

pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Response cache in front of every GET route, keyed by URI path.
///
/// Hits are answered from memory without touching the inner service. On a
/// miss the inner response is buffered and stored when it is a 2xx whose
/// body fits `max_body_size`. Error responses always go to the client
/// uncached.
pub async fn response_cache(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::GET {
        return next.run(req).await;
    }

    let start = Instant::now();
    let key = req.uri().path().to_owned();

    if let Some(cached) = state.cache.get(&key) {
        metrics::counter!("page_proxy_cache_hits_total").increment(1);
        tracing::debug!(
            key = %key,
            latency_us = start.elapsed().as_micros() as u64,
            "cache HIT"
        );
        return cached_response(&cached);
    }
    metrics::counter!("page_proxy_cache_misses_total").increment(1);

    let (mut parts, body) = next.run(req).await.into_parts();

    let fits = body
        .size_hint()
        .upper()
        .is_some_and(|n| n <= state.max_body_size as u64);
    if !parts.status.is_success() || !fits {
        tracing::debug!(
            key = %key,
            status = parts.status.as_u16(),
            "cache MISS, response not stored"
        );
        parts.headers.insert(X_CACHE.clone(), HeaderValue::from_static("MISS"));
        return Response::from_parts(parts, body);
    }

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return internal_error_response(&format!("failed to buffer response body: {e}")),
    };

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.cache.insert(
        key.clone(),
        CachedPage::new(parts.status.as_u16(), content_type, bytes.clone()),
    );

    tracing::debug!(
        key = %key,
        status = parts.status.as_u16(),
        size = bytes.len(),
        latency_us = start.elapsed().as_micros() as u64,
        "cache MISS, stored"
    );

    parts.headers.insert(X_CACHE.clone(), HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(page: &CachedPage) -> Response {
    let mut resp = Response::new(Body::from(page.body.clone()));
    *resp.status_mut() = StatusCode::from_u16(page.status).unwrap_or(StatusCode::OK);

    let headers = resp.headers_mut();
    if let Some(ct) = page
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(CONTENT_TYPE, ct);
    }
    headers.insert(X_CACHE.clone(), HeaderValue::from_static("HIT"));
    resp
}
