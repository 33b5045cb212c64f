use crate::cache_layer::response_cache;
use crate::dispatch::isolate_faults;
use crate::error::PageError;
use crate::upstream::PageSource;
use axum::extract::{Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use page_cache::PageCache;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

/// Route pattern advertised by the diagnostic endpoint.
pub const PAGE_ROUTE: &str = "/page/:pageId";

/// Shared application state passed to all handlers.
pub struct AppState {
    pub source: Arc<dyn PageSource>,
    pub cache: Arc<PageCache>,
    pub max_body_size: usize,
}

/// Assemble the public router.
///
/// Layer order, outermost first: access log, CORS, response cache. The page
/// route additionally runs inside the fault-isolation middleware. It matches
/// with or without a trailing slash, and any method other than GET or HEAD
/// on it gets the same 404 as an unknown path.
pub fn build_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let page = get(page_handler)
        .fallback(catch_all)
        .layer(middleware::from_fn(isolate_faults));

    Router::new()
        .route("/page/{page_id}", page.clone())
        .route("/page/{page_id}/", page)
        .fallback(catch_all)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            response_cache,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    tracing::info_span!("request", method = %req.method(), uri = %req.uri())
                })
                .on_response(|resp: &Response, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = resp.status().as_u16(),
                        latency_ms = latency.as_millis() as u64,
                        "request served"
                    );
                }),
        )
        .with_state(state)
}

/// GET /page/{page_id} — the upstream document, verbatim.
pub async fn page_handler(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
) -> Result<Response, PageError> {
    let page = state.source.fetch_page(&page_id).await?;
    let body = serde_json::to_vec(&page).map_err(PageError::internal)?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response())
}

/// Everything else: a fixed listing of the supported routes.
pub async fn catch_all(method: Method, uri: Uri) -> Response {
    if method == Method::GET || method == Method::HEAD {
        return (
            StatusCode::OK,
            Json(json!({ "message": "OK", "routes": [PAGE_ROUTE] })),
        )
            .into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": format!("Cannot {method} {}", uri.path()) })),
    )
        .into_response()
}
