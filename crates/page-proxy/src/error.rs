use crate::upstream::UpstreamError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failures a request handler can surface.
///
/// Upstream failures are expected and answered with 404. Anything else is a
/// fault in the proxy itself and becomes a 500.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    UpstreamFetch(#[from] UpstreamError),
    #[error("{0}")]
    Internal(String),
}

impl PageError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        PageError::Internal(e.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PageError::UpstreamFetch(_) => StatusCode::NOT_FOUND,
            PageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            PageError::UpstreamFetch(e) => {
                tracing::warn!(error = %e, "page fetch failed");
                metrics::counter!("page_proxy_upstream_failures_total").increment(1);
                (status, Json(json!({ "message": e.to_string() }))).into_response()
            }
            PageError::Internal(msg) => internal_error_response(&msg),
        }
    }
}

/// The 500 body shared by returned faults and caught panics.
pub fn internal_error_response(msg: &str) -> Response {
    tracing::error!(error = %msg, "request handler fault");
    metrics::counter!("page_proxy_faults_total").increment(1);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": msg })),
    )
        .into_response()
}
