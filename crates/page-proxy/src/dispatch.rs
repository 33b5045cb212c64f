use crate::error::internal_error_response;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Middleware that keeps a panicking handler from taking its connection down.
///
/// The wrapped handler's response passes through untouched. If it panics,
/// the panic is logged and answered with a 500 `{"error": ...}` body.
/// Handlers that return `Err(PageError::Internal)` produce the same response
/// through `IntoResponse`.
pub async fn isolate_faults(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::error!(%method, %path, panic = %msg, "handler panicked");
            internal_error_response(&msg)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
