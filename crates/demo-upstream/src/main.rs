use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Child blocks under every demo page.
const CHILDREN: u32 = 5;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadPageChunk {
    page_id: String,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    chunk_number: u32,
}

/// Pages whose first UUID group is all zeros do not exist.
fn exists(page_id: &str) -> bool {
    !page_id.starts_with("00000000")
}

fn text_block(page_id: &str, i: u32) -> (String, Value) {
    let id = format!("{page_id}-child-{i}");
    let value = json!({
        "role": "reader",
        "value": {
            "id": id,
            "type": "text",
            "properties": { "title": [["x".repeat(64)]] },
            "parent_id": page_id,
        }
    });
    (id, value)
}

/// Chunk `n` carries children `n*limit ..`; the page block rides in chunk 0.
async fn load_page_chunk(Json(req): Json<LoadPageChunk>) -> (StatusCode, Json<Value>) {
    // Simulate upstream latency (5-20ms)
    let delay = rand::thread_rng().gen_range(5..=20);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    if !exists(&req.page_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "errorId": "not_found", "name": "ValidationError" })),
        );
    }

    let limit = req.limit.unwrap_or(100).max(1);
    let first = req.chunk_number.saturating_mul(limit).min(CHILDREN);
    let last = first.saturating_add(limit).min(CHILDREN);

    let mut block = serde_json::Map::new();
    if req.chunk_number == 0 {
        let children: Vec<String> = (1..=CHILDREN)
            .map(|i| format!("{}-child-{i}", req.page_id))
            .collect();
        let title = format!("Demo page {}", req.page_id.chars().take(8).collect::<String>());
        block.insert(
            req.page_id.clone(),
            json!({
                "role": "reader",
                "value": {
                    "id": req.page_id,
                    "type": "page",
                    "properties": { "title": [[title]] },
                    "content": children,
                }
            }),
        );
    }
    for i in first + 1..=last {
        let (id, value) = text_block(&req.page_id, i);
        block.insert(id, value);
    }

    let stack = if last < CHILDREN {
        json!([[{ "table": "block", "id": req.page_id, "index": last }]])
    } else {
        json!([])
    };

    (
        StatusCode::OK,
        Json(json!({
            "recordMap": { "block": block },
            "cursor": { "stack": stack },
            "latency_ms": delay,
        })),
    )
}

async fn health() -> &'static str {
    "ok"
}

fn app() -> Router {
    Router::new()
        .route("/api/v3/loadPageChunk", post(load_page_chunk))
        .route("/health", get(health))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = "0.0.0.0:3000";
    tracing::info!(addr, "demo upstream starting");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr, "failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app()).await {
        tracing::error!(error = %e, "demo upstream stopped");
    }
}
