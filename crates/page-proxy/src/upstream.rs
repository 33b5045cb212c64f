//! Client for the content service that owns the pages.
//!
//! A page arrives in chunks. Each `loadPageChunk` reply carries a slice of the
//! page's record map and a cursor; the client keeps asking with the returned
//! cursor until its stack is empty. The record tables of every chunk are
//! merged and the merged record map is the page document. Records themselves
//! are not interpreted.

use crate::config::UpstreamConfig;
use futures_util::future::BoxFuture;
use serde_json::{json, Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid notion pageId \"{0}\"")]
    InvalidPageId(String),
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream responded with status {0}")]
    Status(u16),
    #[error("upstream returned an unreadable document: {0}")]
    Decode(String),
    #[error("page did not finish within {0} chunks")]
    TooManyChunks(u32),
}

/// Source of page documents.
pub trait PageSource: Send + Sync {
    fn fetch_page<'a>(&'a self, page_id: &'a str) -> BoxFuture<'a, Result<Value, UpstreamError>>;
}

/// Turn a page reference into a dashed, lowercase UUID.
///
/// Accepts a dashed UUID, 32 bare hex digits, or a slug whose last 32
/// characters are hex (`Some-Title-0123...cdef`). A trailing query string or
/// fragment is ignored.
pub fn normalize_page_id(raw: &str) -> Option<String> {
    let raw = raw.split(|c: char| c == '?' || c == '#').next().unwrap_or_default().trim();

    let compact: String = if is_dashed_uuid(raw) {
        raw.chars().filter(|c| *c != '-').collect()
    } else if raw.len() >= 32 && raw.is_char_boundary(raw.len() - 32) {
        let tail = &raw[raw.len() - 32..];
        let prefix_ok = raw.len() == 32 || raw[..raw.len() - 32].ends_with('-');
        if !prefix_ok || !tail.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        tail.to_string()
    } else {
        return None;
    };

    let id = compact.to_ascii_lowercase();
    Some(format!(
        "{}-{}-{}-{}-{}",
        &id[0..8],
        &id[8..12],
        &id[12..16],
        &id[16..20],
        &id[20..32]
    ))
}

fn is_dashed_uuid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    let lens = [8, 4, 4, 4, 12];
    groups.len() == lens.len()
        && groups
            .iter()
            .zip(lens)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Fetches pages from a Notion-compatible `loadPageChunk` endpoint.
pub struct NotionPageSource {
    client: reqwest::Client,
    endpoint: String,
    chunk_limit: u32,
    max_chunks: u32,
}

impl NotionPageSource {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/api/v3/loadPageChunk",
                config.url.trim_end_matches('/')
            ),
            chunk_limit: config.chunk_limit,
            max_chunks: config.max_chunks,
        })
    }

    async fn load(&self, raw_id: &str) -> Result<Value, UpstreamError> {
        let page_id = normalize_page_id(raw_id)
            .ok_or_else(|| UpstreamError::InvalidPageId(raw_id.to_string()))?;

        let mut record_map = Map::new();
        let mut cursor = json!({ "stack": [] });

        for chunk_number in 0..self.max_chunks {
            let chunk = self.load_chunk(&page_id, chunk_number, &cursor).await?;
            let Value::Object(mut chunk) = chunk else {
                return Err(UpstreamError::Decode("chunk is not an object".into()));
            };

            match chunk.remove("recordMap") {
                Some(Value::Object(tables)) => merge_record_map(&mut record_map, tables),
                _ => return Err(UpstreamError::Decode("chunk has no recordMap".into())),
            }

            match chunk.remove("cursor") {
                Some(next) if has_more(&next) => cursor = next,
                _ => {
                    tracing::debug!(page_id = %page_id, chunks = chunk_number + 1, "page loaded");
                    return Ok(Value::Object(record_map));
                }
            }
        }

        tracing::warn!(page_id = %page_id, max_chunks = self.max_chunks, "page cursor never ran out");
        Err(UpstreamError::TooManyChunks(self.max_chunks))
    }

    async fn load_chunk(
        &self,
        page_id: &str,
        chunk_number: u32,
        cursor: &Value,
    ) -> Result<Value, UpstreamError> {
        let body = json!({
            "pageId": page_id,
            "limit": self.chunk_limit,
            "cursor": cursor,
            "chunkNumber": chunk_number,
            "verticalColumns": false,
        });

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

/// A cursor with a non-empty stack points at another chunk.
fn has_more(cursor: &Value) -> bool {
    cursor
        .get("stack")
        .and_then(Value::as_array)
        .is_some_and(|stack| !stack.is_empty())
}

/// Fold one chunk's tables (`block`, `collection`, ...) into `into`.
/// A record seen again in a later chunk replaces the earlier copy.
fn merge_record_map(into: &mut Map<String, Value>, tables: Map<String, Value>) {
    for (table, records) in tables {
        match (into.get_mut(&table), records) {
            (Some(Value::Object(existing)), Value::Object(records)) => existing.extend(records),
            (_, records) => {
                into.insert(table, records);
            }
        }
    }
}

impl PageSource for NotionPageSource {
    fn fetch_page<'a>(&'a self, page_id: &'a str) -> BoxFuture<'a, Result<Value, UpstreamError>> {
        Box::pin(self.load(page_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    const DASHED: &str = "067dd719-a912-471e-a9a3-ac10710e7fdf";

    #[test]
    fn accepts_bare_hex() {
        assert_eq!(
            normalize_page_id("067dd719a912471ea9a3ac10710e7fdf").as_deref(),
            Some(DASHED)
        );
    }

    #[test]
    fn accepts_dashed_and_uppercase() {
        assert_eq!(normalize_page_id(DASHED).as_deref(), Some(DASHED));
        assert_eq!(
            normalize_page_id("067DD719-A912-471E-A9A3-AC10710E7FDF").as_deref(),
            Some(DASHED)
        );
    }

    #[test]
    fn accepts_slug_with_trailing_id() {
        assert_eq!(
            normalize_page_id("Meeting-Notes-067dd719a912471ea9a3ac10710e7fdf").as_deref(),
            Some(DASHED)
        );
        assert_eq!(
            normalize_page_id("067dd719a912471ea9a3ac10710e7fdf?pvs=4").as_deref(),
            Some(DASHED)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize_page_id("").is_none());
        assert!(normalize_page_id("hello").is_none());
        assert!(normalize_page_id("067dd719a912471ea9a3ac10710e7fdz").is_none());
        assert!(normalize_page_id("x067dd719a912471ea9a3ac10710e7fdf").is_none());
        assert!(normalize_page_id("067dd719-a912-471e-a9a3").is_none());
    }

    #[test]
    fn invalid_id_fails_before_any_request() {
        let source = NotionPageSource::new(&UpstreamConfig {
            url: "http://127.0.0.1:9".into(),
            timeout_ms: 100,
            chunk_limit: 10,
            max_chunks: 5,
        })
        .unwrap();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = rt.block_on(source.fetch_page("not-a-page")).unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidPageId(ref id) if id == "not-a-page"));
    }

    #[test]
    fn endpoint_is_built_from_base_url() {
        let source = NotionPageSource::new(&UpstreamConfig {
            url: "https://www.notion.so/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(source.endpoint, "https://www.notion.so/api/v3/loadPageChunk");
    }

    type Seen = Arc<Mutex<Vec<Value>>>;

    /// Serve `loadPageChunk` from `reply`, recording every request body.
    async fn fake_upstream<F>(reply: F) -> (String, Seen)
    where
        F: Fn(&Value) -> Value + Clone + Send + Sync + 'static,
    {
        let seen: Seen = Arc::default();
        let log = seen.clone();
        let app = Router::new().route(
            "/api/v3/loadPageChunk",
            post(move |Json(req): Json<Value>| {
                let reply = reply.clone();
                let log = log.clone();
                async move {
                    let out = reply(&req);
                    log.lock().unwrap().push(req);
                    Json(out)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), seen)
    }

    fn source(url: String) -> NotionPageSource {
        NotionPageSource::new(&UpstreamConfig {
            url,
            max_chunks: 4,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn follows_cursor_and_merges_blocks() {
        let (url, seen) = fake_upstream(|req| {
            if req["chunkNumber"] == 0 {
                json!({
                    "recordMap": { "block": { "a": { "value": 1 } } },
                    "cursor": { "stack": [[{ "table": "block", "id": "b", "index": 0 }]] },
                })
            } else {
                json!({
                    "recordMap": {
                        "block": { "b": { "value": 2 } },
                        "space": { "s": { "value": 3 } },
                    },
                    "cursor": { "stack": [] },
                })
            }
        })
        .await;

        let page = source(url).fetch_page(DASHED).await.unwrap();
        assert_eq!(page["block"]["a"]["value"], 1);
        assert_eq!(page["block"]["b"]["value"], 2);
        assert_eq!(page["space"]["s"]["value"], 3);
        assert!(page.get("cursor").is_none());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["pageId"], DASHED);
        assert_eq!(seen[0]["cursor"], json!({ "stack": [] }));
        assert_eq!(seen[1]["chunkNumber"], 1);
        assert_eq!(seen[1]["cursor"]["stack"][0][0]["id"], "b");
    }

    #[tokio::test]
    async fn endless_cursor_is_cut_off() {
        let (url, seen) = fake_upstream(|_| {
            json!({
                "recordMap": { "block": {} },
                "cursor": { "stack": [[{ "table": "block", "id": "x", "index": 0 }]] },
            })
        })
        .await;

        let err = source(url).fetch_page(DASHED).await.unwrap_err();
        assert!(matches!(err, UpstreamError::TooManyChunks(4)));
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn chunk_without_record_map_is_a_decode_error() {
        let (url, _) = fake_upstream(|_| json!({ "cursor": { "stack": [] } })).await;

        let err = source(url).fetch_page(DASHED).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[test]
    fn later_chunks_add_to_existing_tables() {
        let mut merged = Map::new();
        let first = json!({ "block": { "a": 1 } });
        let second = json!({ "block": { "b": 2 }, "collection": { "c": 3 } });
        merge_record_map(&mut merged, first.as_object().unwrap().clone());
        merge_record_map(&mut merged, second.as_object().unwrap().clone());

        assert_eq!(
            Value::Object(merged),
            json!({ "block": { "a": 1, "b": 2 }, "collection": { "c": 3 } })
        );
    }
}
