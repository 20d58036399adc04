//! `ReasoningClient`: `POST {root}/api/v{n}/testdriver/{path}` (spec §4.3, §6).
//!
//! Grounded in `loom`'s `tool_source/mcp/session_http.rs` (async reqwest POST,
//! dual JSON/SSE-style body parsing, session-header threading), generalized
//! to the testdriver-specific JSONL streaming contract and 301-redirect rule.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::FatalError;
use crate::reasoning::types::StreamChunk;
use crate::session::Session;

const API_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service error: {status} {status_text}: {body}")]
    Service { status: u16, status_text: String, body: String },
    #[error("failed to parse streaming chunk: {0}")]
    ChunkParse(String),
}

/// Reasoning-service errors are never fatal on their own; a failed call is
/// handled by the agent loop's `haveAIResolveError` path, not escalated.
impl FatalError for ReasoningError {
    fn is_fatal(&self) -> bool {
        false
    }
}

/// Calls `POST {root}/api/v{n}/testdriver/{endpoint}`. Serializes concurrent
/// calls with an internal mutex to uphold I3 ("at most one in-flight
/// reasoning request per session at a time").
pub struct ReasoningClient {
    http: Client,
    api_root: String,
    api_key: Option<String>,
    session: Arc<Session>,
    inflight: AsyncMutex<()>,
}

impl ReasoningClient {
    pub fn new(api_root: impl Into<String>, api_key: Option<String>, session: Arc<Session>) -> Self {
        Self {
            http: Client::new(),
            api_root: api_root.into(),
            api_key,
            session,
            inflight: AsyncMutex::new(()),
        }
    }

    fn endpoint_url(&self, root: &str, endpoint: &str) -> String {
        format!("{}/api/v{}/testdriver/{}", root.trim_end_matches('/'), API_VERSION, endpoint)
    }

    fn build_body(&self, endpoint: &str, mut payload: Value, stream: bool) -> Value {
        if let Value::Object(ref mut map) = payload {
            if let Some(session_id) = self.session.get() {
                map.insert("session".to_string(), Value::String(session_id.to_string()));
            }
            map.insert("stream".to_string(), Value::Bool(stream));
        }
        let _ = endpoint;
        payload
    }

    /// Non-streaming call: awaits the full JSON body.
    ///
    /// If `endpoint` is `"session/start"` and the response contains a
    /// `session` string field, it is recorded via [`Session::set`] (set-once).
    pub async fn call(&self, endpoint: &str, payload: Value) -> Result<Value, ReasoningError> {
        let _guard = self.inflight.lock().await;
        let body = self.build_body(endpoint, payload, false);
        let resp = self.post_with_redirect(endpoint, &body).await?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ReasoningError::Service {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: text,
            });
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ReasoningError::Transport(format!("response json: {e}")))?;
        if endpoint == "session/start" {
            if let Some(sid) = value.get("session").and_then(Value::as_str) {
                self.session.set(sid);
            }
        }
        Ok(value)
    }

    /// Streaming call: consumes an `application/jsonl` body line-by-line,
    /// invoking `sink` per [`StreamChunk`], then returns the joined `data`
    /// values as a JSON array (the unary surface is a convenience that
    /// awaits this joined result, per spec §9 "Streaming consumption").
    pub async fn call_streaming(
        &self,
        endpoint: &str,
        payload: Value,
        mut sink: impl FnMut(StreamChunk),
    ) -> Result<Vec<Value>, ReasoningError> {
        let _guard = self.inflight.lock().await;
        let body = self.build_body(endpoint, payload, true);
        let resp = self.post_with_redirect(endpoint, &body).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ReasoningError::Service {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: text,
            });
        }
        let text = resp
            .text()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;
        let mut collected = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let chunk: StreamChunk =
                serde_json::from_str(line).map_err(|e| ReasoningError::ChunkParse(e.to_string()))?;
            collected.push(chunk.data.clone());
            sink(chunk);
        }
        Ok(collected)
    }

    /// POSTs once; if the response is `301` with a body that is a bare path
    /// string, retries once against `{api_root}{path}` with the same
    /// payload (spec §4.3 "a single retry").
    async fn post_with_redirect(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<reqwest::Response, ReasoningError> {
        let first = self.post_once(&self.api_root, endpoint, body).await?;
        if first.status() == StatusCode::MOVED_PERMANENTLY {
            let redirect_path = first
                .text()
                .await
                .map_err(|e| ReasoningError::Transport(e.to_string()))?;
            let new_root = format!("{}{}", self.api_root.trim_end_matches('/'), redirect_path.trim());
            return self.post_once(&new_root, endpoint, body).await;
        }
        Ok(first)
    }

    async fn post_once(
        &self,
        root: &str,
        endpoint: &str,
        body: &Value,
    ) -> Result<reqwest::Response, ReasoningError> {
        let url = self.endpoint_url(root, endpoint);
        let mut req = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send().await.map_err(|e| ReasoningError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_matches_wire_format() {
        let client = ReasoningClient::new("https://api.testdriver.ai", None, Arc::new(Session::new()));
        assert_eq!(
            client.endpoint_url("https://api.testdriver.ai", "session/start"),
            "https://api.testdriver.ai/api/v1/testdriver/session/start"
        );
    }

    #[test]
    fn build_body_injects_session_and_stream_flag() {
        let session = Arc::new(Session::new());
        session.set("abc-123");
        let client = ReasoningClient::new("https://api.testdriver.ai", None, session);
        let body = client.build_body("input", serde_json::json!({"prompt": "go"}), true);
        assert_eq!(body["session"], "abc-123");
        assert_eq!(body["stream"], true);
        assert_eq!(body["prompt"], "go");
    }
}
