//! Wire shapes for the sandbox websocket protocol (spec §6).
//!
//! Grounded in `loom`'s `protocol/mod.rs` tagged-request/response style,
//! generalized from JSON-RPC-over-MCP to the flat `{type, requestId}` /
//! `{requestId, success, ...}` shape the sandbox peer actually speaks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound message: `{type, ...params, requestId}` (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(flatten)]
    pub params: Value,
}

/// `originalData` wrapper used by the managed broker dialect to nest the
/// peer's own response shape.
#[derive(Debug, Clone, Deserialize)]
pub struct OriginalData {
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Inbound message: either `{requestId, success?, result?|out?|base64?|errorMessage?}`
/// directly, or (via broker) `{originalData:{requestId, command}, ...}` (spec §6).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InboundMessage {
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub out: Option<Value>,
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(rename = "originalData", default)]
    pub original_data: Option<OriginalData>,
}

impl InboundMessage {
    /// Resolves the correlation id: the top-level `requestId`, or (broker
    /// dialect) `originalData.requestId` once lifted.
    pub fn correlation_id(&self) -> Option<&str> {
        self.request_id
            .as_deref()
            .or_else(|| self.original_data.as_ref().and_then(|o| o.request_id.as_deref()))
    }

    /// Whichever payload field is present, preferring `result`, then `out`,
    /// then `base64` (spec §6 `result?|out?|base64?`).
    pub fn payload(&self) -> Option<Value> {
        self.result
            .clone()
            .or_else(|| self.out.clone())
            .or_else(|| self.base64.clone().map(Value::String))
    }
}

/// Sandbox instance metadata (spec §3), referenced by every remote primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInstance {
    pub id: String,
    pub ip: String,
    #[serde(rename = "vncPort")]
    pub vnc_port: u16,
    pub os: String,
    pub resolution: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlation_id_prefers_top_level_request_id() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "requestId": "r1",
            "success": true,
        }))
        .unwrap();
        assert_eq!(msg.correlation_id(), Some("r1"));
    }

    #[test]
    fn correlation_id_falls_back_to_original_data() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "originalData": {"requestId": "r2", "command": "click"},
            "result": true,
        }))
        .unwrap();
        assert_eq!(msg.correlation_id(), Some("r2"));
        assert_eq!(msg.payload(), Some(Value::Bool(true)));
    }

    #[test]
    fn payload_prefers_result_then_out_then_base64() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "requestId": "r3",
            "out": "stdout text",
            "base64": "Zm9v",
        }))
        .unwrap();
        assert_eq!(msg.payload(), Some(Value::String("stdout text".to_string())));
    }
}
