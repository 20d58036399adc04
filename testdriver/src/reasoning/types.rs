//! Wire types for the reasoning service endpoint family (spec §6).

use serde::Deserialize;
use serde_json::Value;

/// One line of a `application/jsonl` streaming response: `{type, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}
