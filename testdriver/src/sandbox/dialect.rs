//! Dialect adaptation (spec §4.4, §9 Open Question): when the peer is the
//! managed broker, messages pass through unchanged; when the peer is a
//! direct sandbox, outbound messages are rewritten into a compact
//! `{command, data}` shape per a fixed table.
//!
//! This table is the *intersection* of the two transport variants found in
//! the corpus, as the Open Question instructs. Kinds outside the table
//! (e.g. `drag`) pass through as `{command: kind, data: params}` unchanged;
//! [`crate::sandbox::SandboxError::UnsupportedOnDialect`] is reserved for a
//! future direct-peer command table and not produced by this mapping today.

use serde_json::{json, Value};

use super::protocol::{InboundMessage, OutboundMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Peer is the managed broker: messages pass through unchanged.
    Broker,
    /// Peer is a direct sandbox: outbound is rewritten to `{command, data}`.
    Direct,
}

/// Rewrites `msg` for the given dialect. Broker: identity. Direct: maps a
/// fixed set of `type`s to `command`s per the table in spec §4.4.
pub fn adapt_outbound(dialect: Dialect, msg: &OutboundMessage) -> Value {
    match dialect {
        Dialect::Broker => serde_json::to_value(msg).unwrap_or(Value::Null),
        Dialect::Direct => {
            let (command, data) = direct_command_and_data(&msg.kind, &msg.params);
            json!({ "command": command, "data": data, "requestId": msg.request_id })
        }
    }
}

fn direct_command_and_data(kind: &str, params: &Value) -> (String, Value) {
    match kind {
        "leftClick" => ("click".to_string(), merge(params, json!({"button": "left"}))),
        "rightClick" => ("click".to_string(), merge(params, json!({"button": "right"}))),
        "doubleClick" => ("click".to_string(), merge(params, json!({"button": "left", "double": true}))),
        "press" => {
            let keys = params.get("keys").and_then(Value::as_array);
            match keys {
                Some(k) if k.len() == 1 => ("press".to_string(), json!({"key": k[0]})),
                Some(k) => ("hotkey".to_string(), json!({"keys": k})),
                None => ("press".to_string(), params.clone()),
            }
        }
        "scroll" => {
            let direction = params.get("direction").and_then(Value::as_str).unwrap_or("down");
            let amount = params.get("amount").and_then(Value::as_i64).unwrap_or(0);
            let signed = match direction {
                "up" => -amount,
                "down" => amount,
                _ => amount,
            };
            ("scroll".to_string(), json!({"amount": signed}))
        }
        other => (other.to_string(), params.clone()),
    }
}

fn merge(base: &Value, extra: Value) -> Value {
    let mut merged = base.clone();
    if let (Value::Object(m), Value::Object(e)) = (&mut merged, extra) {
        for (k, v) in e {
            m.insert(k, v);
        }
    }
    merged
}

/// Lifts an inbound payload into the uniform shape consumers expect: on the
/// broker dialect this is already the case; on the direct dialect, a bare
/// `{requestId, success, ...}` body is already uniform too (the direct peer
/// has no `originalData` wrapper — that only exists on the broker path).
pub fn adapt_inbound(_dialect: Dialect, raw: &Value) -> InboundMessage {
    serde_json::from_value(raw.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_maps_left_click_to_click_with_button() {
        let msg = OutboundMessage {
            kind: "leftClick".to_string(),
            request_id: "r1".to_string(),
            params: json!({"x": 10, "y": 20}),
        };
        let out = adapt_outbound(Dialect::Direct, &msg);
        assert_eq!(out["command"], "click");
        assert_eq!(out["data"]["x"], 10);
        assert_eq!(out["data"]["button"], "left");
    }

    #[test]
    fn direct_maps_scroll_up_to_negative_amount() {
        let msg = OutboundMessage {
            kind: "scroll".to_string(),
            request_id: "r2".to_string(),
            params: json!({"direction": "up", "amount": 200}),
        };
        let out = adapt_outbound(Dialect::Direct, &msg);
        assert_eq!(out["data"]["amount"], -200);
    }

    #[test]
    fn direct_maps_single_key_press_to_press_and_multi_to_hotkey() {
        let single = OutboundMessage {
            kind: "press".to_string(),
            request_id: "r3".to_string(),
            params: json!({"keys": ["enter"]}),
        };
        let out = adapt_outbound(Dialect::Direct, &single);
        assert_eq!(out["command"], "press");

        let multi = OutboundMessage {
            kind: "press".to_string(),
            request_id: "r4".to_string(),
            params: json!({"keys": ["ctrl", "c"]}),
        };
        let out = adapt_outbound(Dialect::Direct, &multi);
        assert_eq!(out["command"], "hotkey");
    }

    #[test]
    fn broker_dialect_passes_through_unchanged() {
        let msg = OutboundMessage {
            kind: "leftClick".to_string(),
            request_id: "r5".to_string(),
            params: json!({"x": 1, "y": 2}),
        };
        let out = adapt_outbound(Dialect::Broker, &msg);
        assert_eq!(out["type"], "leftClick");
        assert_eq!(out["x"], 1);
    }
}
