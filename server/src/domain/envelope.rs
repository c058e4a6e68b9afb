//! The message envelope
//!
//! Every channel message shares this shape. Envelopes are immutable once
//! persisted; `id` is the primary key everywhere (log, replay, client dedup).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted channel message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 26-char sortable identifier, unique across all channels
    pub id: String,
    /// Fractional seconds since the epoch
    pub ts: f64,
    pub from: String,
    pub ch: String,
    /// Dot-namespaced message type, e.g. `task.claimed`
    #[serde(rename = "type")]
    pub kind: String,
    pub v: i64,
    pub body: Value,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Client-supplied portion of a publish
///
/// `id`, `ts` and `ch` are always server-assigned; anything else the client
/// sends for them is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default = "default_v")]
    pub v: i64,
    #[serde(default = "empty_object")]
    pub body: Value,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl Default for PublishRequest {
    fn default() -> Self {
        Self {
            from: String::new(),
            kind: String::new(),
            v: default_v(),
            body: empty_object(),
            files: Vec::new(),
            reply_to: None,
        }
    }
}

fn default_v() -> i64 {
    1
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_request_defaults() {
        let req: PublishRequest = serde_json::from_str(r#"{"from":"u","type":"t"}"#).unwrap();
        assert_eq!(req.from, "u");
        assert_eq!(req.kind, "t");
        assert_eq!(req.v, 1);
        assert_eq!(req.body, empty_object());
        assert!(req.files.is_empty());
        assert!(req.reply_to.is_none());
    }

    #[test]
    fn test_publish_request_ignores_server_fields() {
        let req: PublishRequest =
            serde_json::from_str(r#"{"from":"u","type":"t","id":"X","ts":1.0,"ch":"nope"}"#)
                .unwrap();
        assert_eq!(req.from, "u");
    }

    #[test]
    fn test_envelope_type_key_round_trip() {
        let env = Envelope {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".into(),
            ts: 1700000000.25,
            from: "agent".into(),
            ch: "alpha".into(),
            kind: "chat.message".into(),
            v: 1,
            body: serde_json::json!({"k": 1}),
            files: vec![],
            reply_to: None,
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""type":"chat.message""#));
        assert!(!json.contains("reply_to"));

        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }
}
