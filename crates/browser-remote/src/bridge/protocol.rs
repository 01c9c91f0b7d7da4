//! Wire protocol types for host <-> native peer communication.
//!
//! Both directions carry one JSON object per frame:
//! - **To native**: a query tagged with a correlation id
//! - **From native**: the answer, echoing the id it was sent with

use serde::{Deserialize, Serialize};

/// Unique identifier tying a native response back to its HTTP request.
///
/// UUID v4 so that identifiers are never reused while outstanding and cannot be
/// guessed from one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let uuid = uuid::Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message from the host to the native peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToNative {
    /// Empty for unsolicited pushes that expect no answer.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub query: String,
    /// Which tabs to evaluate in: "front" (the peer's default) or "all".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabs: Option<String>,
}

impl MessageToNative {
    pub fn query(id: CorrelationId, query: impl Into<String>, tabs: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            query: query.into(),
            tabs,
        }
    }
}

/// Message from the native peer to the host.
///
/// Every field defaults so that partial messages (status pushes, older peers
/// that send `result` instead of `results`) still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageFromNative {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
}

impl MessageFromNative {
    /// Correlation id, if the message answers a request.
    pub fn correlation_id(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(&self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_id() -> CorrelationId {
        CorrelationId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap()
    }

    #[test]
    fn query_serializes() {
        let msg = MessageToNative::query(test_id(), "location.href", None);
        insta::assert_json_snapshot!(msg, @r#"
        {
          "id": "550e8400-e29b-41d4-a716-446655440000",
          "query": "location.href"
        }
        "#);
    }

    #[test]
    fn query_with_tabs_serializes() {
        let msg = MessageToNative::query(test_id(), "document.title", Some("all".to_string()));
        insta::assert_json_snapshot!(msg, @r#"
        {
          "id": "550e8400-e29b-41d4-a716-446655440000",
          "query": "document.title",
          "tabs": "all"
        }
        "#);
    }

    #[test]
    fn response_with_single_result_deserializes() {
        let msg: MessageFromNative =
            serde_json::from_value(json!({"id": "abc", "status": "ok", "result": "john"})).unwrap();
        assert_eq!(msg.correlation_id(), Some("abc"));
        assert_eq!(msg.status, "ok");
        assert_eq!(msg.result, Some(json!("john")));
        assert!(msg.results.is_none());
    }

    #[test]
    fn response_with_results_array_deserializes() {
        let msg: MessageFromNative = serde_json::from_value(json!({
            "id": "abc",
            "status": "ok",
            "results": ["https://example.com", "https://example.org"]
        }))
        .unwrap();
        assert!(msg.result.is_none());
        assert_eq!(
            msg.results,
            Some(json!(["https://example.com", "https://example.org"]))
        );
    }

    #[test]
    fn status_push_has_no_correlation_id() {
        let msg: MessageFromNative = serde_json::from_value(json!({"status": "ready"})).unwrap();
        assert_eq!(msg.correlation_id(), None);
    }

    #[test]
    fn correlation_id_display_parses_back() {
        let id = CorrelationId::new();
        assert_eq!(CorrelationId::parse(&id.to_string()).unwrap(), id);
    }
}
