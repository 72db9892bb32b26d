//! Gateway WebSocket protocol types (connect, chat, events).

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Wire request: `{ "type": "req", "id", "method", "params" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Wire response: `{ "type": "res", "id", "ok", "payload" or "error" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsResponse {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wire event: `{ "type": "event", "event", "payload" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    #[serde(rename = "type")]
    pub typ: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Client connect params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: Option<u32>,
    pub max_protocol: Option<u32>,
    #[serde(default)]
    pub client: ConnectClient,
    #[serde(default)]
    pub auth: ConnectAuth,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectClient {
    pub id: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAuth {
    pub token: Option<String>,
}

/// Server hello-ok payload after successful connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    #[serde(rename = "type")]
    pub typ: String,
    pub protocol: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<HelloPolicy>,
    /// Session started for this connection.
    pub session: HelloSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPolicy {
    pub tick_interval_ms: Option<u64>,
}

/// Session and thread bound to the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloSession {
    pub session_id: String,
    pub thread_id: String,
}

/// Params for WS method "chat": one user message for the connection's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParams {
    pub message: String,
}

/// Payload of a successful "chat" response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub reply: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl WsResponse {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

impl WsEvent {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "event".to_string(),
            event: event.into(),
            payload,
        }
    }

    /// `chat.message`: a message for the session shown outside a request (e.g. the welcome).
    pub fn chat_message(session_id: &str, content: &str, author: Option<&str>) -> Self {
        Self::new(
            "chat.message",
            json!({ "sessionId": session_id, "content": content, "author": author }),
        )
    }

    /// `chat.step`: progress while a chat request is handled.
    pub fn chat_step(session_id: &str, name: &str, output: &str) -> Self {
        Self::new(
            "chat.step",
            json!({ "sessionId": session_id, "name": name, "output": output }),
        )
    }

    pub fn shutdown() -> Self {
        Self::new("shutdown", json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_omits_missing_fields() {
        let ok = serde_json::to_value(WsResponse::ok("1", json!({ "a": 1 }))).unwrap();
        assert_eq!(ok, json!({ "type": "res", "id": "1", "ok": true, "payload": { "a": 1 } }));
        let err = serde_json::to_value(WsResponse::err("2", "nope")).unwrap();
        assert_eq!(err, json!({ "type": "res", "id": "2", "ok": false, "error": "nope" }));
    }

    #[test]
    fn connect_params_tolerate_empty_object() {
        let params: ConnectParams = serde_json::from_value(json!({})).unwrap();
        assert!(params.auth.token.is_none());
        let params: ConnectParams =
            serde_json::from_value(json!({ "auth": { "token": "t" }, "maxProtocol": 1 })).unwrap();
        assert_eq!(params.auth.token.as_deref(), Some("t"));
        assert_eq!(params.max_protocol, Some(1));
    }

    #[test]
    fn step_event_shape() {
        let ev = serde_json::to_value(WsEvent::chat_step("s1", "🤔 Thinking...", "done")).unwrap();
        assert_eq!(ev["type"], "event");
        assert_eq!(ev["event"], "chat.step");
        assert_eq!(ev["payload"]["sessionId"], "s1");
        assert_eq!(ev["payload"]["output"], "done");
    }
}
