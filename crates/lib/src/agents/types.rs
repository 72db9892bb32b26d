//! Wire types for the agent service (agents, threads, messages, runs).
//!
//! Only the fields the gateway relies on are typed. Message attributes outside
//! the known schema are kept in insertion order so reply extraction can still
//! look at them when the content shape changes between service versions.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An agent (assistant) definition as returned by `GET /assistants/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// A conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Author of a thread message. Anything other than user/assistant is kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Other => "other",
        }
    }
}

/// One message in a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub id: String,
    pub role: MessageRole,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    /// Usually a list of typed blocks (`{"type":"text","text":{"value":...}}`); may be a plain string.
    #[serde(default)]
    pub content: Value,
    /// Attributes outside the typed schema, in the order received.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadMessage {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

/// Body for `POST /threads/{id}/messages`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateMessageRequest<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Body for `POST /threads/{id}/runs`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
}

/// Page returned by `GET /threads/{id}/messages`.
#[derive(Debug, Deserialize)]
pub(crate) struct MessagePage {
    #[serde(default)]
    pub data: Vec<ThreadMessage>,
    #[serde(default)]
    pub last_id: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Sort order for listing thread messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    Ascending,
    Descending,
}

impl ListOrder {
    pub fn as_query(&self) -> &'static str {
        match self {
            ListOrder::Ascending => "asc",
            ListOrder::Descending => "desc",
        }
    }
}

/// Lifecycle state of a run. Unrecognized states are kept as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }

    /// Not yet terminal; keep polling. A cancel request answers with `cancelling`.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RunStatus::Queued
                | RunStatus::InProgress
                | RunStatus::RequiresAction
                | RunStatus::Cancelling
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RunError {
    pub fn is_empty(&self) -> bool {
        self.code.as_deref().map_or(true, str::is_empty)
            && self.message.as_deref().map_or(true, str::is_empty)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code.as_deref().filter(|s| !s.is_empty());
        let message = self.message.as_deref().filter(|s| !s.is_empty());
        match (code, message) {
            (Some(c), Some(m)) => write!(f, "{}: {}", c, m),
            (Some(c), None) => f.write_str(c),
            (None, Some(m)) => f.write_str(m),
            (None, None) => Ok(()),
        }
    }
}

/// Required action on a run (tool outputs the service is waiting for).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type", default)]
    pub typ: String,
}

/// One processing run of an agent against a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    /// Direct result payload, when the service returns one with the run.
    #[serde(default)]
    pub result: Option<Value>,
}

impl Run {
    /// Error text for a failed run, if the service provided any.
    pub fn error_detail(&self) -> Option<String> {
        self.last_error
            .as_ref()
            .filter(|e| !e.is_empty())
            .map(|e| e.to_string())
    }

    /// Non-empty direct result text, when present.
    pub fn direct_result(&self) -> Option<String> {
        let text = match self.result.as_ref()? {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_keeps_unknown_attributes_in_order() {
        let msg: ThreadMessage = serde_json::from_value(json!({
            "id": "msg_1",
            "object": "thread.message",
            "role": "assistant",
            "created_at": 1_700_000_000,
            "content": [],
            "summary_text": "first",
            "alt_content": "second"
        }))
        .unwrap();
        assert!(msg.is_assistant());
        let keys: Vec<&str> = msg.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["object", "summary_text", "alt_content"]);
        assert_eq!(
            msg.created_at_utc().map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn unknown_role_and_status_are_tolerated() {
        let msg: ThreadMessage =
            serde_json::from_value(json!({ "role": "system", "content": "x" })).unwrap();
        assert_eq!(msg.role, MessageRole::Other);

        let run: Run =
            serde_json::from_value(json!({ "id": "run_1", "status": "paused" })).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_pending());
    }

    #[test]
    fn cancelling_is_not_terminal() {
        assert!(RunStatus::Cancelling.is_pending());
        for status in [
            RunStatus::Cancelled,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Expired,
            RunStatus::Incomplete,
        ] {
            assert!(!status.is_pending(), "{} is terminal", status);
        }
    }

    #[test]
    fn run_error_display() {
        let run: Run = serde_json::from_value(json!({
            "id": "run_1",
            "status": "failed",
            "last_error": { "code": "rate_limit_exceeded", "message": "Rate limit is exceeded." }
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.error_detail().as_deref(),
            Some("rate_limit_exceeded: Rate limit is exceeded.")
        );

        let empty = Run {
            last_error: Some(RunError::default()),
            ..run
        };
        assert_eq!(empty.error_detail(), None);
    }

    #[test]
    fn direct_result_skips_blank() {
        let mut run: Run =
            serde_json::from_value(json!({ "id": "r", "status": "completed" })).unwrap();
        assert_eq!(run.direct_result(), None);
        run.result = Some(json!("  "));
        assert_eq!(run.direct_result(), None);
        run.result = Some(json!("done"));
        assert_eq!(run.direct_result().as_deref(), Some("done"));
    }
}
