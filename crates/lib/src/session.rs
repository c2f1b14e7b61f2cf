//! Sessions and the display message log.
//!
//! A session is server-side conversation state; the client only sees summaries and details
//! fetched over REST, plus the message log it builds locally from live events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique session identifier (opaque string, assigned by the server).
pub type SessionId = String;

/// Locally generated, monotonically increasing per-session message id.
pub type MessageId = u64;

/// Session summary as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub file_count: u64,
}

/// One stored conversation turn in a session detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Full session detail (summary fields plus history and workspace file lists).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetail {
    pub session_id: SessionId,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(default)]
    pub created_files: Vec<String>,
    #[serde(default)]
    pub protected_files: Vec<String>,
}

/// A file the agent wrote during a tool call (path + full content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
}

/// Logical kind of a display message.
///
/// The planning chat only produces `User`, `Assistant` and `System`; the simple chat uses the
/// full ReAct vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    System,
    Thought,
    Action,
    Observation,
    FinalAnswer,
    Error,
}

/// Display log entry. Append-only: never mutated once pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_created: Option<CreatedFile>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: MessageId, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            content: content.into(),
            tool: None,
            params: None,
            file_created: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Map<String, serde_json::Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_file(mut self, file: Option<CreatedFile>) -> Self {
        self.file_created = file;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_summary_parses_backend_shape() {
        let s: Session = serde_json::from_str(
            r#"{"session_id":"999a3a83","created_at":"2025-01-01T00:00:00","updated_at":"2025-01-02T00:00:00","message_count":4,"file_count":2}"#,
        )
        .unwrap();
        assert_eq!(s.session_id, "999a3a83");
        assert_eq!(s.message_count, 4);
        assert_eq!(s.file_count, 2);
    }

    #[test]
    fn message_builder_sets_optional_fields() {
        let mut params = serde_json::Map::new();
        params.insert("file_path".into(), serde_json::json!("a.py"));
        let m = Message::new(3, MessageKind::Action, "write_file")
            .with_tool("write_file")
            .with_params(params.clone());
        assert_eq!(m.id, 3);
        assert_eq!(m.tool.as_deref(), Some("write_file"));
        assert_eq!(m.params, Some(params));
        assert!(m.file_created.is_none());
    }
}
