//! Activity feed entries: one record per tool invocation, running → completed/failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::CreatedFile;

/// Reducer-local correlation id. Not issued by the server.
pub type ActivityId = u64;

/// Coarse category of a tool invocation, used for grouping and icons in a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Terminal,
    File,
    Search,
    Document,
    Compute,
    Tool,
    Error,
}

impl ActivityKind {
    /// Infer the category from a backend tool name.
    pub fn from_tool(tool: &str) -> Self {
        let t = tool.to_ascii_lowercase();
        if t == "execute_command" || t.starts_with("terminal") || t.contains("shell") {
            ActivityKind::Terminal
        } else if t.contains("file") || t == "list_directory" {
            ActivityKind::File
        } else if t.starts_with("web_search") || t.starts_with("web_news") || t == "fetch_web_page" || t.starts_with("http") {
            ActivityKind::Search
        } else if t == "save_output" || t == "list_outputs" || t.starts_with("pdf") || t.contains("document") {
            ActivityKind::Document
        } else if t == "calculator" {
            ActivityKind::Compute
        } else {
            ActivityKind::Tool
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl ActivityStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActivityStatus::Running)
    }
}

/// One tool invocation as tracked by the planning chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_created: Option<CreatedFile>,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    pub fn running(
        id: ActivityId,
        kind: ActivityKind,
        tool: impl Into<String>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            kind,
            tool: tool.into(),
            params,
            result: None,
            status: ActivityStatus::Running,
            error: None,
            file_created: None,
            timestamp: Utc::now(),
        }
    }

    /// Move to a terminal status. A failed activity is recategorised as `Error`.
    pub fn finish(
        &mut self,
        status: ActivityStatus,
        result: Option<String>,
        error: Option<String>,
        file_created: Option<CreatedFile>,
    ) {
        self.status = status;
        if result.is_some() {
            self.result = result;
        }
        if error.is_some() {
            self.error = error;
        }
        if file_created.is_some() {
            self.file_created = file_created;
        }
        if status == ActivityStatus::Failed {
            self.kind = ActivityKind::Error;
        }
    }
}
