//! Live connection wire protocol: JSON frames discriminated by `type`.
//!
//! Client → server frames are [`ClientFrame`]; server → client frames are [`ServerEvent`].
//! Frames may carry an integer `version`; absent means [`PROTOCOL_VERSION`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::activity::{ActivityKind, ActivityStatus};
use crate::plan::{Deliverable, ExecutionPlan, Section};
use crate::session::CreatedFile;

pub const PROTOCOL_VERSION: u32 = 1;

pub type Params = serde_json::Map<String, serde_json::Value>;

/// Treat an explicit `null` the same as a missing field.
fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Chat { content: String },
    Interrupt,
    Suggestion { content: String },
    RequestPlan { content: String },
    ApprovePlan,
    UpdatePlan { modifications: serde_json::Value },
    PauseExecution,
    ResumeExecution,
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Chat { .. } => "chat",
            ClientFrame::Interrupt => "interrupt",
            ClientFrame::Suggestion { .. } => "suggestion",
            ClientFrame::RequestPlan { .. } => "request_plan",
            ClientFrame::ApprovePlan => "approve_plan",
            ClientFrame::UpdatePlan { .. } => "update_plan",
            ClientFrame::PauseExecution => "pause_execution",
            ClientFrame::ResumeExecution => "resume_execution",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Events the server streams to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        #[serde(default, deserialize_with = "nullable")]
        session_id: String,
        #[serde(default, deserialize_with = "nullable")]
        workspace: String,
    },
    Initializing {
        #[serde(default, alias = "content", deserialize_with = "nullable")]
        message: String,
    },
    SessionReady {
        session_id: String,
        #[serde(default, deserialize_with = "nullable")]
        workspace: String,
    },
    Processing {
        #[serde(default, deserialize_with = "nullable")]
        task: String,
    },
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Thought {
        #[serde(default, deserialize_with = "nullable")]
        content: String,
    },
    Action {
        tool: String,
        #[serde(default, deserialize_with = "nullable")]
        params: Params,
    },
    Observation {
        #[serde(default, deserialize_with = "nullable")]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_created: Option<CreatedFile>,
    },
    Activity {
        #[serde(default, alias = "kind", skip_serializing_if = "Option::is_none")]
        activity_type: Option<ActivityKind>,
        #[serde(default, deserialize_with = "nullable")]
        tool: String,
        #[serde(default, deserialize_with = "nullable")]
        params: Params,
        #[serde(default, deserialize_with = "nullable")]
        status: ActivityStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_created: Option<CreatedFile>,
    },
    PlanProposal {
        plan: ExecutionPlan,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan_markdown: Option<String>,
    },
    PlanUpdated {
        plan: ExecutionPlan,
    },
    PlanStarted {
        plan: ExecutionPlan,
    },
    FinalAnswer {
        #[serde(default, deserialize_with = "nullable")]
        content: String,
    },
    Error {
        #[serde(default, alias = "content", deserialize_with = "nullable")]
        message: String,
    },
    Interrupted,
    Interrupting,
    Complete {
        #[serde(default, deserialize_with = "nullable")]
        task: String,
    },
    SuggestionReceived {
        #[serde(default, deserialize_with = "nullable")]
        content: String,
    },
    SuggestionApplied {
        #[serde(default, deserialize_with = "nullable")]
        content: String,
    },
    Recovery {
        #[serde(default, alias = "message", deserialize_with = "nullable")]
        content: String,
    },

    // Project execution (multi-deliverable) events.
    ProjectAnalyzing,
    ProjectPlanning,
    ProjectPlanCreated {
        plan: ExecutionPlan,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan_markdown: Option<String>,
    },
    ProjectPlanUpdated {
        plan: ExecutionPlan,
    },
    ProjectPendingApproval,
    ProjectExecutionStarted,
    ProjectPaused,
    ProjectResumed,
    ProjectCompleted {
        #[serde(default, deserialize_with = "nullable")]
        result: ProjectOutcome,
    },
    ProjectFailed {
        #[serde(default, alias = "message", deserialize_with = "nullable")]
        error: String,
    },
    DeliverableStarted {
        deliverable: Deliverable,
    },
    DeliverableCompleted {
        result: DeliverableOutcome,
    },
    SectionStarted {
        section: Section,
    },
    SectionCompleted {
        result: SectionOutcome,
    },
}

/// Outcome of one section, as carried by `section_completed` and inside deliverable results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionOutcome {
    #[serde(default, deserialize_with = "nullable")]
    pub section_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    /// Leading part of the generated content; the server truncates it.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub files_created: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliverableOutcome {
    #[serde(default, deserialize_with = "nullable")]
    pub deliverable_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub section_results: Vec<SectionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectOutcome {
    #[serde(default, deserialize_with = "nullable")]
    pub task: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub deliverable_results: Vec<DeliverableOutcome>,
    #[serde(default, deserialize_with = "nullable")]
    pub final_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
}

impl ProjectOutcome {
    fn count(&self, status: &str) -> usize {
        self.deliverable_results.iter().filter(|d| d.status == status).count()
    }

    pub fn deliverables_completed(&self) -> usize {
        self.count("completed")
    }

    pub fn deliverables_failed(&self) -> usize {
        self.count("failed")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid json: {0}")]
    Json(#[source] serde_json::Error),
    #[error("unsupported protocol version {0}")]
    Version(u64),
    #[error("unrecognised event: {0}")]
    Event(#[source] serde_json::Error),
}

/// Decode one text frame into a server event.
pub fn decode_event(text: &str) -> Result<ServerEvent, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
    if let Some(v) = value.get("version").and_then(|v| v.as_u64()) {
        if v > PROTOCOL_VERSION as u64 {
            return Err(DecodeError::Version(v));
        }
    }
    ServerEvent::deserialize(value).map_err(DecodeError::Event)
}

impl ServerEvent {
    /// Wire name of the event (`type` field).
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Initializing { .. } => "initializing",
            ServerEvent::SessionReady { .. } => "session_ready",
            ServerEvent::Processing { .. } => "processing",
            ServerEvent::Status { .. } => "status",
            ServerEvent::Thought { .. } => "thought",
            ServerEvent::Action { .. } => "action",
            ServerEvent::Observation { .. } => "observation",
            ServerEvent::Activity { .. } => "activity",
            ServerEvent::PlanProposal { .. } => "plan_proposal",
            ServerEvent::PlanUpdated { .. } => "plan_updated",
            ServerEvent::PlanStarted { .. } => "plan_started",
            ServerEvent::FinalAnswer { .. } => "final_answer",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Interrupted => "interrupted",
            ServerEvent::Interrupting => "interrupting",
            ServerEvent::Complete { .. } => "complete",
            ServerEvent::SuggestionReceived { .. } => "suggestion_received",
            ServerEvent::SuggestionApplied { .. } => "suggestion_applied",
            ServerEvent::Recovery { .. } => "recovery",
            ServerEvent::ProjectAnalyzing => "project_analyzing",
            ServerEvent::ProjectPlanning => "project_planning",
            ServerEvent::ProjectPlanCreated { .. } => "project_plan_created",
            ServerEvent::ProjectPlanUpdated { .. } => "project_plan_updated",
            ServerEvent::ProjectPendingApproval => "project_pending_approval",
            ServerEvent::ProjectExecutionStarted => "project_execution_started",
            ServerEvent::ProjectPaused => "project_paused",
            ServerEvent::ProjectResumed => "project_resumed",
            ServerEvent::ProjectCompleted { .. } => "project_completed",
            ServerEvent::ProjectFailed { .. } => "project_failed",
            ServerEvent::DeliverableStarted { .. } => "deliverable_started",
            ServerEvent::DeliverableCompleted { .. } => "deliverable_completed",
            ServerEvent::SectionStarted { .. } => "section_started",
            ServerEvent::SectionCompleted { .. } => "section_completed",
        }
    }
}
