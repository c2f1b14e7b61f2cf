//! Event reducer: folds the ordered stream of server events into chat state.
//!
//! Events are applied one at a time in arrival order. There is no buffering and no
//! de-duplication; replaying an event repeats its visible effect.
//!
//! Two chat flavours share the reducer:
//! - [`ChatVariant::Simple`] renders every ReAct step (thought, action, observation) as an
//!   append-only message.
//! - [`ChatVariant::Planning`] keeps an activity feed and an execution plan; its message log
//!   only holds user, assistant and system entries.
//!
//! Tool calls are tracked through a single in-flight slot, not a map: an `observation` (or a
//! terminal `activity`) always closes whatever was opened last. Two concurrent tool calls can
//! therefore not be told apart.

use crate::activity::{Activity, ActivityId, ActivityKind, ActivityStatus};
use crate::plan::{ExecutionPlan, PlanEditError, PlanStatus};
use crate::protocol::{Params, ServerEvent};
use crate::session::{CreatedFile, Message, MessageId, MessageKind, SessionId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatVariant {
    #[default]
    Simple,
    Planning,
}

/// What the agent is doing, as far as the client can tell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentStatus {
    #[default]
    Idle,
    Planning,
    Thinking,
    Working,
}

impl AgentStatus {
    fn from_wire(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" | "ready" => AgentStatus::Idle,
            "planning" | "analyzing" => AgentStatus::Planning,
            "thinking" => AgentStatus::Thinking,
            _ => AgentStatus::Working,
        }
    }
}

/// Derived state rendered by a chat view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub activities: Vec<Activity>,
    pub plan: Option<ExecutionPlan>,
    pub status: AgentStatus,
    /// Latest thought (simple chat only).
    pub current_thought: Option<String>,
    /// A proposed plan is waiting for the user to approve or edit it.
    pub awaiting_approval: bool,
    /// Server-side workspace path reported with `session_ready`.
    pub workspace: Option<String>,
}

impl ChatState {
    pub fn is_processing(&self) -> bool {
        self.status != AgentStatus::Idle
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduced {
    Unchanged,
    Changed,
    /// The server assigned (or confirmed) the session id of this connection.
    SessionAssigned(SessionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Message(MessageId),
    Activity(ActivityId),
}

#[derive(Debug)]
pub struct Reducer {
    variant: ChatVariant,
    state: ChatState,
    next_message_id: MessageId,
    next_activity_id: ActivityId,
    in_flight: Option<InFlight>,
}

impl Reducer {
    pub fn new(variant: ChatVariant) -> Self {
        Self {
            variant,
            state: ChatState::default(),
            next_message_id: 1,
            next_activity_id: 1,
            in_flight: None,
        }
    }

    pub fn variant(&self) -> ChatVariant {
        self.variant
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Drop all derived state and restart id counters (session switch).
    pub fn reset(&mut self) {
        self.state = ChatState::default();
        self.next_message_id = 1;
        self.next_activity_id = 1;
        self.in_flight = None;
    }

    fn push(&mut self, kind: MessageKind, content: impl Into<String>) -> MessageId {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.state.messages.push(Message::new(id, kind, content));
        id
    }

    fn push_message(&mut self, message: impl FnOnce(MessageId) -> Message) -> MessageId {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.state.messages.push(message(id));
        id
    }

    fn system(&mut self, content: impl Into<String>) {
        self.push(MessageKind::System, content);
    }

    fn open_activity(&mut self, kind: ActivityKind, tool: impl Into<String>, params: Params) -> ActivityId {
        let id = self.next_activity_id;
        self.next_activity_id += 1;
        self.state.activities.push(Activity::running(id, kind, tool, params));
        self.in_flight = Some(InFlight::Activity(id));
        id
    }

    /// Close the in-flight activity, or record a standalone finished one when nothing is open.
    fn close_activity(
        &mut self,
        status: ActivityStatus,
        tool: Option<&str>,
        kind: Option<ActivityKind>,
        result: Option<String>,
        error: Option<String>,
        file_created: Option<CreatedFile>,
    ) {
        let open = match self.in_flight.take() {
            Some(InFlight::Activity(id)) => self.state.activities.iter_mut().find(|a| a.id == id),
            _ => None,
        };
        match open {
            Some(activity) => activity.finish(status, result, error, file_created),
            None => {
                let tool = tool.unwrap_or("unknown");
                let kind = kind.unwrap_or_else(|| ActivityKind::from_tool(tool));
                self.open_activity(kind, tool, Params::new());
                self.in_flight = None;
                if let Some(last) = self.state.activities.last_mut() {
                    last.finish(status, result, error, file_created);
                }
            }
        }
    }

    /// Task ended (answer, error, interrupt, completion): agent idle, feed cleared.
    fn settle(&mut self) {
        self.state.status = AgentStatus::Idle;
        self.state.activities.clear();
        self.in_flight = None;
    }

    /// Record a message the user typed (sent as `chat` or `request_plan`).
    pub fn record_user_message(&mut self, content: impl Into<String>) {
        self.push(MessageKind::User, content);
    }

    /// The user asked for a plan; the agent is planning until a proposal arrives.
    pub fn begin_planning(&mut self) {
        self.state.status = AgentStatus::Planning;
    }

    /// The user approved the current proposal.
    pub fn mark_plan_approved(&mut self) {
        self.state.awaiting_approval = false;
        if let Some(plan) = self.state.plan.as_mut() {
            plan.status = PlanStatus::Approved;
        }
    }

    /// Apply a local edit to the plan under review. `None` when there is no plan.
    pub fn edit_plan<T>(
        &mut self,
        edit: impl FnOnce(&mut ExecutionPlan) -> Result<T, PlanEditError>,
    ) -> Option<Result<T, PlanEditError>> {
        self.state.plan.as_mut().map(edit)
    }

    pub fn apply(&mut self, event: ServerEvent) -> Reduced {
        match self.variant {
            ChatVariant::Simple => self.apply_simple(event),
            ChatVariant::Planning => self.apply_planning(event),
        }
    }

    /// Events handled identically by both variants. Anything else is handed back.
    fn apply_common(&mut self, event: ServerEvent) -> Result<Reduced, ServerEvent> {
        match event {
            ServerEvent::Connected { .. } => Ok(Reduced::Unchanged),
            ServerEvent::Initializing { message } => {
                let text = if message.is_empty() {
                    "Starting session...".to_string()
                } else {
                    message
                };
                self.system(text);
                Ok(Reduced::Changed)
            }
            ServerEvent::SessionReady {
                session_id,
                workspace,
            } => {
                if !workspace.is_empty() {
                    self.state.workspace = Some(workspace);
                }
                Ok(Reduced::SessionAssigned(session_id))
            }
            ServerEvent::Interrupting => {
                self.system("Stopping...");
                Ok(Reduced::Changed)
            }
            ServerEvent::Interrupted => {
                self.settle();
                self.state.current_thought = None;
                self.system("Task interrupted.");
                Ok(Reduced::Changed)
            }
            ServerEvent::SuggestionReceived { content } => {
                self.system(format!("Suggestion received: {}", content));
                Ok(Reduced::Changed)
            }
            ServerEvent::SuggestionApplied { content } => {
                self.system(format!("Suggestion applied: {}", content));
                Ok(Reduced::Changed)
            }
            ServerEvent::Recovery { content } => {
                self.system(content);
                Ok(Reduced::Changed)
            }
            ServerEvent::Complete { .. } => {
                self.settle();
                if let Some(plan) = self.state.plan.as_mut() {
                    plan.mark_completed();
                }
                Ok(Reduced::Changed)
            }
            other => Err(other),
        }
    }

    fn apply_simple(&mut self, event: ServerEvent) -> Reduced {
        let event = match self.apply_common(event) {
            Ok(r) => return r,
            Err(e) => e,
        };
        match event {
            ServerEvent::Processing { .. } | ServerEvent::Status { .. } => {
                self.state.status = AgentStatus::Working;
                Reduced::Changed
            }
            ServerEvent::Thought { content } => {
                self.state.current_thought = Some(content.clone());
                self.push(MessageKind::Thought, content);
                Reduced::Changed
            }
            ServerEvent::Action { tool, params } => {
                let id = self.push_message(|id| {
                    Message::new(id, MessageKind::Action, tool.clone())
                        .with_tool(tool)
                        .with_params(params)
                });
                self.in_flight = Some(InFlight::Message(id));
                Reduced::Changed
            }
            ServerEvent::Observation {
                content,
                tool,
                file_created,
            } => {
                // Messages are immutable here: the observation closes the open action by
                // following it, carrying the action's tool name when the server omits it.
                let open_tool = match self.in_flight.take() {
                    Some(InFlight::Message(id)) => self
                        .state
                        .messages
                        .iter()
                        .find(|m| m.id == id)
                        .and_then(|m| m.tool.clone()),
                    _ => None,
                };
                let tool = tool.or(open_tool);
                self.push_message(|id| {
                    let m = Message::new(id, MessageKind::Observation, content).with_file(file_created);
                    match tool {
                        Some(t) => m.with_tool(t),
                        None => m,
                    }
                });
                Reduced::Changed
            }
            ServerEvent::FinalAnswer { content } => {
                self.settle();
                self.state.current_thought = None;
                self.push(MessageKind::FinalAnswer, content);
                Reduced::Changed
            }
            ServerEvent::Error { message } => {
                self.state.status = AgentStatus::Idle;
                self.in_flight = None;
                self.push(MessageKind::Error, message);
                Reduced::Changed
            }
            other => {
                log::debug!("simple chat ignores {} event", other.kind());
                Reduced::Unchanged
            }
        }
    }

    fn apply_planning(&mut self, event: ServerEvent) -> Reduced {
        let event = match self.apply_common(event) {
            Ok(r) => return r,
            Err(e) => e,
        };
        match event {
            ServerEvent::Processing { .. } => {
                self.state.status = AgentStatus::Thinking;
                Reduced::Changed
            }
            ServerEvent::Status { status, .. } => {
                self.state.status = AgentStatus::from_wire(&status);
                Reduced::Changed
            }
            ServerEvent::Thought { .. } => Reduced::Unchanged,
            ServerEvent::Action { tool, params } => {
                self.state.status = AgentStatus::Working;
                self.open_activity(ActivityKind::from_tool(&tool), tool, params);
                Reduced::Changed
            }
            ServerEvent::Observation {
                content,
                tool,
                file_created,
            } => {
                self.close_activity(
                    ActivityStatus::Completed,
                    tool.as_deref(),
                    None,
                    Some(content),
                    None,
                    file_created,
                );
                Reduced::Changed
            }
            ServerEvent::Activity {
                activity_type,
                tool,
                params,
                status,
                result,
                error,
                file_created,
            } => {
                if status.is_terminal() {
                    let tool = (!tool.is_empty()).then_some(tool);
                    self.close_activity(status, tool.as_deref(), activity_type, result, error, file_created);
                } else {
                    self.state.status = AgentStatus::Working;
                    let kind = activity_type.unwrap_or_else(|| ActivityKind::from_tool(&tool));
                    self.open_activity(kind, tool, params);
                }
                Reduced::Changed
            }
            ServerEvent::PlanProposal { plan, .. } | ServerEvent::ProjectPlanCreated { plan, .. } => {
                self.state.plan = Some(plan);
                self.state.status = AgentStatus::Idle;
                self.state.awaiting_approval = true;
                Reduced::Changed
            }
            ServerEvent::PlanUpdated { plan } | ServerEvent::ProjectPlanUpdated { plan } => {
                self.state.plan = Some(plan);
                Reduced::Changed
            }
            ServerEvent::PlanStarted { plan } => {
                self.state.plan = Some(plan);
                self.state.awaiting_approval = false;
                self.state.status = AgentStatus::Working;
                Reduced::Changed
            }
            ServerEvent::FinalAnswer { content } => {
                self.settle();
                self.push(MessageKind::Assistant, content);
                Reduced::Changed
            }
            ServerEvent::Error { message } => {
                self.settle();
                self.system(format!("Error: {}", message));
                Reduced::Changed
            }
            ServerEvent::ProjectAnalyzing | ServerEvent::ProjectPlanning => {
                self.state.status = AgentStatus::Planning;
                Reduced::Changed
            }
            ServerEvent::ProjectPendingApproval => {
                self.state.status = AgentStatus::Idle;
                self.state.awaiting_approval = true;
                Reduced::Changed
            }
            ServerEvent::ProjectExecutionStarted => {
                self.state.awaiting_approval = false;
                self.state.status = AgentStatus::Working;
                if let Some(plan) = self.state.plan.as_mut() {
                    plan.status = PlanStatus::Running;
                }
                Reduced::Changed
            }
            ServerEvent::ProjectPaused => {
                self.state.status = AgentStatus::Idle;
                self.system("Execution paused.");
                Reduced::Changed
            }
            ServerEvent::ProjectResumed => {
                self.state.status = AgentStatus::Working;
                self.system("Execution resumed.");
                Reduced::Changed
            }
            ServerEvent::ProjectCompleted { result } => {
                self.settle();
                if let Some(plan) = self.state.plan.as_mut() {
                    plan.mark_completed();
                }
                let mut text = format!(
                    "Project completed: {} deliverable(s) done, {} failed.",
                    result.deliverables_completed(),
                    result.deliverables_failed()
                );
                if !result.final_summary.is_empty() {
                    text.push('\n');
                    text.push_str(&result.final_summary);
                }
                self.push(MessageKind::Assistant, text);
                Reduced::Changed
            }
            ServerEvent::ProjectFailed { error } => {
                self.settle();
                if let Some(plan) = self.state.plan.as_mut() {
                    plan.status = PlanStatus::Failed;
                }
                self.system(format!("Project failed: {}", error));
                Reduced::Changed
            }
            ServerEvent::DeliverableStarted { deliverable } => {
                self.state.status = AgentStatus::Working;
                let mut params = Params::new();
                params.insert("id".into(), deliverable.id.into());
                params.insert("type".into(), deliverable.deliverable_type.into());
                params.insert("format".into(), deliverable.output_format.into());
                self.open_activity(ActivityKind::Document, deliverable.name, params);
                Reduced::Changed
            }
            ServerEvent::SectionStarted { section } => {
                self.state.status = AgentStatus::Working;
                let mut params = Params::new();
                params.insert("id".into(), section.id.into());
                params.insert("type".into(), section.section_type.into());
                self.open_activity(ActivityKind::Document, section.title, params);
                Reduced::Changed
            }
            ServerEvent::DeliverableCompleted { result } => {
                self.close_activity(
                    terminal_status(&result.status),
                    None,
                    Some(ActivityKind::Document),
                    result.output_path,
                    result.error,
                    None,
                );
                Reduced::Changed
            }
            ServerEvent::SectionCompleted { result } => {
                let mut text = result.content;
                if !result.files_created.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&format!("Files: {}", result.files_created.join(", ")));
                }
                self.close_activity(
                    terminal_status(&result.status),
                    None,
                    Some(ActivityKind::Document),
                    (!text.is_empty()).then_some(text),
                    result.error,
                    None,
                );
                Reduced::Changed
            }
            other => {
                log::debug!("planning chat ignores {} event", other.kind());
                Reduced::Unchanged
            }
        }
    }
}

fn terminal_status(s: &str) -> ActivityStatus {
    match s.trim().to_ascii_lowercase().as_str() {
        "failed" | "error" => ActivityStatus::Failed,
        _ => ActivityStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_event;

    fn ev(json: &str) -> ServerEvent {
        decode_event(json).unwrap()
    }

    fn kinds(r: &Reducer) -> Vec<MessageKind> {
        r.state().messages.iter().map(|m| m.kind).collect()
    }

    #[test]
    fn simple_react_sequence_builds_ordered_log() {
        let mut r = Reducer::new(ChatVariant::Simple);
        r.apply(ev(r#"{"type":"thought","content":"x"}"#));
        assert_eq!(r.state().current_thought.as_deref(), Some("x"));
        r.apply(ev(r#"{"type":"action","tool":"t","params":{"a":1}}"#));
        r.apply(ev(r#"{"type":"observation","content":"y"}"#));

        let m = &r.state().messages;
        assert_eq!(kinds(&r), vec![MessageKind::Thought, MessageKind::Action, MessageKind::Observation]);
        assert_eq!(m[0].content, "x");
        assert_eq!(m[1].tool.as_deref(), Some("t"));
        assert_eq!(m[2].content, "y");
        assert_eq!(m[2].tool.as_deref(), Some("t"));

        r.apply(ev(r#"{"type":"final_answer","content":"done"}"#));
        assert!(r.state().current_thought.is_none());
        assert!(!r.state().is_processing());
        assert_eq!(r.state().messages.last().unwrap().kind, MessageKind::FinalAnswer);
    }

    #[test]
    fn message_ids_are_monotonic_and_reset() {
        let mut r = Reducer::new(ChatVariant::Simple);
        r.record_user_message("hi");
        r.apply(ev(r#"{"type":"thought","content":"a"}"#));
        r.apply(ev(r#"{"type":"thought","content":"b"}"#));
        let ids: Vec<_> = r.state().messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        r.reset();
        assert!(r.state().messages.is_empty());
        r.record_user_message("again");
        assert_eq!(r.state().messages[0].id, 1);
    }

    #[test]
    fn simple_processing_and_error() {
        let mut r = Reducer::new(ChatVariant::Simple);
        r.apply(ev(r#"{"type":"processing","task":"t"}"#));
        assert!(r.state().is_processing());
        r.apply(ev(r#"{"type":"error","message":"boom"}"#));
        assert!(!r.state().is_processing());
        let last = r.state().messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
        assert_eq!(last.content, "boom");
    }

    #[test]
    fn session_ready_reports_assignment() {
        let mut r = Reducer::new(ChatVariant::Simple);
        assert_eq!(
            r.apply(ev(r#"{"type":"session_ready","session_id":"abc","workspace":"/ws/abc"}"#)),
            Reduced::SessionAssigned("abc".into())
        );
        assert_eq!(r.state().workspace.as_deref(), Some("/ws/abc"));
        assert_eq!(r.apply(ev(r#"{"type":"connected","session_id":"new"}"#)), Reduced::Unchanged);
    }

    #[test]
    fn interrupting_keeps_busy_interrupted_settles() {
        let mut r = Reducer::new(ChatVariant::Simple);
        r.apply(ev(r#"{"type":"processing"}"#));
        r.apply(ev(r#"{"type":"interrupting"}"#));
        assert!(r.state().is_processing());
        assert_eq!(r.state().messages.last().unwrap().kind, MessageKind::System);
        r.apply(ev(r#"{"type":"thought","content":"hmm"}"#));
        r.apply(ev(r#"{"type":"interrupted"}"#));
        assert!(!r.state().is_processing());
        assert!(r.state().current_thought.is_none());
    }

    #[test]
    fn suggestion_and_recovery_echo_system_messages() {
        let mut r = Reducer::new(ChatVariant::Simple);
        r.apply(ev(r#"{"type":"suggestion_received","content":"use pandas"}"#));
        r.apply(ev(r#"{"type":"recovery","content":"[SELF-HEALING] retrying"}"#));
        let m = &r.state().messages;
        assert_eq!(m[0].content, "Suggestion received: use pandas");
        assert_eq!(m[1].content, "[SELF-HEALING] retrying");
        assert!(m.iter().all(|m| m.kind == MessageKind::System));
    }

    #[test]
    fn planning_action_then_observation_closes_once() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"thought","content":"ignored"}"#));
        assert!(r.state().messages.is_empty());

        r.apply(ev(r#"{"type":"action","tool":"write_file","params":{"file_path":"a.py"}}"#));
        assert_eq!(r.state().activities.len(), 1);
        assert_eq!(r.state().activities[0].status, ActivityStatus::Running);
        assert_eq!(r.state().activities[0].kind, ActivityKind::File);

        r.apply(ev(
            r#"{"type":"observation","content":"File written successfully","tool":"write_file","file_created":{"path":"a.py","content":"x"}}"#,
        ));
        let a = &r.state().activities[0];
        assert_eq!(a.status, ActivityStatus::Completed);
        assert_eq!(a.result.as_deref(), Some("File written successfully"));
        assert_eq!(a.file_created.as_ref().unwrap().path, "a.py");

        // A second observation has nothing to close: it becomes its own entry.
        r.apply(ev(r#"{"type":"observation","content":"again","tool":"calculator"}"#));
        let acts = &r.state().activities;
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[0].result.as_deref(), Some("File written successfully"));
        assert_eq!(acts[1].status, ActivityStatus::Completed);
        assert_eq!(acts[1].kind, ActivityKind::Compute);
    }

    #[test]
    fn planning_single_slot_closes_latest_activity() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"activity","tool":"web_search","status":"running"}"#));
        r.apply(ev(r#"{"type":"activity","tool":"calculator","status":"running"}"#));
        r.apply(ev(r#"{"type":"activity","tool":"calculator","status":"failed","error":"div by zero"}"#));
        let acts = &r.state().activities;
        assert_eq!(acts[0].status, ActivityStatus::Running);
        assert_eq!(acts[1].status, ActivityStatus::Failed);
        assert_eq!(acts[1].kind, ActivityKind::Error);
        assert_eq!(acts[1].error.as_deref(), Some("div by zero"));
    }

    #[test]
    fn planning_plan_lifecycle() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.begin_planning();
        assert_eq!(r.state().status, AgentStatus::Planning);

        r.apply(ev(
            r#"{"type":"plan_proposal","plan":{"id":"p","title":"T","phases":[{"id":"a","name":"A","tasks":[{"id":"t1","name":"one"}]}]}}"#,
        ));
        assert_eq!(r.state().status, AgentStatus::Idle);
        assert!(r.state().awaiting_approval);
        assert_eq!(r.state().plan.as_ref().unwrap().title, "T");

        r.edit_plan(|p| p.rename_task("a", "t1", "first")).unwrap().unwrap();
        assert_eq!(r.state().plan.as_ref().unwrap().phases[0].tasks[0].name, "first");

        r.mark_plan_approved();
        assert!(!r.state().awaiting_approval);
        assert_eq!(r.state().plan.as_ref().unwrap().status, PlanStatus::Approved);

        r.apply(ev(r#"{"type":"plan_started","plan":{"id":"p","title":"T2","status":"running"}}"#));
        assert_eq!(r.state().plan.as_ref().unwrap().title, "T2");
        assert!(r.state().plan.as_ref().unwrap().phases.is_empty());
        assert_eq!(r.state().status, AgentStatus::Working);

        r.apply(ev(r#"{"type":"action","tool":"execute_command"}"#));
        r.apply(ev(r#"{"type":"complete","task":"x"}"#));
        assert!(r.state().activities.is_empty());
        assert_eq!(r.state().plan.as_ref().unwrap().status, PlanStatus::Completed);
        assert_eq!(r.state().status, AgentStatus::Idle);
    }

    #[test]
    fn planning_status_and_terminal_events() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"status","status":"thinking"}"#));
        assert_eq!(r.state().status, AgentStatus::Thinking);
        r.apply(ev(r#"{"type":"action","tool":"execute_command"}"#));
        r.apply(ev(r#"{"type":"error","message":"sandbox down"}"#));
        assert!(r.state().activities.is_empty());
        assert_eq!(r.state().status, AgentStatus::Idle);
        let last = r.state().messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::System);
        assert!(last.content.contains("sandbox down"));

        r.apply(ev(r#"{"type":"final_answer","content":"42"}"#));
        assert_eq!(r.state().messages.last().unwrap().kind, MessageKind::Assistant);
    }

    #[test]
    fn planning_project_events_feed_activities() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"project_analyzing","task":"study"}"#));
        assert_eq!(r.state().status, AgentStatus::Planning);
        r.apply(ev(
            r##"{"type":"project_plan_created","plan":{"task":"study","title":"Report","deliverables":[{"id":"d1","deliverable_type":"report","name":"Report","sections":[{"id":"s1","title":"Intro","section_type":"text","order":1}],"output_format":"pdf"}],"execution_order":["d1"]},"plan_markdown":"# Report"}"##,
        ));
        assert!(r.state().awaiting_approval);
        assert_eq!(r.state().plan.as_ref().unwrap().deliverables[0].sections[0].title, "Intro");
        r.apply(ev(r#"{"type":"project_execution_started","task":"study"}"#));
        assert_eq!(r.state().plan.as_ref().unwrap().status, PlanStatus::Running);

        r.apply(ev(
            r#"{"type":"deliverable_started","deliverable":{"id":"d1","deliverable_type":"report","name":"Report","sections":[],"output_format":"pdf","depends_on":[],"tools_required":[],"quality_gates":[]}}"#,
        ));
        r.apply(ev(
            r#"{"type":"section_started","section":{"id":"s1","title":"Intro","section_type":"text","description":"","subsections":[],"editable_fields":[],"optional":false,"order":1,"content_hint":""}}"#,
        ));
        assert_eq!(r.state().activities[1].tool, "Intro");
        r.apply(ev(r#"{"type":"section_completed","result":{"section_id":"s1","status":"failed"}}"#));
        assert_eq!(r.state().activities[1].status, ActivityStatus::Failed);

        // The single slot was consumed by the section; the deliverable result is its own entry.
        r.apply(ev(
            r#"{"type":"deliverable_completed","result":{"deliverable_id":"d1","status":"completed","section_results":[],"output_path":"/out/report.pdf","error":null}}"#,
        ));
        let acts = &r.state().activities;
        assert_eq!(acts.len(), 3);
        assert_eq!(acts[0].tool, "Report");
        assert_eq!(acts[0].params.get("format"), Some(&serde_json::json!("pdf")));
        assert_eq!(acts[2].kind, ActivityKind::Document);
        assert_eq!(acts[2].result.as_deref(), Some("/out/report.pdf"));

        r.apply(ev(
            r#"{"type":"project_completed","result":{"task":"study","plan":{"task":"study","title":"Report","deliverables":[]},"status":"completed","deliverable_results":[{"deliverable_id":"d1","status":"completed","section_results":[],"output_path":"/out/report.pdf","error":null}],"final_summary":"All done"}}"#,
        ));
        assert!(r.state().activities.is_empty());
        assert_eq!(r.state().plan.as_ref().unwrap().status, PlanStatus::Completed);
        assert_eq!(
            r.state().messages.last().unwrap().content,
            "Project completed: 1 deliverable(s) done, 0 failed.\nAll done"
        );
    }

    #[test]
    fn planning_deliverable_result_closes_open_deliverable() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"deliverable_started","deliverable":{"id":"d1","name":"Deck","output_format":"pptx"}}"#));
        r.apply(ev(
            r#"{"type":"deliverable_completed","result":{"deliverable_id":"d1","status":"failed","output_path":null,"error":"no template"}}"#,
        ));
        let acts = &r.state().activities;
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].status, ActivityStatus::Failed);
        assert_eq!(acts[0].error.as_deref(), Some("no template"));

        r.apply(ev(r#"{"type":"project_failed","error":"1 deliverable failed"}"#));
        assert!(r.state().activities.is_empty());
        assert_eq!(r.state().messages.last().unwrap().content, "Project failed: 1 deliverable failed");
    }

    #[test]
    fn planning_activity_without_status_opens_running_entry() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"activity","tool":"web_search","params":{"query":"rust"}}"#));
        assert_eq!(r.state().activities.len(), 1);
        assert_eq!(r.state().activities[0].status, ActivityStatus::Running);
        assert_eq!(r.state().activities[0].kind, ActivityKind::Search);
        assert_eq!(r.state().status, AgentStatus::Working);
    }

    #[test]
    fn planning_interrupted_clears_activity_feed() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"action","tool":"execute_command","params":{"command":"sleep 60"}}"#));
        r.apply(ev(r#"{"type":"activity","tool":"web_search","status":"running"}"#));
        assert_eq!(r.state().activities.len(), 2);

        r.apply(ev(r#"{"type":"interrupting"}"#));
        assert_eq!(r.state().activities.len(), 2);
        r.apply(ev(r#"{"type":"interrupted"}"#));
        assert!(r.state().activities.is_empty());
        assert!(!r.state().is_processing());
        assert_eq!(r.state().messages.last().unwrap().content, "Task interrupted.");

        // Nothing is in flight any more: a late observation records its own entry.
        r.apply(ev(r#"{"type":"observation","content":"late","tool":"execute_command"}"#));
        assert_eq!(r.state().activities.len(), 1);
        assert_eq!(r.state().activities[0].result.as_deref(), Some("late"));
    }

    #[test]
    fn planning_suggestion_events_echo_content() {
        let mut r = Reducer::new(ChatVariant::Planning);
        r.apply(ev(r#"{"type":"suggestion_received","content":"cite sources"}"#));
        r.apply(ev(r#"{"type":"suggestion_applied","content":"cite sources"}"#));
        let m = &r.state().messages;
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].content, "Suggestion received: cite sources");
        assert_eq!(m[1].content, "Suggestion applied: cite sources");
        assert!(m.iter().all(|m| m.kind == MessageKind::System));
    }

    #[test]
    fn simple_ignores_planning_only_events() {
        let mut r = Reducer::new(ChatVariant::Simple);
        assert_eq!(r.apply(ev(r#"{"type":"plan_proposal","plan":{}}"#)), Reduced::Unchanged);
        assert_eq!(
            r.apply(ev(r#"{"type":"activity","tool":"x","status":"running"}"#)),
            Reduced::Unchanged
        );
        assert!(r.state().plan.is_none());
        assert!(r.state().activities.is_empty());
    }
}
