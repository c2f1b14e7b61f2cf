//! Chat controller: ties one live connection, the event reducer and the session tracker
//! together for a single chat view.
//!
//! All state changes happen on the caller's task, one event at a time: transport callbacks
//! are queued on a single channel and applied through [`ChatSession::handle`], user intents
//! are plain method calls. Once [`ChatSession::unmount`] has run, nothing changes any more.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{Endpoints, ReconnectMode};
use crate::plan::{ExecutionPlan, PlanEditError};
use crate::protocol::ClientFrame;
use crate::reducer::{ChatState, ChatVariant, Reduced, Reducer};
use crate::session::SessionId;
use crate::tracker::{ConnectTarget, SessionTracker};
use crate::transport::{ConnectionState, Connector, EventReceiver, TransportEvent, TransportManager, TransportOutcome};

/// What a handled event changed, for whoever renders the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Nothing visible changed.
    Ignored,
    Connection(ConnectionState),
    Reconnecting { attempt: u32, delay: Duration },
    /// A server event of this kind changed the chat state.
    Applied(&'static str),
    /// The server assigned this id to the connection; the selection now follows it.
    SessionAssigned(SessionId),
}

pub struct ChatSession<C: Connector> {
    transport: TransportManager<C>,
    reducer: Reducer,
    tracker: SessionTracker,
    events: EventReceiver,
    mounted: bool,
}

impl<C: Connector> ChatSession<C> {
    /// Build a chat for `selected` (`None` = new session). Nothing connects until [`sync`].
    ///
    /// [`sync`]: ChatSession::sync
    pub fn new(
        connector: C,
        endpoints: Endpoints,
        reconnect: ReconnectMode,
        variant: ChatVariant,
        selected: Option<SessionId>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            transport: TransportManager::new(connector, endpoints, reconnect, tx),
            reducer: Reducer::new(variant),
            tracker: SessionTracker::new(selected),
            events: rx,
            mounted: true,
        }
    }

    pub fn state(&self) -> &ChatState {
        self.reducer.state()
    }

    pub fn connection(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn selected(&self) -> Option<&str> {
        self.tracker.selected()
    }

    pub fn connected_to(&self) -> Option<&ConnectTarget> {
        self.tracker.connected_to()
    }

    pub fn variant(&self) -> ChatVariant {
        self.reducer.variant()
    }

    pub fn transport(&self) -> &TransportManager<C> {
        &self.transport
    }

    /// Reconcile the selected session with the live connection. On mismatch the chat state
    /// is cleared and a new connection opened. Returns true if it reconnected.
    pub fn sync(&mut self) -> bool {
        if !self.mounted {
            return false;
        }
        let Some(target) = self.tracker.begin_connect() else {
            return false;
        };
        log::debug!("session changed; connecting to {:?}", target);
        self.reducer.reset();
        self.transport.connect(target)
    }

    /// Switch to another session (`None` = start a new one) and reconcile.
    pub fn select_session(&mut self, id: Option<SessionId>) -> bool {
        if !self.mounted {
            return false;
        }
        self.tracker.select(id);
        self.sync()
    }

    pub fn start_new_session(&mut self) -> bool {
        self.select_session(None)
    }

    /// User-initiated retry after the connection dropped.
    pub fn reconnect(&mut self) -> bool {
        if !self.mounted {
            return false;
        }
        self.transport.reconnect()
    }

    /// Wait for the next transport event and apply it. Returns `None` once unmounted.
    pub async fn recv(&mut self) -> Option<ChatUpdate> {
        loop {
            if !self.mounted {
                return None;
            }
            let event = self.events.recv().await?;
            match self.handle(event) {
                ChatUpdate::Ignored => continue,
                update => return Some(update),
            }
        }
    }

    /// Apply every event already queued, without waiting.
    pub fn drain(&mut self) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match self.handle(event) {
                ChatUpdate::Ignored => {}
                update => updates.push(update),
            }
        }
        updates
    }

    /// Apply one transport event.
    pub fn handle(&mut self, event: TransportEvent) -> ChatUpdate {
        if !self.mounted {
            return ChatUpdate::Ignored;
        }
        match self.transport.handle(event) {
            TransportOutcome::Ignored => ChatUpdate::Ignored,
            TransportOutcome::State(state) => ChatUpdate::Connection(state),
            TransportOutcome::RetryScheduled { attempt, delay } => ChatUpdate::Reconnecting { attempt, delay },
            TransportOutcome::Event(ev) => {
                let kind = ev.kind();
                match self.reducer.apply(ev) {
                    Reduced::Unchanged => ChatUpdate::Ignored,
                    Reduced::Changed => ChatUpdate::Applied(kind),
                    Reduced::SessionAssigned(id) => {
                        self.transport.adopt_session(&id);
                        if self.tracker.adopt(id.clone()) {
                            log::info!("server assigned session {}", id);
                        }
                        ChatUpdate::SessionAssigned(id)
                    }
                }
            }
        }
    }

    fn send(&mut self, frame: ClientFrame) -> bool {
        self.mounted && self.transport.send(&frame)
    }

    /// Send a chat message. It joins the log only once handed to the connection.
    pub fn send_chat(&mut self, content: impl Into<String>) -> bool {
        let content = content.into();
        if !self.send(ClientFrame::Chat {
            content: content.clone(),
        }) {
            return false;
        }
        self.reducer.record_user_message(content);
        true
    }

    pub fn interrupt(&mut self) -> bool {
        self.send(ClientFrame::Interrupt)
    }

    /// Steer the running task.
    pub fn suggest(&mut self, content: impl Into<String>) -> bool {
        self.send(ClientFrame::Suggestion {
            content: content.into(),
        })
    }

    /// Ask for a plan instead of immediate execution.
    pub fn request_plan(&mut self, content: impl Into<String>) -> bool {
        let content = content.into();
        if !self.send(ClientFrame::RequestPlan {
            content: content.clone(),
        }) {
            return false;
        }
        self.reducer.record_user_message(content);
        self.reducer.begin_planning();
        true
    }

    pub fn approve_plan(&mut self) -> bool {
        if !self.send(ClientFrame::ApprovePlan) {
            return false;
        }
        self.reducer.mark_plan_approved();
        true
    }

    /// Edit the plan under review locally. `None` when there is no plan.
    pub fn edit_plan<T>(
        &mut self,
        edit: impl FnOnce(&mut ExecutionPlan) -> Result<T, PlanEditError>,
    ) -> Option<Result<T, PlanEditError>> {
        if !self.mounted {
            return None;
        }
        self.reducer.edit_plan(edit)
    }

    /// Send the locally edited plan back as the modification set.
    pub fn update_plan(&mut self) -> bool {
        let Some(plan) = self.reducer.state().plan.as_ref() else {
            log::warn!("no plan to update");
            return false;
        };
        let modifications = match serde_json::to_value(plan) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("encoding plan: {}", e);
                return false;
            }
        };
        self.send(ClientFrame::UpdatePlan { modifications })
    }

    pub fn pause_execution(&mut self) -> bool {
        self.send(ClientFrame::PauseExecution)
    }

    pub fn resume_execution(&mut self) -> bool {
        self.send(ClientFrame::ResumeExecution)
    }

    /// Close the connection and stop reacting to anything still in flight.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.transport.disconnect();
    }
}

impl<C: Connector> Drop for ChatSession<C> {
    fn drop(&mut self) {
        self.unmount();
    }
}
