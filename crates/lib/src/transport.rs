//! Transport manager: one live connection per chat, driven as an explicit state machine.
//!
//! The connection itself is behind [`Connector`]/[`Link`]; every lifecycle callback
//! (open, frame, error, close) arrives as a [`TransportEvent`] on a single channel and is
//! applied by one consumer through [`TransportManager::handle`]. Each connection gets a new
//! generation number; events tagged with an older generation are dropped.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{Endpoints, ReconnectMode};
use crate::protocol::{decode_event, ClientFrame, ServerEvent};
use crate::tracker::ConnectTarget;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

pub type Generation = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Frame(String),
    Error(String),
    Closed,
    /// Fixed reconnect delay elapsed.
    RetryDue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: Generation,
    pub kind: TransportEventKind,
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,
    #[error("encoding frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An open (or opening) connection.
pub trait Link: Send {
    /// Queue a text frame on the wire.
    fn send(&mut self, text: String) -> Result<(), TransportError>;
    /// Start closing. Safe to call more than once.
    fn close(&mut self);
}

/// Opens links. The link reports its lifecycle on `events`, tagged with `generation`.
pub trait Connector {
    type Link: Link;

    fn open(&mut self, url: &str, generation: Generation, events: EventSender) -> Self::Link;
}

/// What applying a transport event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// Stale generation, malformed frame, or nothing to do.
    Ignored,
    State(ConnectionState),
    Event(ServerEvent),
    /// Closed unexpectedly; a retry fires after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
}

pub struct TransportManager<C: Connector> {
    connector: C,
    endpoints: Endpoints,
    events: EventSender,
    link: Option<C::Link>,
    state: ConnectionState,
    target: Option<ConnectTarget>,
    generation: Generation,
    reconnect: ReconnectMode,
    attempts: u32,
    user_closed: bool,
}

impl<C: Connector> TransportManager<C> {
    pub fn new(connector: C, endpoints: Endpoints, reconnect: ReconnectMode, events: EventSender) -> Self {
        Self {
            connector,
            endpoints,
            events,
            link: None,
            state: ConnectionState::Disconnected,
            target: None,
            generation: 0,
            reconnect,
            attempts: 0,
            user_closed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Session the connection was opened for (recorded before the open completes).
    pub fn target(&self) -> Option<&ConnectTarget> {
        self.target.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Open a connection to `target`. No-op (returns false) when an open connection to the
    /// same target already exists.
    pub fn connect(&mut self, target: ConnectTarget) -> bool {
        if self.link.is_some()
            && self.state == ConnectionState::Connected
            && self.target.as_ref() == Some(&target)
        {
            log::debug!("already connected to {:?}", target);
            return false;
        }
        self.attempts = 0;
        self.open(target);
        true
    }

    /// Close the current connection (if any) and reopen to the recorded target.
    pub fn reconnect(&mut self) -> bool {
        match self.target.clone() {
            Some(target) => {
                self.attempts = 0;
                self.open(target);
                true
            }
            None => false,
        }
    }

    fn open(&mut self, target: ConnectTarget) {
        self.close_link();
        self.generation += 1;
        self.user_closed = false;
        self.state = ConnectionState::Connecting;
        let url = self.endpoints.live(target.session_id());
        log::info!("connecting to {} (generation {})", url, self.generation);
        self.target = Some(target);
        self.link = Some(self.connector.open(&url, self.generation, self.events.clone()));
    }

    fn close_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }

    /// The server assigned a session id to this connection; later reconnects go to it.
    pub fn adopt_session(&mut self, id: &str) {
        self.target = Some(ConnectTarget::Session(id.to_string()));
    }

    /// User-initiated close. Idempotent; no automatic reconnect follows.
    pub fn disconnect(&mut self) {
        self.user_closed = true;
        if self.link.is_some() {
            log::debug!("disconnecting (generation {})", self.generation);
            self.close_link();
            // Callbacks still in flight for this link are stale from here on.
            self.generation += 1;
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Send a frame if connected. Frames sent while not connected are dropped, never queued.
    pub fn send(&mut self, frame: &ClientFrame) -> bool {
        let link = match (&mut self.link, self.state) {
            (Some(link), ConnectionState::Connected) => link,
            _ => {
                log::warn!("not connected ({:?}); dropping {} frame", self.state, frame.kind());
                return false;
            }
        };
        let text = match frame.to_json() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("encoding {} frame: {}", frame.kind(), e);
                return false;
            }
        };
        match link.send(text) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("sending {} frame: {}", frame.kind(), e);
                false
            }
        }
    }

    /// Apply one transport event.
    pub fn handle(&mut self, event: TransportEvent) -> TransportOutcome {
        if event.generation != self.generation {
            log::debug!(
                "dropping stale {:?} (generation {}, current {})",
                event.kind,
                event.generation,
                self.generation
            );
            return TransportOutcome::Ignored;
        }
        match event.kind {
            TransportEventKind::Opened => {
                log::info!("connected (generation {})", self.generation);
                self.state = ConnectionState::Connected;
                self.attempts = 0;
                TransportOutcome::State(self.state)
            }
            TransportEventKind::Frame(text) => match decode_event(&text) {
                Ok(ev) => TransportOutcome::Event(ev),
                Err(e) => {
                    log::warn!("dropping malformed frame: {}", e);
                    TransportOutcome::Ignored
                }
            },
            TransportEventKind::Error(e) => {
                log::warn!("connection error: {}", e);
                self.state = ConnectionState::Error;
                TransportOutcome::State(self.state)
            }
            TransportEventKind::Closed => {
                self.link = None;
                self.state = ConnectionState::Disconnected;
                log::info!("connection closed (generation {})", self.generation);
                match self.retry_delay() {
                    Some(delay) => {
                        self.attempts += 1;
                        self.schedule_retry(delay);
                        TransportOutcome::RetryScheduled {
                            attempt: self.attempts,
                            delay,
                        }
                    }
                    None => TransportOutcome::State(self.state),
                }
            }
            TransportEventKind::RetryDue => {
                if self.user_closed || self.link.is_some() {
                    return TransportOutcome::Ignored;
                }
                match self.target.clone() {
                    Some(target) => {
                        log::info!("reconnect attempt {}", self.attempts);
                        self.open(target);
                        TransportOutcome::State(self.state)
                    }
                    None => TransportOutcome::Ignored,
                }
            }
        }
    }

    fn retry_delay(&self) -> Option<Duration> {
        match self.reconnect {
            ReconnectMode::Auto(policy) if !self.user_closed && self.attempts < policy.max_attempts => {
                Some(policy.delay())
            }
            _ => None,
        }
    }

    fn schedule_retry(&self, delay: Duration) {
        let tx = self.events.clone();
        let generation = self.generation;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(TransportEvent {
                        generation,
                        kind: TransportEventKind::RetryDue,
                    });
                });
            }
            Err(_) => log::warn!("no async runtime; reconnect not scheduled"),
        }
    }
}

impl<C: Connector> Drop for TransportManager<C> {
    fn drop(&mut self) {
        self.close_link();
    }
}

/// In-memory connector for tests: records every open/send/close and lets the test fire
/// lifecycle events by hand.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct Journal {
        pub opened: Vec<(String, Generation, EventSender)>,
        pub sent: Vec<String>,
        pub closed: usize,
    }

    #[derive(Clone, Default)]
    pub struct RecordingConnector {
        pub journal: Arc<Mutex<Journal>>,
    }

    pub struct RecordingLink {
        journal: Arc<Mutex<Journal>>,
        closed: bool,
    }

    impl Link for RecordingLink {
        fn send(&mut self, text: String) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.journal.lock().unwrap().sent.push(text);
            Ok(())
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.journal.lock().unwrap().closed += 1;
            }
        }
    }

    impl Connector for RecordingConnector {
        type Link = RecordingLink;

        fn open(&mut self, url: &str, generation: Generation, events: EventSender) -> RecordingLink {
            self.journal
                .lock()
                .unwrap()
                .opened
                .push((url.to_string(), generation, events));
            RecordingLink {
                journal: self.journal.clone(),
                closed: false,
            }
        }
    }

    impl RecordingConnector {
        pub fn opens(&self) -> usize {
            self.journal.lock().unwrap().opened.len()
        }

        pub fn closes(&self) -> usize {
            self.journal.lock().unwrap().closed
        }

        pub fn urls(&self) -> Vec<String> {
            self.journal.lock().unwrap().opened.iter().map(|o| o.0.clone()).collect()
        }

        pub fn sent(&self) -> Vec<String> {
            self.journal.lock().unwrap().sent.clone()
        }

        /// Fire an event as the most recently opened link.
        pub fn fire(&self, kind: TransportEventKind) {
            let j = self.journal.lock().unwrap();
            let (_, generation, tx) = j.opened.last().expect("no link opened");
            let _ = tx.send(TransportEvent {
                generation: *generation,
                kind,
            });
        }

        pub fn fire_frame(&self, json: &str) {
            self.fire(TransportEventKind::Frame(json.to_string()));
        }
    }
}
