//! Session identity tracker: which session the user selected vs. which one the live
//! connection actually belongs to.
//!
//! The two differ in two situations that must be told apart:
//! - the user switched sessions or started a new one → reconnect with a clean slate;
//! - the server assigned an id to a connection opened without one → adopt it, no reconnect.
//!
//! `connected_to` is the source of truth for "already connected to". Adoption updates it in
//! the same step as `selected`, so the next comparison sees no mismatch.

use crate::session::SessionId;

/// Where a live connection points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectTarget {
    /// Endpoint that allocates a session on the server.
    NewSession,
    Session(SessionId),
}

impl ConnectTarget {
    pub fn from_selected(selected: Option<&str>) -> Self {
        match selected {
            Some(id) => ConnectTarget::Session(id.to_string()),
            None => ConnectTarget::NewSession,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            ConnectTarget::NewSession => None,
            ConnectTarget::Session(id) => Some(id),
        }
    }
}

/// True when a connection for `selected` must be (re)opened.
pub fn needs_reconnect(selected: Option<&str>, connected_to: Option<&ConnectTarget>) -> bool {
    match connected_to {
        None => true,
        Some(target) => *target != ConnectTarget::from_selected(selected),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTracker {
    selected: Option<SessionId>,
    connected_to: Option<ConnectTarget>,
}

impl SessionTracker {
    pub fn new(selected: Option<SessionId>) -> Self {
        Self {
            selected,
            connected_to: None,
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn connected_to(&self) -> Option<&ConnectTarget> {
        self.connected_to.as_ref()
    }

    /// User intent: switch to `id` (`None` = start a new session). Returns true if it changed.
    pub fn select(&mut self, id: Option<SessionId>) -> bool {
        if self.selected == id {
            return false;
        }
        self.selected = id;
        true
    }

    pub fn needs_reconnect(&self) -> bool {
        needs_reconnect(self.selected(), self.connected_to())
    }

    /// If the selection and the connection disagree, record the selection as the connection
    /// target (before the transport has even opened) and return it.
    pub fn begin_connect(&mut self) -> Option<ConnectTarget> {
        if !self.needs_reconnect() {
            return None;
        }
        let target = ConnectTarget::from_selected(self.selected());
        self.connected_to = Some(target.clone());
        Some(target)
    }

    /// The server announced the id of the current connection. Returns true when the selection
    /// changed and its owner must be told.
    pub fn adopt(&mut self, id: SessionId) -> bool {
        self.connected_to = Some(ConnectTarget::Session(id.clone()));
        self.select(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_uses_connected_target() {
        assert!(needs_reconnect(None, None));
        assert!(!needs_reconnect(None, Some(&ConnectTarget::NewSession)));
        assert!(needs_reconnect(Some("a"), Some(&ConnectTarget::NewSession)));
        assert!(!needs_reconnect(Some("a"), Some(&ConnectTarget::Session("a".into()))));
        assert!(needs_reconnect(None, Some(&ConnectTarget::Session("a".into()))));
    }

    #[test]
    fn adopting_server_id_does_not_request_reconnect() {
        let mut t = SessionTracker::new(None);
        assert_eq!(t.begin_connect(), Some(ConnectTarget::NewSession));
        assert_eq!(t.begin_connect(), None);

        assert!(t.adopt("abc".into()));
        assert_eq!(t.selected(), Some("abc"));
        assert!(!t.needs_reconnect());
        assert_eq!(t.begin_connect(), None);

        // Owner echoes the assigned id back as its selection.
        assert!(!t.select(Some("abc".into())));
        assert_eq!(t.begin_connect(), None);
    }

    #[test]
    fn user_switch_requests_reconnect() {
        let mut t = SessionTracker::new(Some("a".into()));
        assert_eq!(t.begin_connect(), Some(ConnectTarget::Session("a".into())));
        assert!(t.select(Some("b".into())));
        assert_eq!(t.begin_connect(), Some(ConnectTarget::Session("b".into())));

        assert!(t.select(None));
        assert_eq!(t.begin_connect(), Some(ConnectTarget::NewSession));
    }
}
