//! Per-connection gateway session state.

use pairpad_common::id::{prefix, prefixed_ulid};

/// Where a connection stands in the room lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, not in any room.
    Unbound,
    /// Joined exactly one room.
    Bound(String),
    /// Disconnected. Terminal; no further events are handled.
    Closed,
}

/// State for a single WebSocket connection.
#[derive(Debug)]
pub struct GatewaySession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    pub state: ConnectionState,
}

impl GatewaySession {
    pub fn new() -> Self {
        Self::with_id(prefixed_ulid(prefix::CONNECTION))
    }

    pub fn with_id(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            state: ConnectionState::Unbound,
        }
    }

    /// Code of the bound room, if any.
    pub fn room_code(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Bound(code) => Some(code),
            ConnectionState::Unbound | ConnectionState::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn is_bound_to(&self, room_code: &str) -> bool {
        self.room_code() == Some(room_code)
    }

    pub fn bind(&mut self, room_code: &str) {
        if self.is_closed() {
            return;
        }
        self.state = ConnectionState::Bound(room_code.to_string());
    }

    /// Return to `Unbound`, yielding the previously bound room. A closed
    /// session stays closed.
    pub fn unbind(&mut self) -> Option<String> {
        if !matches!(self.state, ConnectionState::Bound(_)) {
            return None;
        }
        match std::mem::replace(&mut self.state, ConnectionState::Unbound) {
            ConnectionState::Bound(code) => Some(code),
            _ => None,
        }
    }

    /// Move to the terminal `Closed` state, yielding the room it was bound to.
    pub fn close(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, ConnectionState::Closed) {
            ConnectionState::Bound(code) => Some(code),
            ConnectionState::Unbound | ConnectionState::Closed => None,
        }
    }
}

impl Default for GatewaySession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_unbound_with_connection_id() {
        let session = GatewaySession::new();
        assert!(session.connection_id.starts_with("conn_"));
        assert_eq!(session.state, ConnectionState::Unbound);
        assert_eq!(session.room_code(), None);
    }

    #[test]
    fn bind_and_unbind() {
        let mut session = GatewaySession::with_id("conn_1");
        session.bind("ABCD");
        assert!(session.is_bound_to("ABCD"));
        assert!(!session.is_bound_to("WXYZ"));

        assert_eq!(session.unbind(), Some("ABCD".to_string()));
        assert_eq!(session.unbind(), None);
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = GatewaySession::with_id("conn_1");
        session.bind("ABCD");

        assert_eq!(session.close(), Some("ABCD".to_string()));
        assert!(session.is_closed());
        assert_eq!(session.room_code(), None);

        assert_eq!(session.unbind(), None);
        session.bind("WXYZ");
        assert_eq!(session.state, ConnectionState::Closed);
        assert_eq!(session.close(), None);
    }
}
