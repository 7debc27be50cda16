//! Incoming event dispatch: the per-connection room state machine.
//!
//! Every handler runs synchronously against the shared registries and only
//! enqueues outbound messages, so nothing here awaits network I/O.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::db::directory::RoomDirectory;
use crate::models::room::RoomPatch;

use super::events::{
    ChatMessagePayload, ClientMessage, CodeChangePayload, CursorMovePayload, EventName,
    GatewayMessage, JoinRoomPayload, LanguageChangePayload, LeaveRoomPayload, ThemeChangePayload,
};
use super::fanout::{GatewayBroadcast, OutboundSender};
use super::presence::{JoinOutcome, PresenceRegistry};
use super::reaper::IdleReaper;
use super::session::GatewaySession;

/// Coordinates presence, room state, cleanup and fan-out for all connections.
#[derive(Clone)]
pub struct RoomGateway {
    directory: Arc<RoomDirectory>,
    presence: Arc<PresenceRegistry>,
    reaper: IdleReaper,
    fanout: Arc<GatewayBroadcast>,
}

impl RoomGateway {
    pub fn new(
        directory: Arc<RoomDirectory>,
        presence: Arc<PresenceRegistry>,
        reaper: IdleReaper,
        fanout: Arc<GatewayBroadcast>,
    ) -> Self {
        Self {
            directory,
            presence,
            reaper,
            fanout,
        }
    }

    /// Register a new connection whose outbound messages go to `sender`.
    pub fn connect(&self, sender: OutboundSender) -> GatewaySession {
        let session = GatewaySession::new();
        self.fanout.register(&session.connection_id, sender);
        tracing::info!(connection_id = %session.connection_id, "gateway connection opened");
        session
    }

    /// Parse and dispatch one inbound text frame. Malformed frames are dropped.
    pub fn handle_text(&self, session: &mut GatewaySession, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_message(session, message),
            Err(e) => {
                tracing::debug!(
                    connection_id = %session.connection_id,
                    error = %e,
                    "ignoring malformed frame"
                );
            }
        }
    }

    pub fn handle_message(&self, session: &mut GatewaySession, message: ClientMessage) {
        let ClientMessage { event, data } = message;
        let connection_id = session.connection_id.clone();

        if session.is_closed() {
            tracing::debug!(%connection_id, %event, "ignoring event on closed connection");
            return;
        }

        match event.as_str() {
            EventName::JOIN_ROOM => {
                if let Some(payload) = parse(&connection_id, &event, data) {
                    self.join_room(session, payload);
                }
            }
            EventName::LEAVE_ROOM => {
                if let Some(payload) = parse(&connection_id, &event, data) {
                    self.leave_room(session, payload);
                }
            }
            EventName::CODE_CHANGE => {
                if let Some(payload) = parse(&connection_id, &event, data) {
                    self.code_change(session, payload);
                }
            }
            EventName::LANGUAGE_CHANGE => {
                if let Some(payload) = parse(&connection_id, &event, data) {
                    self.language_change(session, payload);
                }
            }
            EventName::THEME_CHANGE => {
                if let Some(payload) = parse(&connection_id, &event, data) {
                    self.theme_change(session, payload);
                }
            }
            EventName::CURSOR_MOVE => {
                if let Some(payload) = parse(&connection_id, &event, data) {
                    self.cursor_move(session, payload);
                }
            }
            EventName::CHAT_MESSAGE => {
                if let Some(payload) = parse(&connection_id, &event, data) {
                    self.chat_message(session, payload);
                }
            }
            _ => {
                tracing::debug!(%connection_id, %event, "ignoring unknown event");
            }
        }
    }

    /// Tear down a connection: implicit leave from every room it was in.
    pub fn disconnect(&self, session: &mut GatewaySession) {
        if session.is_closed() {
            return;
        }
        let connection_id = session.connection_id.clone();
        session.close();
        self.fanout.unregister(&connection_id);

        for (room_code, remaining) in self.reaper.leave_all_rooms(&connection_id) {
            tracing::info!(
                %connection_id,
                %room_code,
                population = remaining.len(),
                "participant disconnected"
            );
            self.fanout
                .send_to_room(&room_code, GatewayMessage::user_left(&connection_id), None);
            self.fanout
                .send_to_room(&room_code, GatewayMessage::user_list(&remaining), None);
        }

        tracing::info!(%connection_id, "gateway connection closed");
    }

    fn join_room(&self, session: &mut GatewaySession, payload: JoinRoomPayload) {
        let connection_id = session.connection_id.clone();
        let room_code = payload.room_code.trim();
        let nickname = payload.nickname.trim();

        if room_code.is_empty() || nickname.is_empty() {
            tracing::debug!(%connection_id, "join without room code or nickname");
            return;
        }
        if session.is_bound_to(room_code) {
            return;
        }
        if !self.directory.contains(room_code) {
            tracing::debug!(%connection_id, room_code, "join for unknown room");
            return;
        }

        self.admit(session, room_code, nickname);
    }

    /// Admit a connection to a room that existed when the join was checked,
    /// then bind it and fan out the new population. Returns whether the
    /// connection ended up bound to `room_code`.
    fn admit(&self, session: &mut GatewaySession, room_code: &str, nickname: &str) -> bool {
        let connection_id = session.connection_id.clone();

        let color = match self.reaper.join_room(room_code, &connection_id, nickname) {
            JoinOutcome::Accepted { color, .. } => color,
            JoinOutcome::RoomFull => {
                tracing::info!(%connection_id, room_code, "join rejected, room full");
                self.fanout
                    .send_to(&connection_id, GatewayMessage::room_full());
                return false;
            }
        };

        // Reaped between the existence check and admission.
        if !self.directory.contains(room_code) {
            self.presence.leave(room_code, &connection_id);
            self.presence.remove_room_if_empty(room_code, |_| true);
            tracing::debug!(%connection_id, room_code, "room removed during join");
            return false;
        }

        if let Some(previous) = session.unbind() {
            self.depart(&connection_id, &previous);
        }
        session.bind(room_code);
        self.fanout.bind(room_code, &connection_id);

        let participants = self.presence.list_for(room_code);
        tracing::info!(
            %connection_id,
            room_code,
            nickname,
            %color,
            population = participants.len(),
            "participant joined"
        );
        self.fanout
            .send_to_room(room_code, GatewayMessage::user_list(&participants), None);
        true
    }

    fn leave_room(&self, session: &mut GatewaySession, payload: LeaveRoomPayload) {
        let room_code = payload.room_code().trim();
        if !session.is_bound_to(room_code) {
            tracing::debug!(
                connection_id = %session.connection_id,
                room_code,
                "leave for a room this connection is not in"
            );
            return;
        }

        session.unbind();
        self.depart(&session.connection_id, room_code);
    }

    /// Remove a connection from one room and tell whoever is left.
    fn depart(&self, connection_id: &str, room_code: &str) {
        self.fanout.unbind(room_code, connection_id);

        let Some(remaining) = self.reaper.leave_room(room_code, connection_id) else {
            return;
        };
        tracing::info!(
            connection_id,
            room_code,
            population = remaining.len(),
            "participant left"
        );
        self.fanout
            .send_to_room(room_code, GatewayMessage::user_list(&remaining), None);
    }

    fn code_change(&self, session: &GatewaySession, payload: CodeChangePayload) {
        let Some(room_code) = self.bound_room(session, &payload.room_code) else {
            return;
        };
        self.persist(room_code, RoomPatch::content(payload.code.as_str()));
        self.fanout.send_to_room(
            room_code,
            GatewayMessage::code_update(&payload.code),
            Some(&session.connection_id),
        );
    }

    fn language_change(&self, session: &GatewaySession, payload: LanguageChangePayload) {
        let Some(room_code) = self.bound_room(session, &payload.room_code) else {
            return;
        };
        self.persist(room_code, RoomPatch::language(payload.language.as_str()));
        self.fanout.send_to_room(
            room_code,
            GatewayMessage::language_change(&payload.language),
            Some(&session.connection_id),
        );
    }

    fn theme_change(&self, session: &GatewaySession, payload: ThemeChangePayload) {
        let Some(room_code) = self.bound_room(session, &payload.room_code) else {
            return;
        };
        self.persist(room_code, RoomPatch::theme(payload.theme.as_str()));
        self.fanout.send_to_room(
            room_code,
            GatewayMessage::theme_change(&payload.theme),
            Some(&session.connection_id),
        );
    }

    fn cursor_move(&self, session: &GatewaySession, payload: CursorMovePayload) {
        let Some(room_code) = self.bound_room(session, &payload.room_code) else {
            return;
        };
        self.fanout.send_to_room(
            room_code,
            GatewayMessage::cursor_update(&session.connection_id, payload.position),
            Some(&session.connection_id),
        );
    }

    fn chat_message(&self, session: &GatewaySession, payload: ChatMessagePayload) {
        let Some(room_code) = self.bound_room(session, &payload.room_code) else {
            return;
        };
        let message = GatewayMessage::chat_message(
            &payload.nickname,
            &payload.color,
            &payload.message,
            Utc::now(),
        );
        self.fanout.send_to_room(room_code, message, None);
    }

    /// The event's room code, normalised the way joins normalise it, if the
    /// connection is bound to that room.
    fn bound_room<'a>(&self, session: &GatewaySession, room_code: &'a str) -> Option<&'a str> {
        let room_code = room_code.trim();
        if session.is_bound_to(room_code) {
            return Some(room_code);
        }
        tracing::debug!(
            connection_id = %session.connection_id,
            room_code,
            "ignoring event for a room this connection is not in"
        );
        None
    }

    fn persist(&self, room_code: &str, patch: RoomPatch) {
        if !self.directory.update(room_code, patch) {
            tracing::debug!(room_code, "room gone, state change not stored");
        }
    }
}

fn parse<T: DeserializeOwned>(connection_id: &str, event: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!(connection_id, event, error = %e, "ignoring invalid payload");
            None
        }
    }
}
