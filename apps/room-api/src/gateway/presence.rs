//! In-memory per-room presence tracking with capacity and color assignment.
//!
//! Presence is per-**connection**: one participant entry per WebSocket bound
//! to a room. Each room's population is kept in join order, and all mutation
//! of a room's list happens under that room's `DashMap` entry lock.

use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use utoipa::ToSchema;

/// Maximum number of participants present in a single room.
pub const MAX_PARTICIPANTS: usize = 20;

/// Display colors handed out to participants, in assignment order.
pub const COLOR_PALETTE: [&str; 20] = [
    "#FF5733", "#33FF57", "#3357FF", "#F39C12", "#8E44AD", "#16A085", "#E67E22", "#2ECC71",
    "#E74C3C", "#3498DB", "#1ABC9C", "#9B59B6", "#34495E", "#27AE60", "#2980B9", "#D35400",
    "#C0392B", "#7F8C8D", "#F1C40F", "#2C3E50",
];

/// One connection present in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Participant {
    /// Connection id (`conn_` prefixed ULID).
    pub id: String,
    pub nickname: String,
    pub color: String,
}

/// Result of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection is present; `participants` is the room's population
    /// after the join, in join order.
    Accepted {
        color: String,
        participants: Vec<Participant>,
    },
    /// The room is at capacity. Nothing was changed.
    RoomFull,
}

/// Thread-safe, DashMap-backed presence registry.
pub struct PresenceRegistry {
    /// Room code → participants in join order.
    rooms: DashMap<String, Vec<Participant>>,
    /// Connection id → codes of the rooms it is present in.
    memberships: DashMap<String, HashSet<String>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Admit a connection to a room.
    ///
    /// Rejects without side effects when the room already holds
    /// [`MAX_PARTICIPANTS`]. A connection that is already present keeps its
    /// entry and color.
    pub fn join(&self, room_code: &str, connection_id: &str, nickname: &str) -> JoinOutcome {
        self.join_with(room_code, connection_id, nickname, || {})
    }

    /// [`join`](Self::join), running `on_locked` first while the room's entry
    /// lock is held, before the population is inspected.
    pub fn join_with(
        &self,
        room_code: &str,
        connection_id: &str,
        nickname: &str,
        on_locked: impl FnOnce(),
    ) -> JoinOutcome {
        let mut participants = self.rooms.entry(room_code.to_string()).or_default();
        on_locked();

        if let Some(existing) = participants.iter().find(|p| p.id == connection_id) {
            return JoinOutcome::Accepted {
                color: existing.color.clone(),
                participants: participants.clone(),
            };
        }

        if participants.len() >= MAX_PARTICIPANTS {
            return JoinOutcome::RoomFull;
        }

        let color = pick_color(&participants).to_string();
        participants.push(Participant {
            id: connection_id.to_string(),
            nickname: nickname.to_string(),
            color: color.clone(),
        });

        self.memberships
            .entry(connection_id.to_string())
            .or_default()
            .insert(room_code.to_string());

        JoinOutcome::Accepted {
            color,
            participants: participants.clone(),
        }
    }

    /// Remove a connection from a room.
    ///
    /// Returns the remaining population, or `None` if the connection was not
    /// present (nothing changed).
    pub fn leave(&self, room_code: &str, connection_id: &str) -> Option<Vec<Participant>> {
        self.leave_with(room_code, connection_id, |_| {})
    }

    /// [`leave`](Self::leave), handing the remaining population to `on_left`
    /// while the room's entry lock is still held.
    pub fn leave_with(
        &self,
        room_code: &str,
        connection_id: &str,
        on_left: impl FnOnce(&[Participant]),
    ) -> Option<Vec<Participant>> {
        let remaining = {
            let mut participants = self.rooms.get_mut(room_code)?;
            let position = participants.iter().position(|p| p.id == connection_id)?;
            participants.remove(position);
            on_left(participants.as_slice());
            participants.clone()
        };

        if let Entry::Occupied(mut rooms) = self.memberships.entry(connection_id.to_string()) {
            rooms.get_mut().remove(room_code);
            if rooms.get().is_empty() {
                rooms.remove();
            }
        }

        Some(remaining)
    }

    /// Remove a connection from every room it is present in. Used when a
    /// transport goes away without an explicit leave.
    ///
    /// `on_left` sees each room's remaining population under that room's
    /// entry lock. Returns `(room_code, remaining population)` for each
    /// affected room.
    pub fn remove_from_all_rooms(
        &self,
        connection_id: &str,
        mut on_left: impl FnMut(&str, &[Participant]),
    ) -> Vec<(String, Vec<Participant>)> {
        let room_codes = match self.memberships.remove(connection_id) {
            Some((_, rooms)) => rooms,
            None => return Vec::new(),
        };

        let mut affected: Vec<(String, Vec<Participant>)> = room_codes
            .into_iter()
            .filter_map(|code| {
                let remaining =
                    self.leave_with(&code, connection_id, |left| on_left(&code, left))?;
                Some((code, remaining))
            })
            .collect();
        affected.sort_by(|a, b| a.0.cmp(&b.0));
        affected
    }

    /// Current population of a room, in join order.
    pub fn list_for(&self, room_code: &str) -> Vec<Participant> {
        self.rooms
            .get(room_code)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    /// Connection ids present in a room, in join order.
    pub fn participant_ids(&self, room_code: &str) -> Vec<String> {
        self.rooms
            .get(room_code)
            .map(|p| p.iter().map(|participant| participant.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn population(&self, room_code: &str) -> usize {
        self.rooms.get(room_code).map(|p| p.len()).unwrap_or(0)
    }

    /// Drop a room's bookkeeping if nobody is in it and `confirm` agrees.
    ///
    /// `confirm` runs only for an empty (or unknown) room, while the room's
    /// entry lock is still held, so a concurrent [`join`](Self::join) either
    /// lands before the check (and the room is kept) or after `confirm` has
    /// finished. Returning `false` from it keeps the bookkeeping.
    pub fn remove_room_if_empty(&self, room_code: &str, confirm: impl FnOnce(&str) -> bool) -> bool {
        match self.rooms.entry(room_code.to_string()) {
            Entry::Occupied(entry) => {
                if !entry.get().is_empty() || !confirm(room_code) {
                    return false;
                }
                entry.remove();
                true
            }
            Entry::Vacant(_) => confirm(room_code),
        }
    }

    /// Number of rooms with presence bookkeeping (including empty ones
    /// awaiting cleanup).
    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// First palette color nobody in the room uses. Once every color is taken,
/// falls back to `palette[population % palette size]`.
fn pick_color(participants: &[Participant]) -> &'static str {
    COLOR_PALETTE
        .iter()
        .copied()
        .find(|color| !participants.iter().any(|p| p.color == *color))
        .unwrap_or(COLOR_PALETTE[participants.len() % COLOR_PALETTE.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(outcome: JoinOutcome) -> (String, Vec<Participant>) {
        match outcome {
            JoinOutcome::Accepted {
                color,
                participants,
            } => (color, participants),
            JoinOutcome::RoomFull => panic!("expected join to be accepted"),
        }
    }

    fn nicknames(participants: &[Participant]) -> Vec<&str> {
        participants.iter().map(|p| p.nickname.as_str()).collect()
    }

    #[test]
    fn join_assigns_first_free_color() {
        let reg = PresenceRegistry::new();

        let (alice, _) = accepted(reg.join("ABCD", "conn1", "Alice"));
        let (bob, participants) = accepted(reg.join("ABCD", "conn2", "Bob"));

        assert_eq!(alice, COLOR_PALETTE[0]);
        assert_eq!(bob, COLOR_PALETTE[1]);
        assert_eq!(nicknames(&participants), vec!["Alice", "Bob"]);
    }

    #[test]
    fn freed_color_is_reused() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");
        reg.join("ABCD", "conn2", "Bob");
        reg.leave("ABCD", "conn1");

        let (color, _) = accepted(reg.join("ABCD", "conn3", "Carol"));
        assert_eq!(color, COLOR_PALETTE[0]);
    }

    #[test]
    fn twenty_joins_get_distinct_colors() {
        let reg = PresenceRegistry::new();
        for i in 0..MAX_PARTICIPANTS {
            accepted(reg.join("ABCD", &format!("conn{i}"), &format!("user{i}")));
        }

        let colors: HashSet<String> = reg.list_for("ABCD").into_iter().map(|p| p.color).collect();
        assert_eq!(colors.len(), MAX_PARTICIPANTS);
    }

    #[test]
    fn join_beyond_capacity_is_rejected_without_change() {
        let reg = PresenceRegistry::new();
        for i in 0..MAX_PARTICIPANTS {
            accepted(reg.join("ABCD", &format!("conn{i}"), &format!("user{i}")));
        }
        let before = reg.list_for("ABCD");

        assert_eq!(reg.join("ABCD", "late", "Late"), JoinOutcome::RoomFull);
        assert_eq!(reg.list_for("ABCD"), before);
        assert_eq!(reg.population("ABCD"), MAX_PARTICIPANTS);
        assert!(reg.remove_from_all_rooms("late", |_, _| {}).is_empty());
    }

    #[test]
    fn rejoin_by_same_connection_is_idempotent() {
        let reg = PresenceRegistry::new();
        let (first, _) = accepted(reg.join("ABCD", "conn1", "Alice"));
        let (second, participants) = accepted(reg.join("ABCD", "conn1", "Alice"));

        assert_eq!(first, second);
        assert_eq!(participants.len(), 1);
    }

    #[test]
    fn pick_color_wraps_when_palette_exhausted() {
        let taken: Vec<Participant> = COLOR_PALETTE
            .iter()
            .enumerate()
            .map(|(i, color)| Participant {
                id: format!("conn{i}"),
                nickname: format!("user{i}"),
                color: color.to_string(),
            })
            .collect();

        assert_eq!(pick_color(&taken), COLOR_PALETTE[0]);
        assert_eq!(pick_color(&taken[..3]), COLOR_PALETTE[3]);
    }

    #[test]
    fn leave_preserves_join_order() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");
        reg.join("ABCD", "conn2", "Bob");
        reg.join("ABCD", "conn3", "Carol");

        let remaining = reg.leave("ABCD", "conn2").unwrap();
        assert_eq!(nicknames(&remaining), vec!["Alice", "Carol"]);
    }

    #[test]
    fn leave_unknown_connection_is_noop() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");

        assert!(reg.leave("ABCD", "ghost").is_none());
        assert!(reg.leave("ZZZZ", "conn1").is_none());
        assert_eq!(reg.population("ABCD"), 1);
    }

    #[test]
    fn last_leave_keeps_empty_room_bookkeeping() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");

        let remaining = reg.leave("ABCD", "conn1").unwrap();
        assert!(remaining.is_empty());
        assert_eq!(reg.room_count(), 1);
        assert_eq!(reg.population("ABCD"), 0);
    }

    #[test]
    fn remove_from_all_rooms_reports_each_room() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");
        reg.join("ABCD", "conn2", "Bob");
        reg.join("WXYZ", "conn1", "Alice");

        let mut emptied = Vec::new();
        let affected = reg.remove_from_all_rooms("conn1", |code, left| {
            if left.is_empty() {
                emptied.push(code.to_string());
            }
        });
        assert_eq!(affected.len(), 2);
        assert_eq!(affected[0].0, "ABCD");
        assert_eq!(nicknames(&affected[0].1), vec!["Bob"]);
        assert_eq!(affected[1].0, "WXYZ");
        assert!(affected[1].1.is_empty());
        assert_eq!(emptied, vec!["WXYZ"]);

        // Second call finds nothing left to remove.
        assert!(reg.remove_from_all_rooms("conn1", |_, _| {}).is_empty());
    }

    #[test]
    fn participant_ids_follow_join_order() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn2", "Bob");
        reg.join("ABCD", "conn1", "Alice");

        assert_eq!(reg.participant_ids("ABCD"), vec!["conn2", "conn1"]);
        assert!(reg.participant_ids("ZZZZ").is_empty());
    }

    #[test]
    fn remove_room_if_empty_keeps_populated_rooms() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");

        let mut called = false;
        assert!(!reg.remove_room_if_empty("ABCD", |_| {
            called = true;
            true
        }));
        assert!(!called);
        assert_eq!(reg.population("ABCD"), 1);
    }

    #[test]
    fn remove_room_if_empty_drops_empty_rooms() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");
        reg.leave("ABCD", "conn1");

        let mut removed = Vec::new();
        assert!(reg.remove_room_if_empty("ABCD", |code| {
            removed.push(code.to_string());
            true
        }));
        assert_eq!(removed, vec!["ABCD"]);
        assert_eq!(reg.room_count(), 0);
    }

    #[test]
    fn remove_room_if_empty_treats_unknown_room_as_empty() {
        let reg = PresenceRegistry::new();
        let mut called = false;
        assert!(reg.remove_room_if_empty("ZZZZ", |_| {
            called = true;
            true
        }));
        assert!(called);
    }

    #[test]
    fn remove_room_if_empty_respects_refusal() {
        let reg = PresenceRegistry::new();
        reg.join("ABCD", "conn1", "Alice");
        reg.leave("ABCD", "conn1");

        assert!(!reg.remove_room_if_empty("ABCD", |_| false));
        assert_eq!(reg.room_count(), 1);
    }

    #[test]
    fn hooks_see_population_under_the_room_lock() {
        let reg = PresenceRegistry::new();
        let mut seen_before_join = None;
        reg.join_with("ABCD", "conn1", "Alice", || seen_before_join = Some(()));
        assert!(seen_before_join.is_some());

        let mut left_behind = None;
        reg.leave_with("ABCD", "conn1", |left| left_behind = Some(left.len()));
        assert_eq!(left_behind, Some(0));
    }
}
