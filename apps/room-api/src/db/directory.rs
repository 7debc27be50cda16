//! In-process room directory: the metadata and editor state of every live room.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pairpad_common::id::{prefix, prefixed_ulid};
use pairpad_common::room_code;

use crate::gateway::presence::PresenceRegistry;
use crate::models::room::{Room, RoomPatch, RoomResponse};

/// Short codes tried before falling back to a wide, time-derived code.
pub const MAX_CODE_ATTEMPTS: usize = 10;

/// Live rooms keyed by code.
///
/// Backed by a `DashMap`, so every operation is safe to call from any number
/// of connection handlers at once. Writes are last-writer-wins.
pub struct RoomDirectory {
    rooms: DashMap<String, Room>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create a room under a fresh code.
    ///
    /// Tries up to [`MAX_CODE_ATTEMPTS`] random four-letter codes, then falls
    /// back to [`room_code::fallback_code`].
    pub fn create(&self, name: &str, is_public: bool) -> Room {
        let short_codes = std::iter::repeat_with(room_code::random_code).take(MAX_CODE_ATTEMPTS);
        self.create_with_codes(name, is_public, short_codes)
    }

    /// Insert a room under the first candidate code not already taken.
    fn create_with_codes(
        &self,
        name: &str,
        is_public: bool,
        candidates: impl IntoIterator<Item = String>,
    ) -> Room {
        let mut candidates = candidates.into_iter();
        loop {
            let code = candidates.next().unwrap_or_else(room_code::fallback_code);
            if let Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                let room = Room::new(
                    prefixed_ulid(prefix::ROOM),
                    code,
                    name.to_string(),
                    is_public,
                );
                slot.insert(room.clone());
                tracing::info!(room_code = %room.code, is_public, "room created");
                return room;
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<Room> {
        self.rooms.get(code).map(|room| room.value().clone())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    /// Public rooms, newest first, each with the ids of the connections
    /// present in it right now.
    pub fn list_public(&self, presence: &PresenceRegistry) -> Vec<RoomResponse> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|entry| entry.is_public)
            .map(|entry| entry.value().clone())
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        rooms
            .into_iter()
            .map(|room| with_users(room, presence))
            .collect()
    }

    /// Replace a room's mutable editor state. Returns `false` (and does
    /// nothing) if the room no longer exists.
    pub fn update(&self, code: &str, patch: RoomPatch) -> bool {
        match self.rooms.get_mut(code) {
            Some(mut room) => {
                room.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Remove a room. Idempotent; returns whether a room was removed.
    pub fn delete(&self, code: &str) -> bool {
        self.rooms.remove(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach the live participant list to a room.
pub fn with_users(room: Room, presence: &PresenceRegistry) -> RoomResponse {
    let users = presence.participant_ids(&room.code);
    RoomResponse { room, users }
}
