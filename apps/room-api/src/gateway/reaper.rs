//! Deferred deletion of rooms that stay empty.
//!
//! A cleanup is a one-shot task per room code. Arming while one is already
//! pending does nothing; cancelling aborts the task. Joins and leaves that go
//! through [`IdleReaper::join_room`] and [`IdleReaper::leave_room`] cancel or
//! arm under the presence registry's per-room lock, so a pending cleanup
//! always means the room has been empty since it was armed. When a task
//! fires it deletes the room under that same lock, and only if it is still
//! the armed cleanup and nobody is present.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time;

use super::presence::{JoinOutcome, Participant, PresenceRegistry};
use crate::db::directory::RoomDirectory;

struct PendingCleanup {
    /// Distinguishes this arming from a later one for the same code.
    token: u64,
    handle: JoinHandle<()>,
}

struct ReaperInner {
    delay: Duration,
    pending: DashMap<String, PendingCleanup>,
    next_token: AtomicU64,
    presence: Arc<PresenceRegistry>,
    directory: Arc<RoomDirectory>,
}

/// Schedules and cancels cleanup of empty rooms. Cloneable; store in AppState.
#[derive(Clone)]
pub struct IdleReaper {
    inner: Arc<ReaperInner>,
}

impl IdleReaper {
    pub fn new(
        delay: Duration,
        presence: Arc<PresenceRegistry>,
        directory: Arc<RoomDirectory>,
    ) -> Self {
        Self {
            inner: Arc::new(ReaperInner {
                delay,
                pending: DashMap::new(),
                next_token: AtomicU64::new(1),
                presence,
                directory,
            }),
        }
    }

    /// Arm a cleanup for `room_code`. Returns `false` if one is already
    /// pending (the existing timer keeps running).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, room_code: &str) -> bool {
        let Entry::Vacant(slot) = self.inner.pending.entry(room_code.to_string()) else {
            return false;
        };

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let inner: Weak<ReaperInner> = Arc::downgrade(&self.inner);
        let code = room_code.to_string();
        let delay = self.inner.delay;

        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(&code, token);
            }
        });
        slot.insert(PendingCleanup { token, handle });

        tracing::debug!(room_code, delay_secs = delay.as_secs(), "room cleanup scheduled");
        true
    }

    /// Disarm the pending cleanup for `room_code`, if any.
    pub fn cancel(&self, room_code: &str) -> bool {
        match self.inner.pending.remove(room_code) {
            Some((_, cleanup)) => {
                cleanup.handle.abort();
                tracing::debug!(room_code, "room cleanup cancelled");
                true
            }
            None => false,
        }
    }

    /// Admit a connection to a room, cancelling any pending cleanup for it
    /// under the room's presence lock.
    pub fn join_room(&self, room_code: &str, connection_id: &str, nickname: &str) -> JoinOutcome {
        self.inner
            .presence
            .join_with(room_code, connection_id, nickname, || {
                self.cancel(room_code);
            })
    }

    /// Remove a connection from a room, arming a cleanup under the room's
    /// presence lock if that left it empty.
    pub fn leave_room(&self, room_code: &str, connection_id: &str) -> Option<Vec<Participant>> {
        self.inner
            .presence
            .leave_with(room_code, connection_id, |remaining| {
                if remaining.is_empty() {
                    self.schedule(room_code);
                }
            })
    }

    /// Remove a connection from every room it is in, arming a cleanup for
    /// each room it leaves empty.
    pub fn leave_all_rooms(&self, connection_id: &str) -> Vec<(String, Vec<Participant>)> {
        self.inner
            .presence
            .remove_from_all_rooms(connection_id, |room_code, remaining| {
                if remaining.is_empty() {
                    self.schedule(room_code);
                }
            })
    }

    /// Disarm every pending cleanup. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let codes: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        codes.iter().filter(|code| self.cancel(code)).count()
    }

    pub fn is_pending(&self, room_code: &str) -> bool {
        self.inner.pending.contains_key(room_code)
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

impl ReaperInner {
    fn expire(&self, room_code: &str, token: u64) {
        let reaped = self.presence.remove_room_if_empty(room_code, |code| {
            // A cancel (possibly followed by a fresh schedule) already replaced us.
            if !self.disarm(code, token) {
                return false;
            }
            self.directory.delete(code);
            true
        });

        if reaped {
            tracing::info!(room_code, "room reaped after idle timeout");
        } else if self.disarm(room_code, token) {
            tracing::debug!(room_code, "room repopulated before cleanup, keeping it");
        }
    }

    /// Drop the pending entry for `room_code` if it is still the one armed
    /// with `token`.
    fn disarm(&self, room_code: &str, token: u64) -> bool {
        self.pending
            .remove_if(room_code, |_, cleanup| cleanup.token == token)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(60);

    fn setup() -> (IdleReaper, Arc<PresenceRegistry>, Arc<RoomDirectory>) {
        let presence = Arc::new(PresenceRegistry::new());
        let directory = Arc::new(RoomDirectory::new());
        let reaper = IdleReaper::new(DELAY, presence.clone(), directory.clone());
        (reaper, presence, directory)
    }

    async fn advance(secs: u64) {
        time::sleep(Duration::from_secs(secs)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_room_is_deleted_after_delay() {
        let (reaper, presence, directory) = setup();
        let room = directory.create("Demo", true);
        presence.join(&room.code, "conn1", "Alice");
        presence.leave(&room.code, "conn1");

        assert!(reaper.schedule(&room.code));
        advance(59).await;
        assert!(directory.contains(&room.code));

        advance(2).await;
        assert!(!directory.contains(&room.code));
        assert_eq!(presence.room_count(), 0);
        assert!(!reaper.is_pending(&room.code));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_room() {
        let (reaper, _presence, directory) = setup();
        let room = directory.create("Demo", true);

        reaper.schedule(&room.code);
        advance(30).await;
        assert!(reaper.cancel(&room.code));
        advance(60).await;

        assert!(directory.contains(&room.code));
        assert_eq!(reaper.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_without_pending_cleanup_is_noop() {
        let (reaper, _presence, _directory) = setup();
        assert!(!reaper.cancel("ZZZZ"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_schedule_does_not_rearm() {
        let (reaper, _presence, directory) = setup();
        let room = directory.create("Demo", true);

        assert!(reaper.schedule(&room.code));
        advance(40).await;
        assert!(!reaper.schedule(&room.code));
        assert_eq!(reaper.pending_count(), 1);

        // Fires on the first timer, not 60s after the second call.
        advance(21).await;
        assert!(!directory.contains(&room.code));
    }

    #[tokio::test(start_paused = true)]
    async fn repopulated_room_survives_firing() {
        let (reaper, presence, directory) = setup();
        let room = directory.create("Demo", true);

        reaper.schedule(&room.code);
        presence.join(&room.code, "conn3", "Carol");
        advance(61).await;

        assert!(directory.contains(&room.code));
        assert_eq!(presence.population(&room.code), 1);
        assert!(!reaper.is_pending(&room.code));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_after_cancel_uses_fresh_timer() {
        let (reaper, _presence, directory) = setup();
        let room = directory.create("Demo", true);

        reaper.schedule(&room.code);
        advance(50).await;
        reaper.cancel(&room.code);
        reaper.schedule(&room.code);
        advance(20).await;
        assert!(directory.contains(&room.code));

        advance(41).await;
        assert!(!directory.contains(&room.code));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_delay_restarts_from_last_emptiness() {
        let (reaper, presence, directory) = setup();
        let room = directory.create("Demo", true);

        reaper.join_room(&room.code, "conn_a", "Alice");
        reaper.leave_room(&room.code, "conn_a");
        assert!(reaper.is_pending(&room.code));

        reaper.join_room(&room.code, "conn_b", "Bob");
        assert!(!reaper.is_pending(&room.code));

        advance(59).await;
        assert_eq!(reaper.leave_room(&room.code, "conn_b"), Some(Vec::new()));
        assert!(reaper.is_pending(&room.code));

        advance(2).await;
        assert!(directory.contains(&room.code));
        advance(57).await;
        assert!(directory.contains(&room.code));

        advance(2).await;
        assert!(!directory.contains(&room.code));
        assert_eq!(presence.room_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_that_keeps_others_present_does_not_arm() {
        let (reaper, _presence, directory) = setup();
        let room = directory.create("Demo", true);

        reaper.join_room(&room.code, "conn_a", "Alice");
        reaper.join_room(&room.code, "conn_b", "Bob");
        reaper.leave_room(&room.code, "conn_a");
        assert!(!reaper.is_pending(&room.code));

        advance(120).await;
        assert!(directory.contains(&room.code));
    }

    #[tokio::test(start_paused = true)]
    async fn leave_all_rooms_arms_only_emptied_rooms() {
        let (reaper, _presence, directory) = setup();
        let lonely = directory.create("Lonely", true);
        let busy = directory.create("Busy", true);

        reaper.join_room(&lonely.code, "conn_a", "Alice");
        reaper.join_room(&busy.code, "conn_a", "Alice");
        reaper.join_room(&busy.code, "conn_b", "Bob");

        let affected = reaper.leave_all_rooms("conn_a");

        assert_eq!(affected.len(), 2);
        assert!(reaper.is_pending(&lonely.code));
        assert!(!reaper.is_pending(&busy.code));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_armed_on_populated_room_clears_itself() {
        let (reaper, presence, directory) = setup();
        let room = directory.create("Demo", true);
        presence.join(&room.code, "conn_a", "Alice");

        reaper.schedule(&room.code);
        advance(61).await;
        assert!(directory.contains(&room.code));
        assert!(!reaper.is_pending(&room.code));

        // Next emptiness gets its own full delay.
        reaper.leave_room(&room.code, "conn_a");
        advance(59).await;
        assert!(directory.contains(&room.code));
        advance(2).await;
        assert!(!directory.contains(&room.code));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_disarms_everything() {
        let (reaper, _presence, directory) = setup();
        let one = directory.create("One", true);
        let two = directory.create("Two", false);
        reaper.schedule(&one.code);
        reaper.schedule(&two.code);

        assert_eq!(reaper.cancel_all(), 2);
        advance(120).await;

        assert_eq!(directory.len(), 2);
        assert_eq!(reaper.pending_count(), 0);
    }
}
