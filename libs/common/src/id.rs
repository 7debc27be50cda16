//! Prefixed, time-sortable identifiers (`<prefix>_<ULID>`).

use ulid::Ulid;

/// Prefixes for the ids this workspace hands out.
pub mod prefix {
    /// `Room::id`.
    pub const ROOM: &str = "room";
    /// WebSocket connections (doubles as the participant id).
    pub const CONNECTION: &str = "conn";
}

/// Mint a fresh id under `prefix`.
///
/// ```
/// let id = pairpad_common::id::prefixed_ulid(pairpad_common::id::prefix::CONNECTION);
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{prefix}_{}", Ulid::new())
}
