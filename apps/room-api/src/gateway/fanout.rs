//! Fan-out of gateway messages to connected sockets.
//!
//! Each connection owns a bounded outbound queue drained by its writer task.
//! Delivery never awaits: a queue that is full or closed is skipped, so one
//! slow client cannot stall a room.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::events::GatewayMessage;

/// Messages buffered per connection before delivery to it is skipped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub type OutboundSender = mpsc::Sender<Arc<GatewayMessage>>;
pub type OutboundReceiver = mpsc::Receiver<Arc<GatewayMessage>>;

/// Create the outbound queue for one connection.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(OUTBOUND_QUEUE_CAPACITY)
}

/// Connection and room-group registry used for targeted sends.
pub struct GatewayBroadcast {
    /// Connection id → outbound queue.
    connections: DashMap<String, OutboundSender>,
    /// Room code → connection ids bound to it.
    rooms: DashMap<String, HashSet<String>>,
}

impl GatewayBroadcast {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn register(&self, connection_id: &str, sender: OutboundSender) {
        self.connections.insert(connection_id.to_string(), sender);
    }

    /// Forget a connection and drop it from every room group.
    pub fn unregister(&self, connection_id: &str) {
        self.connections.remove(connection_id);
        self.rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    /// Add a connection to a room's group.
    pub fn bind(&self, room_code: &str, connection_id: &str) {
        self.rooms
            .entry(room_code.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Remove a connection from a room's group.
    pub fn unbind(&self, room_code: &str, connection_id: &str) {
        if let Entry::Occupied(mut members) = self.rooms.entry(room_code.to_string()) {
            members.get_mut().remove(connection_id);
            if members.get().is_empty() {
                members.remove();
            }
        }
    }

    /// Deliver to a single connection.
    pub fn send_to(&self, connection_id: &str, message: GatewayMessage) {
        let message = Arc::new(message);
        self.deliver(connection_id, &message);
    }

    /// Deliver to every connection in a room, optionally skipping one.
    ///
    /// Returns the number of connections the message was queued for.
    pub fn send_to_room(
        &self,
        room_code: &str,
        message: GatewayMessage,
        exclude: Option<&str>,
    ) -> usize {
        let targets: Vec<String> = match self.rooms.get(room_code) {
            Some(members) => members
                .iter()
                .filter(|id| Some(id.as_str()) != exclude)
                .cloned()
                .collect(),
            None => return 0,
        };

        let message = Arc::new(message);
        targets
            .iter()
            .filter(|id| self.deliver(id, &message))
            .count()
    }

    /// Connection ids currently bound to a room.
    #[cfg(test)]
    pub fn members(&self, room_code: &str) -> HashSet<String> {
        self.rooms
            .get(room_code)
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn deliver(&self, connection_id: &str, message: &Arc<GatewayMessage>) -> bool {
        let Some(sender) = self.connections.get(connection_id) else {
            return false;
        };

        match sender.try_send(Arc::clone(message)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id,
                    event = %message.event,
                    "outbound queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(connection_id, "outbound queue closed");
                false
            }
        }
    }
}

impl Default for GatewayBroadcast {
    fn default() -> Self {
        Self::new()
    }
}
