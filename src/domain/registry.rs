//! Per-room registry of live connections with group-scoped broadcast.
//!
//! [`ConnectionRegistry`] tracks which connections are subscribed to
//! which rooms and fans a posted message out to every connection in the
//! room. Delivery uses one unbounded [`tokio::sync::mpsc`] sender per
//! connection, so a slow client never blocks the room session; each
//! connection's channel preserves the order in which broadcasts were
//! submitted for its room.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};

use super::message::Message;
use super::{ConnectionId, RoomId};

/// Canonical representation of a persisted message, as handed to the
/// registry for fanout. Carries the sender's display name so receivers
/// can render the wire payload without a directory lookup.
#[derive(Debug, Clone)]
pub struct MessagePosted {
    /// The persisted message.
    pub message: Message,
    /// Display name of the sending user.
    pub sender_name: String,
}

/// Sender half of one connection's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<Arc<MessagePosted>>;

/// Receiver half of one connection's outbound queue.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Arc<MessagePosted>>;

/// Tracks live connections per room and delivers room-scoped broadcasts.
///
/// # Concurrency
///
/// Register/unregister/broadcast may run concurrently; a broadcast may
/// observe a connection that is being removed, in which case delivery to
/// it fails cleanly and the dead handle is pruned afterwards.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<RoomId, HashMap<ConnectionId, OutboundSender>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the room's broadcast group. Idempotent:
    /// re-registering the same connection replaces its sender.
    pub async fn register(&self, room_id: RoomId, conn_id: ConnectionId, sender: OutboundSender) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room_id).or_default().insert(conn_id, sender);
    }

    /// Removes a connection from the room's broadcast group. Idempotent:
    /// unknown connections are ignored. Empty room groups are dropped.
    pub async fn unregister(&self, room_id: RoomId, conn_id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(group) = rooms.get_mut(&room_id) {
            group.remove(&conn_id);
            if group.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    /// Number of connections currently registered for the room.
    pub async fn connection_count(&self, room_id: RoomId) -> usize {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .map_or(0, HashMap::len)
    }

    /// Delivers `event` to every connection registered for the room,
    /// except `exclude` when given. Returns the number of connections
    /// the event was delivered to; connections whose receiver is gone
    /// are skipped and pruned.
    pub async fn broadcast(
        &self,
        room_id: RoomId,
        event: Arc<MessagePosted>,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let mut dead: Vec<ConnectionId> = Vec::new();
        let mut delivered = 0;
        {
            let rooms = self.rooms.read().await;
            let Some(group) = rooms.get(&room_id) else {
                return 0;
            };
            for (&conn_id, sender) in group {
                if Some(conn_id) == exclude {
                    continue;
                }
                if sender.send(Arc::clone(&event)).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(conn_id);
                }
            }
        }

        if !dead.is_empty() {
            let mut rooms = self.rooms.write().await;
            if let Some(group) = rooms.get_mut(&room_id) {
                for conn_id in dead {
                    // Only prune handles that are still closed; the id may
                    // have been re-registered in the meantime.
                    if group.get(&conn_id).is_some_and(OutboundSender::is_closed) {
                        group.remove(&conn_id);
                    }
                }
                if group.is_empty() {
                    rooms.remove(&room_id);
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::message::{Message, MessageKind};
    use crate::domain::{MessageId, UserId};
    use chrono::Utc;

    fn posted(text: &str) -> Arc<MessagePosted> {
        Arc::new(MessagePosted {
            message: Message {
                id: MessageId::new(),
                room_id: RoomId::new(),
                sender: UserId::new(),
                kind: MessageKind::Text,
                content: Some(text.to_string()),
                attachment: None,
                created_at: Utc::now(),
                edited_at: None,
                is_deleted: false,
                reply_to: None,
            },
            sender_name: "alice".to_string(),
        })
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::new();
        let conn = ConnectionId::new();

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        registry.register(room, conn, tx1).await;
        registry.register(room, conn, tx2).await;
        assert_eq!(registry.connection_count(room).await, 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::new();
        let conn = ConnectionId::new();

        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(room, conn, tx).await;
        registry.unregister(room, conn).await;
        registry.unregister(room, conn).await;
        assert_eq!(registry.connection_count(room).await, 0);
    }

    #[tokio::test]
    async fn broadcast_preserves_submission_order() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::new();
        let conn = ConnectionId::new();

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(room, conn, tx).await;

        for text in ["first", "second", "third"] {
            registry.broadcast(room, posted(text), None).await;
        }

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event.message.content.clone().unwrap_or_default());
        }
        assert_eq!(received, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_origin() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::new();
        let origin = ConnectionId::new();
        let other = ConnectionId::new();

        let (origin_tx, mut origin_rx) = mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        registry.register(room, origin, origin_tx).await;
        registry.register(room, other, other_tx).await;

        let delivered = registry.broadcast(room, posted("hi"), Some(origin)).await;
        assert_eq!(delivered, 1);
        assert!(origin_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn delivery_to_dropped_connection_fails_cleanly_and_prunes() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::new();
        let live = ConnectionId::new();
        let gone = ConnectionId::new();

        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (gone_tx, gone_rx) = mpsc::unbounded_channel();
        registry.register(room, live, live_tx).await;
        registry.register(room, gone, gone_tx).await;
        drop(gone_rx);

        let delivered = registry.broadcast(room, posted("hi"), None).await;
        assert_eq!(delivered, 1);
        assert!(live_rx.try_recv().is_ok());
        assert_eq!(registry.connection_count(room).await, 1);
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_delivers_nothing() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.broadcast(RoomId::new(), posted("hi"), None).await, 0);
    }
}
