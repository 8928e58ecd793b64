//! Per-room session actors serializing persistence and fanout.
//!
//! Each active room is driven by one tokio task that owns the receiving
//! end of a bounded mailbox. Commands are processed strictly one at a
//! time, which yields a total order of messages within the room: the
//! sequence of append+broadcast pairs matches the sequence in which the
//! session accepted the corresponding requests. No ordering holds across
//! rooms.
//!
//! A command already handed to a session completes even if the
//! originating connection is torn down mid-flight; the reply is simply
//! dropped. Append failures are reported to the originator only and
//! never broadcast, and a failed command leaves the session fully
//! usable.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::domain::message::{Message, MessageDraft};
use crate::domain::registry::MessagePosted;
use crate::domain::{ConnectionId, ConnectionRegistry, MessageId, RoomDirectory, RoomId, UserId};
use crate::domain::store::MessageStore;
use crate::error::ChatError;
use crate::identity::UserProfile;

/// A command accepted by a room session, with a reply channel back to
/// the originator.
#[derive(Debug)]
enum Command {
    Send {
        sender: UserProfile,
        draft: MessageDraft,
        origin: Option<ConnectionId>,
        reply: oneshot::Sender<Result<Message, ChatError>>,
    },
    MarkRead {
        user: UserId,
        up_to: DateTime<Utc>,
        reply: oneshot::Sender<Result<DateTime<Utc>, ChatError>>,
    },
    SoftDelete {
        message: MessageId,
        reply: oneshot::Sender<Result<Message, ChatError>>,
    },
}

/// Cloneable handle to one room's session mailbox.
#[derive(Debug, Clone)]
pub struct RoomSessionHandle {
    tx: mpsc::Sender<Command>,
}

impl RoomSessionHandle {
    /// Submits a validated send request and waits for the outcome.
    ///
    /// `origin` identifies the submitting connection so the echo policy
    /// can exclude it from the fanout.
    ///
    /// # Errors
    ///
    /// Returns the append error for rejected messages, or
    /// [`ChatError::SessionClosed`] when the session task is gone.
    pub async fn send_message(
        &self,
        sender: UserProfile,
        draft: MessageDraft,
        origin: Option<ConnectionId>,
    ) -> Result<Message, ChatError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Send {
                sender,
                draft,
                origin,
                reply,
            })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    /// Advances a member's last-read watermark through the session.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SessionClosed`] when the session task is
    /// gone, or the store error otherwise.
    pub async fn mark_read(
        &self,
        user: UserId,
        up_to: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ChatError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::MarkRead { user, up_to, reply })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    /// Soft-deletes a message in the session's room.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SessionClosed`] when the session task is
    /// gone, or the store error otherwise.
    pub async fn soft_delete(&self, message: MessageId) -> Result<Message, ChatError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::SoftDelete { message, reply })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }
}

/// Lazily spawns and hands out per-room session actors.
#[derive(Debug)]
pub struct RoomSessionManager {
    sessions: RwLock<HashMap<RoomId, RoomSessionHandle>>,
    store: Arc<MessageStore>,
    directory: Arc<RoomDirectory>,
    registry: Arc<ConnectionRegistry>,
    mailbox_capacity: usize,
    hydrate_limit: usize,
    echo_to_sender: bool,
}

impl RoomSessionManager {
    /// Creates a manager over the shared store, directory, and registry.
    ///
    /// `hydrate_limit` bounds how many durable messages are loaded back
    /// into memory when a room's session first starts.
    #[must_use]
    pub fn new(
        store: Arc<MessageStore>,
        directory: Arc<RoomDirectory>,
        registry: Arc<ConnectionRegistry>,
        mailbox_capacity: usize,
        hydrate_limit: usize,
        echo_to_sender: bool,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            directory,
            registry,
            mailbox_capacity,
            hydrate_limit,
            echo_to_sender,
        }
    }

    /// Returns the session handle for a room, spawning the actor on
    /// first use. The first spawn for a room restores its recent durable
    /// history into the in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`] for unknown rooms, or
    /// [`ChatError::PersistenceFailure`] when restoring durable history
    /// fails.
    pub async fn handle(&self, room_id: RoomId) -> Result<RoomSessionHandle, ChatError> {
        // Existence check before spawning anything.
        self.directory.room(room_id).await?;

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&room_id)
            && !existing.tx.is_closed()
        {
            return Ok(existing.clone());
        }

        self.store.hydrate_room(room_id, self.hydrate_limit).await?;

        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        tokio::spawn(run_session(
            room_id,
            rx,
            Arc::clone(&self.store),
            Arc::clone(&self.directory),
            Arc::clone(&self.registry),
            self.echo_to_sender,
        ));
        let handle = RoomSessionHandle { tx };
        sessions.insert(room_id, handle.clone());
        Ok(handle)
    }
}

/// The per-room actor loop: one command at a time, in arrival order.
async fn run_session(
    room_id: RoomId,
    mut rx: mpsc::Receiver<Command>,
    store: Arc<MessageStore>,
    directory: Arc<RoomDirectory>,
    registry: Arc<ConnectionRegistry>,
    echo_to_sender: bool,
) {
    tracing::debug!(room_id = %room_id, "room session started");
    while let Some(command) = rx.recv().await {
        match command {
            Command::Send {
                sender,
                draft,
                origin,
                reply,
            } => {
                let result = store.append(room_id, draft).await;
                if let Ok(message) = &result {
                    directory.touch_room(room_id, message.created_at).await;
                    let event = Arc::new(MessagePosted {
                        message: message.clone(),
                        sender_name: sender.username.clone(),
                    });
                    let exclude = if echo_to_sender { None } else { origin };
                    let delivered = registry.broadcast(room_id, event, exclude).await;
                    tracing::debug!(
                        room_id = %room_id,
                        message_id = %message.id,
                        delivered,
                        "message fanned out"
                    );
                } else if let Err(error) = &result {
                    tracing::warn!(room_id = %room_id, %error, "send request rejected");
                }
                // The originator may already be gone; its loss never
                // cancels the work above.
                let _ = reply.send(result);
            }
            Command::MarkRead { user, up_to, reply } => {
                let _ = reply.send(store.mark_read(room_id, user, up_to).await);
            }
            Command::SoftDelete { message, reply } => {
                let _ = reply.send(store.soft_delete(room_id, message).await);
            }
        }
    }
    tracing::debug!(room_id = %room_id, "room session stopped");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;
    use crate::domain::registry::OutboundReceiver;
    use tokio::sync::mpsc::unbounded_channel;

    struct Fixture {
        store: Arc<MessageStore>,
        directory: Arc<RoomDirectory>,
        registry: Arc<ConnectionRegistry>,
        manager: RoomSessionManager,
    }

    fn fixture_with_echo(echo_to_sender: bool) -> Fixture {
        let store = Arc::new(MessageStore::new());
        let directory = Arc::new(RoomDirectory::new(Arc::clone(&store), 100));
        let registry = Arc::new(ConnectionRegistry::new());
        let manager = RoomSessionManager::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&registry),
            64,
            50,
            echo_to_sender,
        );
        Fixture {
            store,
            directory,
            registry,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_echo(true)
    }

    async fn connect(fx: &Fixture, room: RoomId) -> (ConnectionId, OutboundReceiver) {
        let conn = ConnectionId::new();
        let (tx, rx) = unbounded_channel();
        fx.registry.register(room, conn, tx).await;
        (conn, rx)
    }

    fn drain_contents(rx: &mut OutboundReceiver) -> Vec<String> {
        let mut contents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            contents.push(event.message.content.clone().unwrap_or_default());
        }
        contents
    }

    #[tokio::test]
    async fn unknown_room_has_no_session() {
        let fx = fixture();
        let result = fx.manager.handle(RoomId::new()).await;
        assert!(matches!(result, Err(ChatError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn members_observe_the_same_message_order() {
        let fx = fixture();
        let alice = UserProfile::new(UserId::new(), "alice");
        let bob = UserProfile::new(UserId::new(), "bob");
        let Ok(room) = fx
            .directory
            .get_or_create_private_room(alice.id, bob.id)
            .await
        else {
            panic!("room creation failed");
        };
        let (alice_conn, mut alice_rx) = connect(&fx, room.id).await;
        let (bob_conn, mut bob_rx) = connect(&fx, room.id).await;
        let Ok(session) = fx.manager.handle(room.id).await else {
            panic!("no session");
        };

        for (who, conn, text) in [
            (&alice, alice_conn, "one"),
            (&bob, bob_conn, "two"),
            (&alice, alice_conn, "three"),
            (&bob, bob_conn, "four"),
        ] {
            let Ok(_) = session
                .send_message(
                    who.clone(),
                    MessageDraft::text(who.id, text),
                    Some(conn),
                )
                .await
            else {
                panic!("send failed");
            };
        }

        let expected = ["one", "two", "three", "four"];
        assert_eq!(drain_contents(&mut alice_rx), expected);
        assert_eq!(drain_contents(&mut bob_rx), expected);
    }

    #[tokio::test]
    async fn failed_append_is_reported_to_sender_only_and_not_broadcast() {
        let fx = fixture();
        let alice = UserProfile::new(UserId::new(), "alice");
        let bob = UserProfile::new(UserId::new(), "bob");
        let Ok(room) = fx
            .directory
            .get_or_create_private_room(alice.id, bob.id)
            .await
        else {
            panic!("room creation failed");
        };
        let (alice_conn, mut alice_rx) = connect(&fx, room.id).await;
        let (_bob_conn, mut bob_rx) = connect(&fx, room.id).await;
        let Ok(session) = fx.manager.handle(room.id).await else {
            panic!("no session");
        };

        let result = session
            .send_message(
                alice.clone(),
                MessageDraft::text(alice.id, "   "),
                Some(alice_conn),
            )
            .await;
        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
        assert_eq!(fx.store.message_count(room.id).await, 0);

        // One failed append does not poison the session.
        let Ok(_) = session
            .send_message(
                alice.clone(),
                MessageDraft::text(alice.id, "still alive"),
                Some(alice_conn),
            )
            .await
        else {
            panic!("session unusable after failure");
        };
        assert_eq!(drain_contents(&mut bob_rx), ["still alive"]);
    }

    #[tokio::test]
    async fn in_flight_send_completes_after_originator_is_gone() {
        let fx = fixture();
        let alice = UserProfile::new(UserId::new(), "alice");
        let bob = UserProfile::new(UserId::new(), "bob");
        let Ok(room) = fx
            .directory
            .get_or_create_private_room(alice.id, bob.id)
            .await
        else {
            panic!("room creation failed");
        };
        let (_bob_conn, mut bob_rx) = connect(&fx, room.id).await;
        let Ok(session) = fx.manager.handle(room.id).await else {
            panic!("no session");
        };

        // Hand the command to the session and drop the reply receiver
        // immediately, as a disconnecting gateway would.
        let (reply, rx) = oneshot::channel();
        drop(rx);
        let Ok(()) = session
            .tx
            .send(Command::Send {
                sender: alice.clone(),
                draft: MessageDraft::text(alice.id, "persisted anyway"),
                origin: None,
                reply,
            })
            .await
        else {
            panic!("mailbox closed");
        };

        // The message must still be persisted and fanned out.
        let Some(event) = bob_rx.recv().await else {
            panic!("expected broadcast");
        };
        assert_eq!(event.message.content.as_deref(), Some("persisted anyway"));
        assert_eq!(fx.store.message_count(room.id).await, 1);
    }

    #[tokio::test]
    async fn echo_policy_excludes_origin_when_disabled() {
        let fx = fixture_with_echo(false);
        let alice = UserProfile::new(UserId::new(), "alice");
        let bob = UserProfile::new(UserId::new(), "bob");
        let Ok(room) = fx
            .directory
            .get_or_create_private_room(alice.id, bob.id)
            .await
        else {
            panic!("room creation failed");
        };
        let (alice_conn, mut alice_rx) = connect(&fx, room.id).await;
        let (_bob_conn, mut bob_rx) = connect(&fx, room.id).await;
        let Ok(session) = fx.manager.handle(room.id).await else {
            panic!("no session");
        };

        let Ok(_) = session
            .send_message(
                alice.clone(),
                MessageDraft::text(alice.id, "no echo"),
                Some(alice_conn),
            )
            .await
        else {
            panic!("send failed");
        };

        assert!(alice_rx.try_recv().is_err());
        assert_eq!(drain_contents(&mut bob_rx), ["no echo"]);
    }

    #[tokio::test]
    async fn soft_delete_and_mark_read_route_through_the_session() {
        let fx = fixture();
        let alice = UserProfile::new(UserId::new(), "alice");
        let bob = UserProfile::new(UserId::new(), "bob");
        let Ok(room) = fx
            .directory
            .get_or_create_private_room(alice.id, bob.id)
            .await
        else {
            panic!("room creation failed");
        };
        let Ok(session) = fx.manager.handle(room.id).await else {
            panic!("no session");
        };

        let Ok(message) = session
            .send_message(alice.clone(), MessageDraft::text(alice.id, "oops"), None)
            .await
        else {
            panic!("send failed");
        };

        let Ok(deleted) = session.soft_delete(message.id).await else {
            panic!("soft delete failed");
        };
        assert!(deleted.is_deleted);

        let Ok(watermark) = session.mark_read(bob.id, message.created_at).await else {
            panic!("mark_read failed");
        };
        assert_eq!(watermark, message.created_at);
        assert_eq!(fx.store.unread_count(room.id, bob.id).await, 0);
    }

    #[tokio::test]
    async fn private_conversation_end_to_end() {
        let fx = fixture();
        let alice = UserProfile::new(UserId::new(), "alice");
        let bob = UserProfile::new(UserId::new(), "bob");

        // No prior room between the two.
        let Ok(room) = fx
            .directory
            .get_or_create_private_room(alice.id, bob.id)
            .await
        else {
            panic!("room creation failed");
        };

        let (alice_conn, mut alice_rx) = connect(&fx, room.id).await;
        let (bob_conn, mut bob_rx) = connect(&fx, room.id).await;
        let Ok(session) = fx.manager.handle(room.id).await else {
            panic!("no session");
        };

        // Alice greets; Bob's connection sees it with her name on it.
        let Ok(_) = session
            .send_message(
                alice.clone(),
                MessageDraft::text(alice.id, "hi"),
                Some(alice_conn),
            )
            .await
        else {
            panic!("send failed");
        };
        let Some(event) = bob_rx.recv().await else {
            panic!("expected broadcast");
        };
        assert_eq!(event.message.content.as_deref(), Some("hi"));
        assert_eq!(event.message.sender, alice.id);
        assert_eq!(event.sender_name, "alice");

        // Bob answers; Alice receives it.
        let Ok(answer) = session
            .send_message(
                bob.clone(),
                MessageDraft::text(bob.id, "hey"),
                Some(bob_conn),
            )
            .await
        else {
            panic!("send failed");
        };
        let received = drain_contents(&mut alice_rx);
        assert!(received.contains(&"hey".to_string()));

        // After reading up to Bob's message, Alice has nothing unread.
        let Ok(_) = session.mark_read(alice.id, answer.created_at).await else {
            panic!("mark_read failed");
        };
        assert_eq!(fx.store.unread_count(room.id, alice.id).await, 0);
    }

    #[tokio::test]
    async fn offline_group_member_catches_up_from_history() {
        let fx = fixture();
        let alice = UserProfile::new(UserId::new(), "alice");
        let bob = UserId::new();
        let carol = UserId::new();

        let Ok(room) = fx
            .directory
            .create_group_room(&alice, "trio", None, &[bob, carol])
            .await
        else {
            panic!("room creation failed");
        };
        let Ok(session) = fx.manager.handle(room.id).await else {
            panic!("no session");
        };

        // Bob is disconnected while Alice sends three messages.
        for text in ["first", "second", "third"] {
            let Ok(_) = session
                .send_message(alice.clone(), MessageDraft::text(alice.id, text), None)
                .await
            else {
                panic!("send failed");
            };
        }

        // On reconnect, history shows all three oldest-first.
        let history = fx.store.list_recent(room.id, 50, None).await;
        let texts: Vec<_> = history
            .iter()
            .filter(|m| m.kind == MessageKind::Text)
            .filter_map(|m| m.content.as_deref())
            .collect();
        assert_eq!(texts, ["first", "second", "third"]);

        // Unread is exactly the three texts until Bob marks read.
        assert_eq!(fx.store.unread_count(room.id, bob).await, 3);
        let Some(last) = history.last() else {
            panic!("history empty");
        };
        let Ok(_) = session.mark_read(bob, last.created_at).await else {
            panic!("mark_read failed");
        };
        assert_eq!(fx.store.unread_count(room.id, bob).await, 0);
    }
}
