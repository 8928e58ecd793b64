//! Per-room append-only message logs with read-state tracking.
//!
//! [`MessageStore`] stores each room's log in a `HashMap` where every
//! entry is individually protected by a [`tokio::sync::RwLock`], so
//! appends to different rooms run concurrently while a single room's log
//! is mutated by one writer at a time. The store also tracks the
//! per-member last-read watermark used for unread counting.
//!
//! When a durable recorder is configured, it is invoked before the
//! in-memory mutation: a failed write surfaces as
//! [`ChatError::PersistenceFailure`] and leaves no partial state behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::message::{Message, MessageDraft, Reaction, ReactionKind, TOMBSTONE_TEXT};
use super::{MessageId, RoomId, UserId};
use crate::error::ChatError;
use crate::persistence::PersistenceLayer;

/// One room's ordered log plus its ancillary read-state.
#[derive(Debug, Default)]
struct RoomLog {
    /// Messages in arrival order.
    messages: Vec<Message>,
    /// Reactions across all messages in the room.
    reactions: Vec<Reaction>,
    /// Last-read watermark per member.
    watermarks: HashMap<UserId, DateTime<Utc>>,
}

impl RoomLog {
    fn find(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn find_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// Append-only, per-room ordered message store.
///
/// # Concurrency
///
/// - Appends to different rooms are concurrent.
/// - All mutation of one room's log is serialized by its entry lock.
/// - Readers of one room run concurrently with each other.
#[derive(Debug)]
pub struct MessageStore {
    rooms: RwLock<HashMap<RoomId, Arc<RwLock<RoomLog>>>>,
    recorder: Option<Arc<dyn PersistenceLayer>>,
}

impl MessageStore {
    /// Creates an in-memory store with no durable recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            recorder: None,
        }
    }

    /// Creates a store that records every mutation through `recorder`
    /// before applying it in memory.
    #[must_use]
    pub fn with_recorder(recorder: Arc<dyn PersistenceLayer>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            recorder: Some(recorder),
        }
    }

    /// Returns the room's log, creating an empty one if absent.
    async fn log(&self, room_id: RoomId) -> Arc<RwLock<RoomLog>> {
        let mut map = self.rooms.write().await;
        Arc::clone(map.entry(room_id).or_default())
    }

    /// Returns the room's log if one exists.
    async fn existing_log(&self, room_id: RoomId) -> Option<Arc<RwLock<RoomLog>>> {
        self.rooms.read().await.get(&room_id).cloned()
    }

    /// Fills an empty in-memory log from the durable recorder: the
    /// newest `limit` messages plus every recorded watermark. A no-op
    /// without a recorder, or once the log already holds messages.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::PersistenceFailure`] when a durable load
    /// fails.
    pub async fn hydrate_room(&self, room_id: RoomId, limit: usize) -> Result<(), ChatError> {
        let Some(recorder) = &self.recorder else {
            return Ok(());
        };
        let log = self.log(room_id).await;
        let mut log = log.write().await;
        if !log.messages.is_empty() {
            return Ok(());
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        for row in recorder.load_recent_messages(room_id, limit).await? {
            match row.into_message() {
                Some(message) => log.messages.push(message),
                None => {
                    tracing::warn!(room_id = %room_id, "skipping stored message of unknown kind");
                }
            }
        }
        for row in recorder.load_watermarks(room_id).await? {
            let user_id = UserId::from_uuid(row.user_id);
            log.watermarks
                .entry(user_id)
                .and_modify(|current| *current = (*current).max(row.last_read_at))
                .or_insert(row.last_read_at);
        }
        Ok(())
    }

    /// Validates and appends a message to the room's log.
    ///
    /// # Errors
    ///
    /// - [`ChatError::EmptyMessage`] when the draft has neither trimmed
    ///   text content nor an attachment.
    /// - [`ChatError::InvalidReference`] when `reply_to` does not name a
    ///   message in the same room.
    /// - [`ChatError::PersistenceFailure`] when the durable recorder
    ///   rejects the write; the in-memory log is left untouched.
    pub async fn append(&self, room_id: RoomId, draft: MessageDraft) -> Result<Message, ChatError> {
        let content = draft
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ToOwned::to_owned);
        if content.is_none() && draft.attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let log = self.log(room_id).await;
        let mut log = log.write().await;

        if let Some(target) = draft.reply_to
            && log.find(target).is_none()
        {
            return Err(ChatError::InvalidReference(*target.as_uuid()));
        }

        let message = Message {
            id: MessageId::new(),
            room_id,
            sender: draft.sender,
            kind: draft.kind,
            content,
            attachment: draft.attachment,
            created_at: Utc::now(),
            edited_at: None,
            is_deleted: false,
            reply_to: draft.reply_to,
        };

        if let Some(recorder) = &self.recorder {
            recorder.save_message(&message).await?;
        }

        log.messages.push(message.clone());
        Ok(message)
    }

    /// Returns up to `limit` messages, oldest first, restricted to those
    /// that arrived strictly before `before` when given.
    ///
    /// Soft-deleted messages remain visible as tombstoned placeholders.
    pub async fn list_recent(
        &self,
        room_id: RoomId,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Vec<Message> {
        let Some(log) = self.existing_log(room_id).await else {
            return Vec::new();
        };
        let log = log.read().await;

        let eligible: Vec<&Message> = log
            .messages
            .iter()
            .filter(|m| before.is_none_or(|cutoff| m.created_at < cutoff))
            .collect();
        let skip = eligible.len().saturating_sub(limit);
        eligible.into_iter().skip(skip).cloned().collect()
    }

    /// Returns a snapshot of the message with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MessageNotFound`] if the room has no such
    /// message.
    pub async fn message(&self, room_id: RoomId, id: MessageId) -> Result<Message, ChatError> {
        let log = self
            .existing_log(room_id)
            .await
            .ok_or(ChatError::MessageNotFound(*id.as_uuid()))?;
        let log = log.read().await;
        log.find(id)
            .cloned()
            .ok_or(ChatError::MessageNotFound(*id.as_uuid()))
    }

    /// Number of messages in the room's log, tombstones included.
    pub async fn message_count(&self, room_id: RoomId) -> usize {
        match self.existing_log(room_id).await {
            Some(log) => log.read().await.messages.len(),
            None => 0,
        }
    }

    /// Soft-deletes a message: sets the delete flag and replaces the
    /// content with the tombstone text, preserving id, sender, and
    /// timestamps. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MessageNotFound`] if the room has no such
    /// message, or [`ChatError::PersistenceFailure`] when the durable
    /// recorder rejects the write.
    pub async fn soft_delete(
        &self,
        room_id: RoomId,
        id: MessageId,
    ) -> Result<Message, ChatError> {
        let log = self
            .existing_log(room_id)
            .await
            .ok_or(ChatError::MessageNotFound(*id.as_uuid()))?;
        let mut log = log.write().await;
        if log.find(id).is_none() {
            return Err(ChatError::MessageNotFound(*id.as_uuid()));
        }

        if let Some(recorder) = &self.recorder {
            recorder.mark_deleted(room_id, id).await?;
        }

        let Some(message) = log.find_mut(id) else {
            return Err(ChatError::MessageNotFound(*id.as_uuid()));
        };
        message.is_deleted = true;
        message.content = Some(TOMBSTONE_TEXT.to_string());
        Ok(message.clone())
    }

    /// Replaces a message's content and stamps the edit marker.
    ///
    /// # Errors
    ///
    /// - [`ChatError::MessageNotFound`] if the room has no such message.
    /// - [`ChatError::InvalidOperation`] for deleted or system messages.
    /// - [`ChatError::EmptyMessage`] when the new content trims to empty.
    /// - [`ChatError::PersistenceFailure`] when the durable recorder
    ///   rejects the write.
    pub async fn edit(
        &self,
        room_id: RoomId,
        id: MessageId,
        new_content: &str,
    ) -> Result<Message, ChatError> {
        let trimmed = new_content.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let log = self
            .existing_log(room_id)
            .await
            .ok_or(ChatError::MessageNotFound(*id.as_uuid()))?;
        let mut log = log.write().await;
        {
            let current = log
                .find(id)
                .ok_or(ChatError::MessageNotFound(*id.as_uuid()))?;
            if current.is_deleted {
                return Err(ChatError::InvalidOperation(
                    "cannot edit a deleted message".to_string(),
                ));
            }
            if current.kind == super::message::MessageKind::System {
                return Err(ChatError::InvalidOperation(
                    "cannot edit a system message".to_string(),
                ));
            }
        }

        let edited_at = Utc::now();
        if let Some(recorder) = &self.recorder {
            recorder.save_edit(room_id, id, trimmed, edited_at).await?;
        }

        let Some(message) = log.find_mut(id) else {
            return Err(ChatError::MessageNotFound(*id.as_uuid()));
        };
        message.content = Some(trimmed.to_string());
        message.edited_at = Some(edited_at);
        Ok(message.clone())
    }

    /// Advances the member's last-read watermark to
    /// `max(current, up_to)` and returns the effective watermark.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::PersistenceFailure`] when the durable
    /// recorder rejects an advanced watermark.
    pub async fn mark_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        up_to: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ChatError> {
        let log = self.log(room_id).await;
        let mut log = log.write().await;

        let current = log.watermarks.get(&user_id).copied();
        let effective = current.map_or(up_to, |c| c.max(up_to));
        if current != Some(effective) {
            if let Some(recorder) = &self.recorder {
                recorder.save_watermark(room_id, user_id, effective).await?;
            }
            log.watermarks.insert(user_id, effective);
        }
        Ok(effective)
    }

    /// Initializes the member's watermark if none exists yet. Called by
    /// the room directory at membership creation so that pre-join history
    /// never counts as unread.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::PersistenceFailure`] when the durable
    /// recorder rejects the write.
    pub async fn init_watermark(
        &self,
        room_id: RoomId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        let log = self.log(room_id).await;
        let mut log = log.write().await;
        if log.watermarks.contains_key(&user_id) {
            return Ok(());
        }
        if let Some(recorder) = &self.recorder {
            recorder.save_watermark(room_id, user_id, at).await?;
        }
        log.watermarks.insert(user_id, at);
        Ok(())
    }

    /// Counts messages that arrived after the member's watermark,
    /// excluding messages the member sent.
    pub async fn unread_count(&self, room_id: RoomId, user_id: UserId) -> u64 {
        let Some(log) = self.existing_log(room_id).await else {
            return 0;
        };
        let log = log.read().await;
        let watermark = log
            .watermarks
            .get(&user_id)
            .copied()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        log.messages
            .iter()
            .filter(|m| m.created_at > watermark && m.sender != user_id)
            .count() as u64
    }

    /// Adds a reaction; returns `false` when the (message, user, kind)
    /// triple already exists.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MessageNotFound`] if the room has no such
    /// message.
    pub async fn add_reaction(
        &self,
        room_id: RoomId,
        id: MessageId,
        user_id: UserId,
        kind: ReactionKind,
    ) -> Result<bool, ChatError> {
        let log = self
            .existing_log(room_id)
            .await
            .ok_or(ChatError::MessageNotFound(*id.as_uuid()))?;
        let mut log = log.write().await;
        if log.find(id).is_none() {
            return Err(ChatError::MessageNotFound(*id.as_uuid()));
        }
        let exists = log
            .reactions
            .iter()
            .any(|r| r.message_id == id && r.user_id == user_id && r.kind == kind);
        if exists {
            return Ok(false);
        }
        log.reactions.push(Reaction {
            message_id: id,
            user_id,
            kind,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    /// Removes a reaction; returns `false` when no matching triple exists.
    pub async fn remove_reaction(
        &self,
        room_id: RoomId,
        id: MessageId,
        user_id: UserId,
        kind: ReactionKind,
    ) -> bool {
        let Some(log) = self.existing_log(room_id).await else {
            return false;
        };
        let mut log = log.write().await;
        let before = log.reactions.len();
        log.reactions
            .retain(|r| !(r.message_id == id && r.user_id == user_id && r.kind == kind));
        log.reactions.len() != before
    }

    /// Returns the reactions on a message, in the order they were added.
    pub async fn reactions(&self, room_id: RoomId, id: MessageId) -> Vec<Reaction> {
        let Some(log) = self.existing_log(room_id).await else {
            return Vec::new();
        };
        let log = log.read().await;
        log.reactions
            .iter()
            .filter(|r| r.message_id == id)
            .cloned()
            .collect()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
