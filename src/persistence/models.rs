//! Database row models for the chat tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::message::{Attachment, Message, MessageKind};
use crate::domain::{MessageId, RoomId, UserId};

/// A message row from the `messages` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    /// Time-ordered message id.
    pub id: Uuid,
    /// Owning room.
    pub room_id: Uuid,
    /// Sending user.
    pub sender_id: Uuid,
    /// Message kind discriminator (e.g. `"text"`).
    pub kind: String,
    /// Text content; tombstone text when `is_deleted` is set.
    pub content: Option<String>,
    /// Attachment file name.
    pub file_name: Option<String>,
    /// Attachment size in bytes.
    pub file_size: Option<i64>,
    /// Opaque blob-store locator.
    pub file_locator: Option<String>,
    /// Arrival timestamp.
    pub created_at: DateTime<Utc>,
    /// Edit marker.
    pub edited_at: Option<DateTime<Utc>>,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Reply target within the same room.
    pub reply_to: Option<Uuid>,
}

impl MessageRow {
    /// Rebuilds the domain message from its stored row. Returns `None`
    /// when the kind discriminator is not one of the known values.
    #[must_use]
    pub fn into_message(self) -> Option<Message> {
        let kind = MessageKind::parse(&self.kind)?;
        let attachment = match (self.file_name, self.file_size, self.file_locator) {
            (Some(file_name), Some(size), Some(locator)) => Some(Attachment {
                file_name,
                size: u64::try_from(size).unwrap_or_default(),
                locator,
            }),
            _ => None,
        };
        Some(Message {
            id: MessageId::from_uuid(self.id),
            room_id: RoomId::from_uuid(self.room_id),
            sender: UserId::from_uuid(self.sender_id),
            kind,
            content: self.content,
            attachment,
            created_at: self.created_at,
            edited_at: self.edited_at,
            is_deleted: self.is_deleted,
            reply_to: self.reply_to.map(MessageId::from_uuid),
        })
    }
}

/// A watermark row from the `read_watermarks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkRow {
    /// Room the watermark applies to.
    pub room_id: Uuid,
    /// Member user.
    pub user_id: Uuid,
    /// Last-read timestamp.
    pub last_read_at: DateTime<Utc>,
}
