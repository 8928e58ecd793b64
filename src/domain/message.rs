//! Message, attachment, and reaction entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, RoomId, UserId};

/// Content shown in place of a soft-deleted message.
pub const TOMBSTONE_TEXT: &str = "This message was deleted";

/// Discriminator for message content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message.
    Text,
    /// Image attachment.
    Image,
    /// Generic file attachment.
    File,
    /// Server-generated notice (room created, member left, ...).
    System,
}

impl MessageKind {
    /// Returns the kind as its wire/database string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }

    /// Parses the wire/database string form of a kind.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Opaque handle to a blob stored by the external file-storage
/// collaborator. The core never reads or writes file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name.
    pub file_name: String,
    /// Size in bytes as reported by the blob store.
    pub size: u64,
    /// Opaque locator understood by the blob store.
    pub locator: String,
}

/// A single message in a room's append-only log.
///
/// Ordering is total within a room by arrival time; the v7 [`MessageId`]
/// sorts the same way. Soft deletion keeps the row but replaces its
/// content with [`TOMBSTONE_TEXT`].
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique, time-ordered message identifier.
    pub id: MessageId,

    /// Room the message belongs to.
    pub room_id: RoomId,

    /// Sending user.
    pub sender: UserId,

    /// Content kind discriminator.
    pub kind: MessageKind,

    /// Text content; `None` for attachment-only messages.
    pub content: Option<String>,

    /// Attachment handle for image/file messages.
    pub attachment: Option<Attachment>,

    /// Arrival timestamp (immutable after creation).
    pub created_at: DateTime<Utc>,

    /// Set when the content has been edited.
    pub edited_at: Option<DateTime<Utc>>,

    /// Soft-delete flag; when set, `content` is the tombstone text.
    pub is_deleted: bool,

    /// Message this one replies to, always within the same room.
    pub reply_to: Option<MessageId>,
}

impl Message {
    /// Returns `true` if the content has been edited since creation.
    #[must_use]
    pub const fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }
}

/// Validated input for appending a message to a room log.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    /// Sending user.
    pub sender: UserId,
    /// Content kind discriminator.
    pub kind: MessageKind,
    /// Text content.
    pub content: Option<String>,
    /// Attachment handle.
    pub attachment: Option<Attachment>,
    /// Reply target, which must live in the same room.
    pub reply_to: Option<MessageId>,
}

impl MessageDraft {
    /// Draft for a plain text message.
    #[must_use]
    pub fn text(sender: UserId, content: impl Into<String>) -> Self {
        Self {
            sender,
            kind: MessageKind::Text,
            content: Some(content.into()),
            attachment: None,
            reply_to: None,
        }
    }

    /// Draft for a server-generated system notice.
    #[must_use]
    pub fn system(sender: UserId, content: impl Into<String>) -> Self {
        Self {
            sender,
            kind: MessageKind::System,
            content: Some(content.into()),
            attachment: None,
            reply_to: None,
        }
    }

    /// Draft carrying an attachment handle, with optional caption text.
    #[must_use]
    pub fn attachment(
        sender: UserId,
        kind: MessageKind,
        attachment: Attachment,
        caption: Option<String>,
    ) -> Self {
        Self {
            sender,
            kind,
            content: caption,
            attachment: Some(attachment),
            reply_to: None,
        }
    }

    /// Marks the draft as a reply to another message in the same room.
    #[must_use]
    pub fn in_reply_to(mut self, target: MessageId) -> Self {
        self.reply_to = Some(target);
        self
    }
}

/// Reaction kinds, a closed emoji set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    /// 👍
    Like,
    /// ❤️
    Love,
    /// 😂
    Laugh,
    /// 😮
    Wow,
    /// 😢
    Sad,
    /// 😠
    Angry,
}

/// A user's reaction to a message. Unique per (message, user, kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Reacted-to message.
    pub message_id: MessageId,
    /// Reacting user.
    pub user_id: UserId,
    /// Which reaction was given.
    pub kind: ReactionKind,
    /// When the reaction was added.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn text_draft_has_content_and_no_attachment() {
        let draft = MessageDraft::text(UserId::new(), "hello");
        assert_eq!(draft.kind, MessageKind::Text);
        assert_eq!(draft.content.as_deref(), Some("hello"));
        assert!(draft.attachment.is_none());
        assert!(draft.reply_to.is_none());
    }

    #[test]
    fn in_reply_to_sets_target() {
        let target = MessageId::new();
        let draft = MessageDraft::text(UserId::new(), "hello").in_reply_to(target);
        assert_eq!(draft.reply_to, Some(target));
    }

    #[test]
    fn attachment_draft_may_omit_caption() {
        let handle = Attachment {
            file_name: "photo.png".to_string(),
            size: 2048,
            locator: "blob://abc".to_string(),
        };
        let draft = MessageDraft::attachment(UserId::new(), MessageKind::Image, handle, None);
        assert!(draft.content.is_none());
        assert!(draft.attachment.is_some());
    }
}
