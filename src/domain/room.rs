//! Room and membership entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RoomId, UserId};

/// Whether a room is a two-party conversation or a named group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    /// Exactly two members for the lifetime of the room.
    Private,
    /// One to `max_members` members.
    Group,
}

impl RoomKind {
    /// Returns the kind as its wire/database string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }
}

/// Role a member holds within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Full control over the room.
    Admin,
    /// Elevated privileges short of admin.
    Moderator,
    /// Regular member.
    Member,
}

impl MemberRole {
    /// Returns the role as its wire/database string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Member => "member",
        }
    }
}

/// A chat room grouping a set of members sharing a message stream.
///
/// Each room in the [`super::directory::RoomDirectory`] is stored as a
/// `Room`. `updated_at` doubles as the last-activity timestamp and is
/// advanced by the owning room session after each persisted message.
#[derive(Debug, Clone)]
pub struct Room {
    /// Unique room identifier (immutable after creation).
    pub id: RoomId,

    /// Private or group room.
    pub kind: RoomKind,

    /// Display name; set for group rooms, `None` for private ones.
    pub name: Option<String>,

    /// Optional free-form description for group rooms.
    pub description: Option<String>,

    /// User that created the room.
    pub created_by: UserId,

    /// Creation timestamp (immutable after creation).
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last activity in the room.
    pub updated_at: DateTime<Utc>,

    /// Whether the room is live.
    pub is_active: bool,

    /// Member capacity for group rooms.
    pub max_members: u32,
}

impl Room {
    /// Creates a private room between two users.
    #[must_use]
    pub fn private(created_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: RoomId::new(),
            kind: RoomKind::Private,
            name: None,
            description: None,
            created_by,
            created_at: now,
            updated_at: now,
            is_active: true,
            max_members: 2,
        }
    }

    /// Creates a group room with the given name and capacity.
    #[must_use]
    pub fn group(
        created_by: UserId,
        name: impl Into<String>,
        description: Option<String>,
        max_members: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RoomId::new(),
            kind: RoomKind::Group,
            name: Some(name.into()),
            description,
            created_by,
            created_at: now,
            updated_at: now,
            is_active: true,
            max_members,
        }
    }
}

/// A user's association with a room.
///
/// Unique per (room, user) pair. The last-read watermark for unread
/// counting is tracked by the [`super::store::MessageStore`].
#[derive(Debug, Clone)]
pub struct Membership {
    /// Room the membership belongs to.
    pub room_id: RoomId,

    /// Member user.
    pub user_id: UserId,

    /// Role within the room.
    pub role: MemberRole,

    /// Join timestamp.
    pub joined_at: DateTime<Utc>,

    /// Whether the membership is live. Leaving a group room deactivates
    /// the membership instead of deleting it.
    pub is_active: bool,

    /// Whether notifications are muted for this member.
    pub is_muted: bool,
}

impl Membership {
    /// Creates an active, unmuted membership with the given role.
    #[must_use]
    pub fn new(room_id: RoomId, user_id: UserId, role: MemberRole) -> Self {
        Self {
            room_id,
            user_id,
            role,
            joined_at: Utc::now(),
            is_active: true,
            is_muted: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn private_room_has_fixed_capacity() {
        let room = Room::private(UserId::new());
        assert_eq!(room.kind, RoomKind::Private);
        assert_eq!(room.max_members, 2);
        assert!(room.name.is_none());
        assert!(room.is_active);
    }

    #[test]
    fn group_room_carries_name_and_capacity() {
        let room = Room::group(UserId::new(), "rustaceans", None, 100);
        assert_eq!(room.kind, RoomKind::Group);
        assert_eq!(room.name.as_deref(), Some("rustaceans"));
        assert_eq!(room.max_members, 100);
    }

    #[test]
    fn new_membership_is_active_and_unmuted() {
        let membership = Membership::new(RoomId::new(), UserId::new(), MemberRole::Member);
        assert!(membership.is_active);
        assert!(!membership.is_muted);
        assert_eq!(membership.role, MemberRole::Member);
    }
}
