//! Room directory: room and membership storage, source of truth for
//! authorization.
//!
//! [`RoomDirectory`] stores every room together with its membership list
//! in a `HashMap` where each entry is individually protected by a
//! [`tokio::sync::RwLock`]. Room lifecycle operations (creation, leaving)
//! mutate memberships here; per-message mutation never does.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::message::MessageDraft;
use super::room::{MemberRole, Membership, Room, RoomKind};
use super::store::MessageStore;
use super::{RoomId, UserId};
use crate::error::ChatError;
use crate::identity::UserProfile;
use crate::persistence::PersistenceLayer;

/// A room and its membership rows under one lock.
#[derive(Debug)]
struct RoomEntry {
    room: Room,
    members: Vec<Membership>,
}

impl RoomEntry {
    fn membership(&self, user_id: UserId) -> Option<&Membership> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    fn membership_mut(&mut self, user_id: UserId) -> Option<&mut Membership> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    fn has_active_member(&self, user_id: UserId) -> bool {
        self.membership(user_id).is_some_and(|m| m.is_active)
    }
}

/// In-memory mapping from room identifier to membership list and
/// metadata.
///
/// # Concurrency
///
/// - Lookups on different rooms are concurrent.
/// - Room creation holds the outer map lock so concurrent
///   [`get_or_create_private_room`](Self::get_or_create_private_room)
///   calls cannot create duplicate private rooms.
#[derive(Debug)]
pub struct RoomDirectory {
    rooms: RwLock<HashMap<RoomId, Arc<RwLock<RoomEntry>>>>,
    store: Arc<MessageStore>,
    recorder: Option<Arc<dyn PersistenceLayer>>,
    default_capacity: u32,
}

impl RoomDirectory {
    /// Creates a directory backed by the given message store, without a
    /// durable recorder.
    #[must_use]
    pub fn new(store: Arc<MessageStore>, default_capacity: u32) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
            recorder: None,
            default_capacity,
        }
    }

    /// Creates a directory that records room and membership mutations
    /// through `recorder` before applying them in memory.
    #[must_use]
    pub fn with_recorder(
        store: Arc<MessageStore>,
        default_capacity: u32,
        recorder: Arc<dyn PersistenceLayer>,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
            recorder: Some(recorder),
            default_capacity,
        }
    }

    /// Returns a snapshot of the room.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`] if no room with the given ID
    /// exists.
    pub async fn room(&self, room_id: RoomId) -> Result<Room, ChatError> {
        let entry = self.entry(room_id).await?;
        let entry = entry.read().await;
        Ok(entry.room.clone())
    }

    /// Number of rooms in the directory.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Returns the existing private room between the two users, or
    /// atomically creates one with `user_a` as admin and `user_b` as
    /// member. Idempotent: the same pair always maps to the same room.
    ///
    /// # Errors
    ///
    /// - [`ChatError::InvalidOperation`] when both users are the same.
    /// - [`ChatError::PersistenceFailure`] when the durable recorder
    ///   rejects a write.
    pub async fn get_or_create_private_room(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Room, ChatError> {
        if user_a == user_b {
            return Err(ChatError::InvalidOperation(
                "cannot start a private chat with yourself".to_string(),
            ));
        }

        // The outer write lock is held across scan + insert so two
        // concurrent calls for the same pair cannot both create.
        let mut map = self.rooms.write().await;
        for entry_lock in map.values() {
            let entry = entry_lock.read().await;
            if entry.room.kind == RoomKind::Private
                && entry.membership(user_a).is_some()
                && entry.membership(user_b).is_some()
            {
                return Ok(entry.room.clone());
            }
        }

        let room = Room::private(user_a);
        let members = vec![
            Membership::new(room.id, user_a, MemberRole::Admin),
            Membership::new(room.id, user_b, MemberRole::Member),
        ];
        if let Some(recorder) = &self.recorder {
            recorder.save_room(&room).await?;
            for membership in &members {
                recorder.save_membership(membership).await?;
            }
        }

        let created = Utc::now();
        map.insert(
            room.id,
            Arc::new(RwLock::new(RoomEntry {
                room: room.clone(),
                members,
            })),
        );
        drop(map);

        self.store.init_watermark(room.id, user_a, created).await?;
        self.store.init_watermark(room.id, user_b, created).await?;

        tracing::info!(room_id = %room.id, "private room created");
        Ok(room)
    }

    /// Creates a group room with the creator as admin and the given
    /// members, deduplicated and with the creator excluded from the
    /// member list. Appends a system message announcing the creation.
    ///
    /// # Errors
    ///
    /// - [`ChatError::CapacityExceeded`] when the member list does not
    ///   fit the room capacity.
    /// - [`ChatError::PersistenceFailure`] when the durable recorder
    ///   rejects a write.
    pub async fn create_group_room(
        &self,
        creator: &UserProfile,
        name: &str,
        description: Option<String>,
        member_ids: &[UserId],
    ) -> Result<Room, ChatError> {
        let mut others: Vec<UserId> = Vec::new();
        for &user_id in member_ids {
            if user_id != creator.id && !others.contains(&user_id) {
                others.push(user_id);
            }
        }

        let capacity = self.default_capacity;
        let total = 1 + others.len() as u32;
        if total > capacity {
            return Err(ChatError::CapacityExceeded { limit: capacity });
        }

        let room = Room::group(creator.id, name, description, capacity);
        let mut members = vec![Membership::new(room.id, creator.id, MemberRole::Admin)];
        for &user_id in &others {
            members.push(Membership::new(room.id, user_id, MemberRole::Member));
        }
        if let Some(recorder) = &self.recorder {
            recorder.save_room(&room).await?;
            for membership in &members {
                recorder.save_membership(membership).await?;
            }
        }

        let member_ids: Vec<UserId> = members.iter().map(|m| m.user_id).collect();
        self.rooms.write().await.insert(
            room.id,
            Arc::new(RwLock::new(RoomEntry {
                room: room.clone(),
                members,
            })),
        );

        let notice = self
            .store
            .append(
                room.id,
                MessageDraft::system(
                    creator.id,
                    format!("{} created the group '{name}'", creator.username),
                ),
            )
            .await?;
        for user_id in member_ids {
            self.store
                .init_watermark(room.id, user_id, notice.created_at)
                .await?;
        }

        tracing::info!(room_id = %room.id, name, members = total, "group room created");
        Ok(room)
    }

    /// Returns `true` if the user holds an active membership in the
    /// room. Unknown rooms yield `false`.
    pub async fn is_member(&self, room_id: RoomId, user_id: UserId) -> bool {
        let Ok(entry) = self.entry(room_id).await else {
            return false;
        };
        let entry = entry.read().await;
        entry.has_active_member(user_id)
    }

    /// Returns the user's active membership in the room.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`] for unknown rooms and
    /// [`ChatError::NotMember`] when the user has no active membership.
    pub async fn membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Membership, ChatError> {
        let entry = self.entry(room_id).await?;
        let entry = entry.read().await;
        entry
            .membership(user_id)
            .filter(|m| m.is_active)
            .cloned()
            .ok_or(ChatError::NotMember)
    }

    /// Returns the room's active memberships.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`] if no room with the given ID
    /// exists.
    pub async fn members(&self, room_id: RoomId) -> Result<Vec<Membership>, ChatError> {
        let entry = self.entry(room_id).await?;
        let entry = entry.read().await;
        Ok(entry
            .members
            .iter()
            .filter(|m| m.is_active)
            .cloned()
            .collect())
    }

    /// Deactivates the user's membership in a group room and appends a
    /// departure system message.
    ///
    /// # Errors
    ///
    /// - [`ChatError::RoomNotFound`] for unknown rooms.
    /// - [`ChatError::InvalidOperation`] for private rooms; the
    ///   membership stays active.
    /// - [`ChatError::NotMember`] when the user has no membership row.
    /// - [`ChatError::PersistenceFailure`] when the durable recorder
    ///   rejects a write.
    pub async fn leave_room(&self, room_id: RoomId, user: &UserProfile) -> Result<(), ChatError> {
        let entry = self.entry(room_id).await?;
        {
            let mut entry = entry.write().await;
            if entry.room.kind == RoomKind::Private {
                return Err(ChatError::InvalidOperation(
                    "cannot leave a private chat".to_string(),
                ));
            }
            if entry.membership(user.id).is_none() {
                return Err(ChatError::NotMember);
            }

            let mut updated = entry
                .membership(user.id)
                .cloned()
                .ok_or(ChatError::NotMember)?;
            updated.is_active = false;
            if let Some(recorder) = &self.recorder {
                recorder.save_membership(&updated).await?;
            }
            if let Some(membership) = entry.membership_mut(user.id) {
                membership.is_active = false;
            }
        }

        self.store
            .append(
                room_id,
                MessageDraft::system(user.id, format!("{} left the group", user.username)),
            )
            .await?;

        tracing::info!(room_id = %room_id, user_id = %user.id, "member left room");
        Ok(())
    }

    /// Advances the room's last-activity timestamp. Called by the room
    /// session after each persisted message.
    pub async fn touch_room(&self, room_id: RoomId, at: DateTime<Utc>) {
        if let Ok(entry) = self.entry(room_id).await {
            let mut entry = entry.write().await;
            if at > entry.room.updated_at {
                entry.room.updated_at = at;
            }
        }
    }

    async fn entry(&self, room_id: RoomId) -> Result<Arc<RwLock<RoomEntry>>, ChatError> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(ChatError::RoomNotFound(*room_id.as_uuid()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;

    fn directory() -> RoomDirectory {
        RoomDirectory::new(Arc::new(MessageStore::new()), 100)
    }

    fn profile(name: &str) -> UserProfile {
        UserProfile::new(UserId::new(), name)
    }

    #[tokio::test]
    async fn private_room_is_idempotent() {
        let dir = directory();
        let (a, b) = (UserId::new(), UserId::new());

        let Ok(first) = dir.get_or_create_private_room(a, b).await else {
            panic!("creation failed");
        };
        let Ok(second) = dir.get_or_create_private_room(a, b).await else {
            panic!("lookup failed");
        };
        // Order of the pair does not matter either.
        let Ok(swapped) = dir.get_or_create_private_room(b, a).await else {
            panic!("lookup failed");
        };

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, swapped.id);
        assert_eq!(dir.room_count().await, 1);
    }

    #[tokio::test]
    async fn private_room_has_two_active_memberships() {
        let dir = directory();
        let (a, b) = (UserId::new(), UserId::new());
        let Ok(room) = dir.get_or_create_private_room(a, b).await else {
            panic!("creation failed");
        };

        let Ok(members) = dir.members(room.id).await else {
            panic!("members failed");
        };
        assert_eq!(members.len(), 2);
        assert!(dir.is_member(room.id, a).await);
        assert!(dir.is_member(room.id, b).await);

        let Ok(creator) = dir.membership(room.id, a).await else {
            panic!("membership failed");
        };
        assert_eq!(creator.role, MemberRole::Admin);
    }

    #[tokio::test]
    async fn private_chat_with_yourself_is_rejected() {
        let dir = directory();
        let a = UserId::new();
        let result = dir.get_or_create_private_room(a, a).await;
        assert!(matches!(result, Err(ChatError::InvalidOperation(_))));
        assert_eq!(dir.room_count().await, 0);
    }

    #[tokio::test]
    async fn group_creation_dedupes_members_and_announces() {
        let store = Arc::new(MessageStore::new());
        let dir = RoomDirectory::new(Arc::clone(&store), 100);
        let creator = profile("alice");
        let bob = UserId::new();

        // Creator and a duplicate in the member list are both dropped.
        let Ok(room) = dir
            .create_group_room(&creator, "rustaceans", None, &[creator.id, bob, bob])
            .await
        else {
            panic!("creation failed");
        };

        let Ok(members) = dir.members(room.id).await else {
            panic!("members failed");
        };
        assert_eq!(members.len(), 2);

        let history = store.list_recent(room.id, 10, None).await;
        assert_eq!(history.len(), 1);
        assert!(history.iter().all(|m| m.kind == MessageKind::System));
        assert!(
            history
                .iter()
                .filter_map(|m| m.content.as_deref())
                .all(|c| c == "alice created the group 'rustaceans'")
        );

        // The creation notice does not count as unread for anyone.
        assert_eq!(store.unread_count(room.id, bob).await, 0);
    }

    #[tokio::test]
    async fn group_capacity_is_enforced() {
        let dir = RoomDirectory::new(Arc::new(MessageStore::new()), 2);
        let creator = profile("alice");
        let members = [UserId::new(), UserId::new()];

        let result = dir
            .create_group_room(&creator, "too big", None, &members)
            .await;
        assert!(matches!(
            result,
            Err(ChatError::CapacityExceeded { limit: 2 })
        ));
    }

    #[tokio::test]
    async fn leaving_a_private_room_fails_and_keeps_membership() {
        let dir = directory();
        let alice = profile("alice");
        let bob = UserId::new();
        let Ok(room) = dir.get_or_create_private_room(alice.id, bob).await else {
            panic!("creation failed");
        };

        let result = dir.leave_room(room.id, &alice).await;
        assert!(matches!(result, Err(ChatError::InvalidOperation(_))));
        assert!(dir.is_member(room.id, alice.id).await);
    }

    #[tokio::test]
    async fn leaving_without_membership_fails() {
        let dir = directory();
        let creator = profile("alice");
        let Ok(room) = dir.create_group_room(&creator, "team", None, &[]).await else {
            panic!("creation failed");
        };

        let outsider = profile("mallory");
        let result = dir.leave_room(room.id, &outsider).await;
        assert!(matches!(result, Err(ChatError::NotMember)));
    }

    #[tokio::test]
    async fn leaving_a_group_deactivates_and_announces() {
        let store = Arc::new(MessageStore::new());
        let dir = RoomDirectory::new(Arc::clone(&store), 100);
        let creator = profile("alice");
        let bob = profile("bob");
        let Ok(room) = dir
            .create_group_room(&creator, "team", None, &[bob.id])
            .await
        else {
            panic!("creation failed");
        };

        let Ok(()) = dir.leave_room(room.id, &bob).await else {
            panic!("leave failed");
        };
        assert!(!dir.is_member(room.id, bob.id).await);

        let history = store.list_recent(room.id, 10, None).await;
        assert!(
            history
                .iter()
                .filter_map(|m| m.content.as_deref())
                .any(|c| c == "bob left the group")
        );
    }

    #[tokio::test]
    async fn unknown_room_is_not_a_membership() {
        let dir = directory();
        assert!(!dir.is_member(RoomId::new(), UserId::new()).await);
        let result = dir.room(RoomId::new()).await;
        assert!(matches!(result, Err(ChatError::RoomNotFound(_))));
    }
}
