//! Persistence layer: durable room, membership, and message records.
//!
//! Provides the [`PersistenceLayer`] trait for durable storage of chat
//! state. The concrete implementation uses `sqlx::PgPool` for async
//! PostgreSQL access. The in-memory components invoke the recorder
//! before mutating their own state, so a rejected write never leaves
//! partially applied state behind.

pub mod models;
pub mod postgres;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::domain::message::Message;
use crate::domain::room::{Membership, Room};
use crate::domain::{MessageId, RoomId, UserId};
use crate::error::ChatError;

use models::{MessageRow, WatermarkRow};

pub use postgres::PostgresPersistence;

/// Durable recorder for chat state mutations.
///
/// Methods return boxed futures so the trait stays object-safe and the
/// domain components can hold an `Arc<dyn PersistenceLayer>`.
pub trait PersistenceLayer: Send + Sync + std::fmt::Debug {
    /// Records a newly created room.
    fn save_room<'a>(&'a self, room: &'a Room) -> BoxFuture<'a, Result<(), ChatError>>;

    /// Records a created or updated membership row.
    fn save_membership<'a>(
        &'a self,
        membership: &'a Membership,
    ) -> BoxFuture<'a, Result<(), ChatError>>;

    /// Appends a message to the durable log.
    fn save_message<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), ChatError>>;

    /// Records an edit to a message's content.
    fn save_edit<'a>(
        &'a self,
        room: RoomId,
        message: MessageId,
        content: &'a str,
        edited_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), ChatError>>;

    /// Marks a message as soft-deleted and tombstones its content.
    fn mark_deleted(
        &self,
        room: RoomId,
        message: MessageId,
    ) -> BoxFuture<'_, Result<(), ChatError>>;

    /// Upserts a member's last-read watermark.
    fn save_watermark(
        &self,
        room: RoomId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), ChatError>>;

    /// Loads up to `limit` of the room's newest messages, oldest first.
    fn load_recent_messages(
        &self,
        room: RoomId,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<MessageRow>, ChatError>>;

    /// Loads every last-read watermark recorded for the room.
    fn load_watermarks(&self, room: RoomId) -> BoxFuture<'_, Result<Vec<WatermarkRow>, ChatError>>;
}
