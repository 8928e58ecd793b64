//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::PersistenceLayer;
use super::models::{MessageRow, WatermarkRow};
use crate::config::ChatConfig;
use crate::domain::message::{Message, TOMBSTONE_TEXT};
use crate::domain::room::{Membership, Room};
use crate::domain::{MessageId, RoomId, UserId};
use crate::error::ChatError;

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the configured database and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceFailure`] when the connection
    /// or a migration fails.
    pub async fn connect(config: &ChatConfig) -> Result<Self, ChatError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;

        Ok(Self::new(pool))
    }

}

impl PersistenceLayer for PostgresPersistence {
    fn save_room<'a>(&'a self, room: &'a Room) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO rooms (id, kind, name, description, created_by, created_at, \
                 updated_at, is_active, max_members) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(*room.id.as_uuid())
            .bind(room.kind.as_str())
            .bind(room.name.as_deref())
            .bind(room.description.as_deref())
            .bind(*room.created_by.as_uuid())
            .bind(room.created_at)
            .bind(room.updated_at)
            .bind(room.is_active)
            .bind(i64::from(room.max_members))
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;
            Ok(())
        })
    }

    fn save_membership<'a>(
        &'a self,
        membership: &'a Membership,
    ) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO memberships (room_id, user_id, role, joined_at, is_active, is_muted) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (room_id, user_id) DO UPDATE \
                 SET role = $3, is_active = $5, is_muted = $6",
            )
            .bind(*membership.room_id.as_uuid())
            .bind(*membership.user_id.as_uuid())
            .bind(membership.role.as_str())
            .bind(membership.joined_at)
            .bind(membership.is_active)
            .bind(membership.is_muted)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;
            Ok(())
        })
    }

    fn save_message<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO messages (id, room_id, sender_id, kind, content, file_name, \
                 file_size, file_locator, created_at, edited_at, is_deleted, reply_to) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(*message.id.as_uuid())
            .bind(*message.room_id.as_uuid())
            .bind(*message.sender.as_uuid())
            .bind(message.kind.as_str())
            .bind(message.content.as_deref())
            .bind(message.attachment.as_ref().map(|a| a.file_name.as_str()))
            .bind(message.attachment.as_ref().map(|a| a.size as i64))
            .bind(message.attachment.as_ref().map(|a| a.locator.as_str()))
            .bind(message.created_at)
            .bind(message.edited_at)
            .bind(message.is_deleted)
            .bind(message.reply_to.map(|id| *id.as_uuid()))
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;
            Ok(())
        })
    }

    fn save_edit<'a>(
        &'a self,
        room: RoomId,
        message: MessageId,
        content: &'a str,
        edited_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE messages SET content = $3, edited_at = $4 \
                 WHERE id = $2 AND room_id = $1 AND NOT is_deleted",
            )
            .bind(*room.as_uuid())
            .bind(*message.as_uuid())
            .bind(content)
            .bind(edited_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;
            Ok(())
        })
    }

    fn mark_deleted(
        &self,
        room: RoomId,
        message: MessageId,
    ) -> BoxFuture<'_, Result<(), ChatError>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE messages SET is_deleted = TRUE, content = $3 \
                 WHERE id = $2 AND room_id = $1",
            )
            .bind(*room.as_uuid())
            .bind(*message.as_uuid())
            .bind(TOMBSTONE_TEXT)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;
            Ok(())
        })
    }

    fn save_watermark(
        &self,
        room: RoomId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), ChatError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO read_watermarks (room_id, user_id, last_read_at) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (room_id, user_id) DO UPDATE \
                 SET last_read_at = GREATEST(read_watermarks.last_read_at, $3)",
            )
            .bind(*room.as_uuid())
            .bind(*user.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;
            Ok(())
        })
    }

    fn load_recent_messages(
        &self,
        room: RoomId,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<MessageRow>, ChatError>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, String, Option<String>, Option<String>, Option<i64>, Option<String>, DateTime<Utc>, Option<DateTime<Utc>>, bool, Option<Uuid>)>(
                "SELECT id, room_id, sender_id, kind, content, file_name, file_size, file_locator, \
                 created_at, edited_at, is_deleted, reply_to \
                 FROM (SELECT * FROM messages WHERE room_id = $1 ORDER BY created_at DESC LIMIT $2) page \
                 ORDER BY created_at ASC",
            )
            .bind(*room.as_uuid())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(
                    |(
                        id,
                        room_id,
                        sender_id,
                        kind,
                        content,
                        file_name,
                        file_size,
                        file_locator,
                        created_at,
                        edited_at,
                        is_deleted,
                        reply_to,
                    )| MessageRow {
                        id,
                        room_id,
                        sender_id,
                        kind,
                        content,
                        file_name,
                        file_size,
                        file_locator,
                        created_at,
                        edited_at,
                        is_deleted,
                        reply_to,
                    },
                )
                .collect())
        })
    }

    fn load_watermarks(&self, room: RoomId) -> BoxFuture<'_, Result<Vec<WatermarkRow>, ChatError>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>)>(
                "SELECT room_id, user_id, last_read_at FROM read_watermarks WHERE room_id = $1",
            )
            .bind(*room.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChatError::PersistenceFailure(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|(room_id, user_id, last_read_at)| WatermarkRow {
                    room_id,
                    user_id,
                    last_read_at,
                })
                .collect())
        })
    }
}
