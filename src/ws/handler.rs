//! Axum WebSocket upgrade handler.
//!
//! Covers the Connecting and Authorizing states: the identity and the
//! membership check both happen before the upgrade, so refused
//! connections allocate no resources.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::RoomId;
use crate::error::ChatError;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Opaque token minted by the external identity collaborator.
    pub token: Option<String>,
}

/// `GET /ws/rooms/{room_id}` — Upgrade to a WebSocket scoped to one room.
///
/// # Errors
///
/// - [`ChatError::Unauthenticated`] when no identity can be resolved.
/// - [`ChatError::RoomNotFound`] for unknown room ids.
/// - [`ChatError::NotAuthorized`] when the identity holds no active
///   membership in the room.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<uuid::Uuid>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ChatError> {
    let room_id = RoomId::from_uuid(room_id);

    let profile = params
        .token
        .as_deref()
        .and_then(|token| state.identity.resolve(token))
        .ok_or(ChatError::Unauthenticated)?;

    state.directory.room(room_id).await?;
    if !state.directory.is_member(room_id, profile.id).await {
        tracing::warn!(room_id = %room_id, user_id = %profile.id, "connection refused");
        return Err(ChatError::NotAuthorized(*room_id.as_uuid()));
    }

    let session = state.sessions.handle(room_id).await?;
    let registry = Arc::clone(&state.registry);

    Ok(ws.on_upgrade(move |socket| {
        run_connection(socket, room_id, profile, session, registry)
    }))
}
