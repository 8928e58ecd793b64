//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::{ConnectionRegistry, MessageStore, RoomDirectory};
use crate::identity::IdentityProvider;
use crate::service::RoomSessionManager;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Source of truth for rooms and memberships.
    pub directory: Arc<RoomDirectory>,
    /// Per-room message logs and read-state.
    pub store: Arc<MessageStore>,
    /// Live connections per room.
    pub registry: Arc<ConnectionRegistry>,
    /// Per-room session actors.
    pub sessions: Arc<RoomSessionManager>,
    /// External identity collaborator.
    pub identity: Arc<dyn IdentityProvider>,
}
