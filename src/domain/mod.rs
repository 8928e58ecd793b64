//! Domain layer: identifiers, chat entities, and the concurrent state
//! components.
//!
//! This module contains the server-side domain model: room and message
//! entities, the room directory (authorization source of truth), the
//! per-room message store with read-state tracking, and the connection
//! registry used for room-scoped fanout.

pub mod directory;
pub mod ids;
pub mod message;
pub mod registry;
pub mod room;
pub mod store;

pub use directory::RoomDirectory;
pub use ids::{ConnectionId, MessageId, RoomId, UserId};
pub use message::{Attachment, Message, MessageDraft, MessageKind, Reaction, ReactionKind};
pub use registry::{ConnectionRegistry, MessagePosted};
pub use room::{MemberRole, Membership, Room, RoomKind};
pub use store::MessageStore;
