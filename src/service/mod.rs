//! Service layer: per-room session orchestration.
//!
//! [`RoomSessionManager`] hands out one serialized session actor per
//! room; each actor funnels message mutation through the
//! [`crate::domain::MessageStore`] and fans results out through the
//! [`crate::domain::ConnectionRegistry`].

pub mod room_session;

pub use room_session::{RoomSessionHandle, RoomSessionManager};
