//! WebSocket layer: connection handling, frame parsing, room fanout.
//!
//! The WebSocket endpoint at `/ws/rooms/{room_id}` is the gateway's only
//! client-facing surface: each connection targets exactly one room and
//! exchanges tagged JSON frames with the server.

pub mod connection;
pub mod frames;
pub mod handler;
