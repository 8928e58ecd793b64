//! # chat-gateway
//!
//! Real-time WebSocket fanout core for a multi-room chat system.
//!
//! This crate is the concurrency-sensitive heart of a chat service: it
//! accepts persistent client connections, authorizes them against room
//! membership, multiplexes messages between connections sharing a room,
//! and durably records messages while keeping per-member read-state.
//! Signup/login, admin tooling, and file storage are external
//! collaborators.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── Gateway (ws/)
//!     │
//!     ├── RoomSessionManager (service/)
//!     │
//!     ├── RoomDirectory (domain/)
//!     ├── MessageStore (domain/)
//!     ├── ConnectionRegistry (domain/)
//!     │
//!     └── PostgreSQL Persistence (optional)
//! ```
//!
//! Each room is driven by exactly one session actor, so persistence and
//! fanout for that room happen one message at a time, in arrival order.

pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod persistence;
pub mod service;
pub mod ws;
