//! # parley-store
//!
//! Durable state for two-party conversations: conversations, messages, call
//! records, the user directory and blocks, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every domain model,
//! plus the per-user visibility filter that merges messages and calls into
//! one timeline.

pub mod blocks;
pub mod calls;
pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod preview;
pub mod timeline;
pub mod users;

mod error;
mod sql;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use preview::format_activity_preview;
pub use timeline::TimelineItem;
