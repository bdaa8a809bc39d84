//! # parley-shared
//!
//! Types shared by every Parley crate: identifiers, the call state enums,
//! the event catalogue pushed over per-user channels, and the read-side
//! views handed to clients.

pub mod api;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;
pub mod views;

pub use error::ProtocolError;
