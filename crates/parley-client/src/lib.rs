//! # parley-client
//!
//! Client-side reconciliation of a user's event stream with the conversation
//! state fetched from the server.

pub mod backend;
pub mod error;
pub mod events;
pub mod http;
pub mod reconciler;
pub mod state;

pub use backend::{Backend, LocalBackend};
pub use error::{ClientError, Result};
pub use events::Applied;
pub use http::HttpBackend;
pub use reconciler::Reconciler;
pub use state::{ActiveConversation, Inbox, Phase};
