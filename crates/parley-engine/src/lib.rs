//! # parley-engine
//!
//! The mutation engine for two-party conversations. Every user action is one
//! method on [`Engine`]: it validates and authorizes the actor, applies the
//! change to the store in a single transaction, then hands the resulting
//! events to the [`Notifier`].

pub mod calls;
pub mod clock;
pub mod conversations;
pub mod directory;
pub mod engine;
pub mod error;
pub mod messages;
pub mod notifier;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use notifier::{DeliveryError, InProcessHub, Notifier, Outbox, Transport};
pub use storage::{BlobStorage, MemoryStorage, StorageError, Upload};

pub use calls::CallOutcome;
pub use messages::DeletionOutcome;
