use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use parley_shared::constants::{DEFAULT_PAGE_SIZE, MAX_ATTACHMENT_SIZE, MAX_CONTENT_CHARS};
use parley_shared::types::{CallId, ConversationId, MessageId, UserId};
use parley_store::{CallRecord, Conversation, Database, Message};

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::notifier::{Notifier, Outbox, Transport};
use crate::storage::BlobStorage;

/// Limits applied to incoming requests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_attachment_size: usize,
    pub max_content_chars: usize,
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attachment_size: MAX_ATTACHMENT_SIZE,
            max_content_chars: MAX_CONTENT_CHARS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Entry point for every user action.
///
/// Cheap to clone; all clones share the same database handle, notifier and
/// storage collaborator.
#[derive(Clone)]
pub struct Engine {
    db: Arc<Mutex<Database>>,
    pub(crate) notifier: Notifier,
    pub(crate) blobs: Arc<dyn BlobStorage>,
    clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new(db: Database, transport: Arc<dyn Transport>, blobs: Arc<dyn BlobStorage>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            notifier: Notifier::new(transport),
            blobs,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `f` inside one write transaction. The lock is released before the
    /// caller gets to publish anything.
    pub(crate) fn atomically<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| EngineError::Internal("database lock poisoned".into()))?;
        db.atomically(f)
    }

    /// Read-only access without opening a write transaction.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| EngineError::Internal("database lock poisoned".into()))?;
        f(&db)
    }

    pub(crate) async fn publish(&self, outbox: Outbox) {
        self.notifier.dispatch(outbox).await;
    }

    /// Best-effort blob removal after the row that referenced it is gone.
    pub(crate) async fn discard_blob(&self, path: &str) {
        if let Err(e) = self.blobs.delete(path).await {
            tracing::warn!(path, error = %e, "failed to delete attachment blob");
        }
    }
}

// ---------------------------------------------------------------------------
// Lookups shared by the operation modules
// ---------------------------------------------------------------------------

pub(crate) fn load_conversation(db: &Database, id: ConversationId) -> Result<Conversation> {
    match db.get_conversation(id) {
        Ok(conversation) => Ok(conversation),
        Err(parley_store::StoreError::NotFound) => Err(EngineError::NotFound("conversation")),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn load_message(db: &Database, id: MessageId) -> Result<Message> {
    db.find_message(id)?.ok_or(EngineError::NotFound("message"))
}

pub(crate) fn load_call(db: &Database, id: CallId) -> Result<CallRecord> {
    db.find_call(id)?.ok_or(EngineError::NotFound("call"))
}

pub(crate) fn require_user(db: &Database, id: UserId) -> Result<()> {
    if db.user_exists(id)? {
        Ok(())
    } else {
        Err(EngineError::NotFound("user"))
    }
}

/// Conversation `id`, provided `actor` takes part in it.
pub(crate) fn participant_conversation(
    db: &Database,
    id: ConversationId,
    actor: UserId,
) -> Result<Conversation> {
    let conversation = load_conversation(db, id)?;
    if !conversation.is_participant(actor) {
        return Err(EngineError::unauthorized(format!(
            "user {actor} is not part of conversation {id}"
        )));
    }
    Ok(conversation)
}
