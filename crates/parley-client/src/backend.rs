//! What the reconciler needs from the server side.
//!
//! Every backend is bound to one authenticated user; the user id is never
//! passed per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_engine::Engine;
use parley_shared::types::{ConversationId, MessageId, UserId};
use parley_shared::views::{ConversationSummary, OpenedConversation, TimelinePage};

use crate::error::Result;

#[async_trait]
pub trait Backend: Send + Sync {
    /// The user this backend acts as.
    fn user(&self) -> UserId;

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    async fn open_conversation(&self, conversation: ConversationId) -> Result<OpenedConversation>;

    async fn load_more(
        &self,
        conversation: ConversationId,
        before: DateTime<Utc>,
    ) -> Result<TimelinePage>;

    async fn mark_seen(&self, message: MessageId) -> Result<bool>;

    async fn mark_calls_seen(&self, conversation: ConversationId) -> Result<usize>;
}

/// Calls the engine directly, for single-process deployments and tests.
#[derive(Clone)]
pub struct LocalBackend {
    engine: Engine,
    user: UserId,
}

impl LocalBackend {
    pub fn new(engine: Engine, user: UserId) -> Self {
        Self { engine, user }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn user(&self) -> UserId {
        self.user
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self.engine.list_conversations(self.user).await?)
    }

    async fn open_conversation(&self, conversation: ConversationId) -> Result<OpenedConversation> {
        Ok(self.engine.open_conversation(self.user, conversation).await?)
    }

    async fn load_more(
        &self,
        conversation: ConversationId,
        before: DateTime<Utc>,
    ) -> Result<TimelinePage> {
        Ok(self.engine.load_more(self.user, conversation, before).await?)
    }

    async fn mark_seen(&self, message: MessageId) -> Result<bool> {
        Ok(self.engine.mark_seen(self.user, message).await?)
    }

    async fn mark_calls_seen(&self, conversation: ConversationId) -> Result<usize> {
        Ok(self
            .engine
            .mark_calls_seen_in_conversation(self.user, conversation)
            .await?)
    }
}
