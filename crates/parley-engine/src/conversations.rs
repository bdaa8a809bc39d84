//! Read-side operations: opening a conversation, paging, the conversation list.

use chrono::{DateTime, Utc};
use parley_shared::types::{ConversationId, UserId};
use parley_shared::views::{ConversationSummary, OpenedConversation, TimelinePage};
use tracing::debug;

use crate::engine::{participant_conversation, Engine};
use crate::error::{EngineError, Result};

impl Engine {
    /// Open `conversation` for `viewer`: acknowledges pending call records,
    /// then returns the newest page of the timeline.
    pub async fn open_conversation(
        &self,
        viewer: UserId,
        conversation: ConversationId,
    ) -> Result<OpenedConversation> {
        self.read(|db| participant_conversation(db, conversation, viewer).map(|_| ()))?;

        self.mark_calls_seen_in_conversation(viewer, conversation)
            .await?;

        let page_size = self.config.page_size;
        self.read(|db| {
            let record = participant_conversation(db, conversation, viewer)?;
            let other = record
                .other_participant(viewer)
                .ok_or_else(|| EngineError::Internal("conversation without counterpart".into()))?;

            let blocked_by_viewer = db
                .blocks_by(viewer)?
                .iter()
                .any(|block| block.blocked_id == other);
            let blocked_by_other = db
                .blocks_by(other)?
                .iter()
                .any(|block| block.blocked_id == viewer);

            Ok(OpenedConversation {
                id: record.id,
                other_user: db.user_summary(other)?,
                is_blocked: blocked_by_viewer,
                is_blocked_by: blocked_by_other,
                page: db.timeline_page(record.id, viewer, None, page_size)?,
            })
        })
    }

    /// Older page of the timeline, strictly before `before`.
    pub async fn load_more(
        &self,
        viewer: UserId,
        conversation: ConversationId,
        before: DateTime<Utc>,
    ) -> Result<TimelinePage> {
        let page_size = self.config.page_size;
        let page = self.read(|db| {
            participant_conversation(db, conversation, viewer)?;
            Ok(db.timeline_page(conversation, viewer, Some(before), page_size)?)
        })?;

        debug!(
            conversation = %conversation,
            viewer = %viewer,
            items = page.items.len(),
            has_more = page.has_more,
            "timeline page loaded"
        );
        Ok(page)
    }

    /// Conversations with something visible to `viewer`, most recently
    /// active first.
    pub async fn list_conversations(&self, viewer: UserId) -> Result<Vec<ConversationSummary>> {
        self.read(|db| Ok(db.conversation_summaries(viewer)?))
    }

    /// `list_conversations` narrowed to rows whose counterpart name or
    /// preview text contains `query`, ignoring case. A blank query keeps
    /// every row.
    pub async fn search_conversations(
        &self,
        viewer: UserId,
        query: &str,
    ) -> Result<Vec<ConversationSummary>> {
        let needle = query.trim().to_lowercase();
        let mut summaries = self.list_conversations(viewer).await?;
        if needle.is_empty() {
            return Ok(summaries);
        }

        summaries.retain(|summary| {
            summary.other_user.name.to_lowercase().contains(&needle)
                || summary
                    .last_message
                    .as_ref()
                    .is_some_and(|preview| preview.content.to_lowercase().contains(&needle))
        });
        Ok(summaries)
    }
}
