//! Read-side views computed per viewer.
//!
//! None of these are persisted: the store builds them from its rows for a
//! specific viewer, the server serializes them, and the client reconciler
//! keeps them as its local state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    Attachment, CallId, CallKind, CallStatus, ConversationId, MessageId, UserId,
};

/// Public profile fields of a participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
}

/// A message as seen by one viewer. Unsent messages never carry content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserSummary,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub is_mine: bool,
    pub is_read: bool,
    pub unsent: bool,
    pub created_at: DateTime<Utc>,
}

/// Full denormalized call record, broadcast as `call.history.updated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallSnapshot {
    pub id: CallId,
    pub conversation_id: ConversationId,
    pub status: CallStatus,
    pub call_type: CallKind,
    pub duration: Option<i64>,
    pub is_seen: bool,
    pub caller: UserSummary,
    pub receiver: UserSummary,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CallSnapshot {
    pub fn is_mine(&self, viewer: UserId) -> bool {
        self.caller.id == viewer
    }
}

/// One entry of a conversation timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimelineEntry {
    Message(MessageView),
    Call(CallSnapshot),
}

impl TimelineEntry {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Message(m) => m.created_at,
            Self::Call(c) => c.created_at,
        }
    }

    pub fn item(&self) -> ItemRef {
        match self {
            Self::Message(m) => ItemRef::Message(m.id),
            Self::Call(c) => ItemRef::Call(c.id),
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        match self {
            Self::Message(m) => m.conversation_id,
            Self::Call(c) => c.conversation_id,
        }
    }
}

/// Identifies a timeline item across both kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ItemRef {
    Message(MessageId),
    Call(CallId),
}

/// Short conversation-list description of a timeline item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityPreview {
    pub item: ItemRef,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_mine: bool,
    pub is_read: bool,
}

/// A page of timeline entries in ascending display order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelinePage {
    pub items: Vec<TimelineEntry>,
    pub has_more: bool,
}

impl TimelinePage {
    /// Timestamp of the oldest entry, used as the cursor for the next page.
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.items.first().map(TimelineEntry::created_at)
    }
}

/// A row of the viewer's conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub other_user: UserSummary,
    pub last_message: Option<ActivityPreview>,
    pub unread_count: u64,
    pub last_activity_at: DateTime<Utc>,
}

/// Everything a client needs to render a freshly opened conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenedConversation {
    pub id: ConversationId,
    pub other_user: UserSummary,
    /// The viewer has blocked the other participant.
    pub is_blocked: bool,
    /// The other participant has blocked the viewer.
    pub is_blocked_by: bool,
    pub page: TimelinePage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedUser {
    pub user: UserSummary,
    pub blocked_at: DateTime<Utc>,
}
