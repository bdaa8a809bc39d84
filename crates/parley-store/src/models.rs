//! Domain model structs persisted in the SQLite database.
//!
//! Rows are kept close to the schema; per-viewer projections live in
//! `parley_shared::views` and are built by [`crate::timeline`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use parley_shared::types::{
    Attachment, CallId, CallKind, CallStatus, ConversationId, MessageId, ParticipantPair, UserId,
};
use parley_shared::views::UserSummary;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A directory entry mirrored from the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// Storage reference of the avatar image.
    pub avatar: Option<String>,
    /// Bumped whenever the user performs an action.
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.display_name.clone(),
            avatar: self.avatar.clone(),
            last_active_at: self.last_active_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A private thread between exactly two distinct users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: ParticipantPair,
    /// Sort key for conversation lists.
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user: UserId) -> bool {
        self.participants.contains(user)
    }

    /// The counterpart of `user`, if `user` takes part in this conversation.
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        self.participants.other(user)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// `None` for attachment-only messages and for every unsent message.
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    /// Read by the receiver. Monotonic.
    pub seen: bool,
    /// Users who hid this message for themselves.
    pub deleted_by: BTreeSet<UserId>,
    /// Retracted by the sender for everyone. Monotonic.
    pub unsent: bool,
    pub unsent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_visible_to(&self, viewer: UserId) -> bool {
        !self.deleted_by.contains(&viewer)
    }

    /// True once every participant of `pair` has hidden the message.
    pub fn is_hidden_from_all(&self, pair: &ParticipantPair) -> bool {
        pair.both().iter().all(|user| self.deleted_by.contains(user))
    }
}

/// Insert parameters for a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Call record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRecord {
    pub id: CallId,
    pub conversation_id: ConversationId,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub status: CallStatus,
    pub kind: CallKind,
    /// Seconds; only set once the call is over.
    pub duration: Option<i64>,
    /// Whether the receiver has acknowledged the record.
    pub is_seen: bool,
    pub deleted_by: BTreeSet<UserId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn is_visible_to(&self, viewer: UserId) -> bool {
        !self.deleted_by.contains(&viewer)
    }

    pub fn is_hidden_from_all(&self) -> bool {
        self.deleted_by.contains(&self.caller_id) && self.deleted_by.contains(&self.receiver_id)
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.caller_id == user || self.receiver_id == user
    }
}

#[derive(Debug, Clone)]
pub struct NewCall {
    pub conversation_id: ConversationId,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub kind: CallKind,
    pub created_at: DateTime<Utc>,
}

/// The terminal fields written when a call leaves `initiated` or `answered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTransition {
    pub from: CallStatus,
    pub to: CallStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub is_seen: bool,
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub blocker_id: UserId,
    pub blocked_id: UserId,
    pub created_at: DateTime<Utc>,
}
