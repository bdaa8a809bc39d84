//! Local state held by the reconciler.
//!
//! [`ActiveConversation`] is the open view: an ascending timeline plus the
//! bookkeeping for items that arrived while the user was scrolled up.
//! [`Inbox`] mirrors the conversation list.

use std::collections::BTreeSet;

use parley_shared::types::{CallId, CallStatus, ConversationId, MessageId, UserId};
use parley_shared::views::{
    CallSnapshot, ConversationSummary, ItemRef, MessageView, OpenedConversation,
    TimelineEntry, TimelinePage, UserSummary,
};

/// Connection lifecycle of a reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Disconnected,
    /// Fetching the snapshot the live stream will be applied on top of.
    Syncing,
    Live,
}

#[derive(Debug, Clone)]
pub struct ActiveConversation {
    pub id: ConversationId,
    pub other_user: UserSummary,
    pub is_blocked: bool,
    pub is_blocked_by: bool,
    /// Ascending display order.
    pub timeline: Vec<TimelineEntry>,
    pub has_more: bool,
    /// Incoming messages that arrived while scrolled up, not yet marked seen.
    pub pending_seen: BTreeSet<MessageId>,
    /// Unread badge of the "new messages" popup.
    pub pending_count: usize,
    /// Incoming call records that still need acknowledging.
    pub pending_calls: bool,
    pub scrolled_up: bool,
}

impl ActiveConversation {
    pub fn from_opened(opened: OpenedConversation) -> Self {
        Self {
            id: opened.id,
            other_user: opened.other_user,
            is_blocked: opened.is_blocked,
            is_blocked_by: opened.is_blocked_by,
            timeline: opened.page.items,
            has_more: opened.page.has_more,
            pending_seen: BTreeSet::new(),
            pending_count: 0,
            pending_calls: false,
            scrolled_up: false,
        }
    }

    pub fn contains(&self, item: ItemRef) -> bool {
        self.timeline.iter().any(|entry| entry.item() == item)
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut MessageView> {
        self.timeline.iter_mut().find_map(|entry| match entry {
            TimelineEntry::Message(m) if m.id == id => Some(m),
            _ => None,
        })
    }

    pub fn call(&self, id: CallId) -> Option<&CallSnapshot> {
        self.timeline.iter().find_map(|entry| match entry {
            TimelineEntry::Call(c) if c.id == id => Some(c),
            _ => None,
        })
    }

    /// Insert keeping ascending order. Entries already present are replaced.
    pub fn upsert(&mut self, entry: TimelineEntry) {
        if let Some(existing) = self
            .timeline
            .iter_mut()
            .find(|existing| existing.item() == entry.item())
        {
            *existing = entry;
            return;
        }

        let at = self
            .timeline
            .iter()
            .rposition(|existing| existing.created_at() <= entry.created_at())
            .map(|i| i + 1)
            .unwrap_or(0);
        self.timeline.insert(at, entry);
    }

    pub fn remove(&mut self, item: ItemRef) -> bool {
        let before = self.timeline.len();
        self.timeline.retain(|entry| entry.item() != item);
        self.timeline.len() != before
    }

    /// Prepend an older page fetched with [`Self::cursor`].
    pub fn prepend(&mut self, page: TimelinePage) {
        let mut items = page.items;
        items.retain(|entry| !self.contains(entry.item()));
        items.append(&mut self.timeline);
        self.timeline = items;
        self.has_more = page.has_more;
    }

    pub fn cursor(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.timeline.first().map(TimelineEntry::created_at)
    }

    /// Messages from the other participant that `viewer` has not seen yet.
    pub fn unseen_incoming(&self, viewer: UserId) -> Vec<MessageId> {
        self.timeline
            .iter()
            .filter_map(|entry| match entry {
                TimelineEntry::Message(m) if m.sender.id != viewer && !m.is_read => Some(m.id),
                _ => None,
            })
            .collect()
    }

    /// Whether any call record received by `viewer` still counts as unread.
    pub fn has_unseen_calls(&self, viewer: UserId) -> bool {
        self.timeline.iter().any(|entry| match entry {
            TimelineEntry::Call(c) => call_needs_ack(c, viewer),
            _ => false,
        })
    }
}

pub(crate) fn call_needs_ack(call: &CallSnapshot, viewer: UserId) -> bool {
    call.receiver.id == viewer
        && !call.is_seen
        && matches!(
            call.status,
            CallStatus::Missed | CallStatus::Rejected | CallStatus::Cancelled
        )
}

/// The conversation list, kept sorted most recent first.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    rows: Vec<ConversationSummary>,
}

impl Inbox {
    pub fn replace(&mut self, rows: Vec<ConversationSummary>) {
        self.rows = rows;
    }

    pub fn rows(&self) -> &[ConversationSummary] {
        &self.rows
    }

    pub fn get(&self, id: ConversationId) -> Option<&ConversationSummary> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn remove(&mut self, id: ConversationId) -> bool {
        let before = self.rows.len();
        self.rows.retain(|row| row.id != id);
        self.rows.len() != before
    }

    /// The last message of `id` was read by its receiver.
    pub fn mark_read(&mut self, id: ConversationId, message: MessageId) {
        if let Some(row) = self.rows.iter_mut().find(|row| row.id == id) {
            if let Some(last) = row.last_message.as_mut() {
                if last.item == ItemRef::Message(message) {
                    last.is_read = true;
                }
            }
        }
    }

    pub fn unread_total(&self) -> u64 {
        self.rows.iter().map(|row| row.unread_count).sum()
    }
}
