//! Per-user visibility filter.
//!
//! Merges messages and call records of one conversation into a single
//! timeline, dropping everything the viewer has hidden for themselves.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_shared::types::{ConversationId, UserId};
use parley_shared::views::{
    CallSnapshot, ConversationSummary, ItemRef, MessageView, TimelineEntry, TimelinePage,
    UserSummary,
};
use rusqlite::{params, OptionalExtension};

use crate::calls::{row_to_call, CALL_SELECT};
use crate::database::Database;
use crate::error::Result;
use crate::messages::{row_to_message, MESSAGE_SELECT};
use crate::models::{CallRecord, Message};
use crate::preview::format_activity_preview;
use crate::sql::ts;

/// A message or a call record, in one ordered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem {
    Message(Message),
    Call(CallRecord),
}

impl TimelineItem {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Message(m) => m.created_at,
            Self::Call(c) => c.created_at,
        }
    }

    pub fn is_visible_to(&self, viewer: UserId) -> bool {
        match self {
            Self::Message(m) => m.is_visible_to(viewer),
            Self::Call(c) => c.is_visible_to(viewer),
        }
    }

    pub fn item_ref(&self) -> ItemRef {
        match self {
            Self::Message(m) => ItemRef::Message(m.id),
            Self::Call(c) => ItemRef::Call(c.id),
        }
    }

    /// Newest-first ordering. On equal timestamps the message ranks as the
    /// newer item; ids break the remaining ties within one kind.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| match (a, b) {
                (Self::Message(_), Self::Call(_)) => Ordering::Less,
                (Self::Call(_), Self::Message(_)) => Ordering::Greater,
                (Self::Message(x), Self::Message(y)) => y.id.cmp(&x.id),
                (Self::Call(x), Self::Call(y)) => y.id.cmp(&x.id),
            })
    }
}

/// Merge two newest-first streams and keep the `limit` newest items.
pub fn merge_newest_first(
    messages: Vec<Message>,
    calls: Vec<CallRecord>,
    limit: usize,
) -> Vec<TimelineItem> {
    let mut items: Vec<TimelineItem> = messages
        .into_iter()
        .map(TimelineItem::Message)
        .chain(calls.into_iter().map(TimelineItem::Call))
        .collect();
    items.sort_by(TimelineItem::newest_first);
    items.truncate(limit);
    items
}

const MESSAGE_VISIBLE: &str = "m.conversation_id = ?1
    AND NOT EXISTS (SELECT 1 FROM message_deletions d WHERE d.message_id = m.id AND d.user_id = ?2)";

const CALL_VISIBLE: &str = "c.conversation_id = ?1
    AND NOT EXISTS (SELECT 1 FROM call_deletions d WHERE d.call_id = c.id AND d.user_id = ?2)";

impl Database {
    /// The newest item of `conversation` that `viewer` has not hidden.
    pub fn last_visible_item(
        &self,
        conversation: ConversationId,
        viewer: UserId,
    ) -> Result<Option<TimelineItem>> {
        let (messages, calls) = self.visible_rows(conversation, viewer, None, 1)?;
        Ok(merge_newest_first(messages, calls, 1).into_iter().next())
    }

    /// Up to `limit` visible items strictly older than `before`, returned in
    /// ascending display order, plus whether older visible items remain.
    pub fn timeline_items(
        &self,
        conversation: ConversationId,
        viewer: UserId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<(Vec<TimelineItem>, bool)> {
        if limit == 0 {
            return Ok((Vec::new(), false));
        }

        let (messages, calls) = self.visible_rows(conversation, viewer, before, limit)?;
        let mut items = merge_newest_first(messages, calls, limit);

        let has_more = match items.last() {
            Some(oldest) => self.has_visible_before(conversation, viewer, oldest.created_at())?,
            None => false,
        };

        items.reverse();
        Ok((items, has_more))
    }

    /// Hydrated page of the viewer's timeline.
    pub fn timeline_page(
        &self,
        conversation: ConversationId,
        viewer: UserId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<TimelinePage> {
        let (items, has_more) = self.timeline_items(conversation, viewer, before, limit)?;

        let mut users = UserCache::default();
        let mut entries = Vec::with_capacity(items.len());
        for item in &items {
            entries.push(self.timeline_entry_with(item, viewer, &mut users)?);
        }

        Ok(TimelinePage {
            items: entries,
            has_more,
        })
    }

    /// Missed, rejected or cancelled calls `viewer` received and has not
    /// acknowledged.
    pub fn unseen_call_count(&self, conversation: ConversationId, viewer: UserId) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM call_records
             WHERE conversation_id = ?1
               AND receiver_id = ?2
               AND is_seen = 0
               AND status IN ('missed', 'rejected', 'cancelled')",
            params![conversation.0, viewer.0],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn timeline_entry(&self, item: &TimelineItem, viewer: UserId) -> Result<TimelineEntry> {
        self.timeline_entry_with(item, viewer, &mut UserCache::default())
    }

    pub fn message_view(&self, message: &Message, viewer: UserId) -> Result<MessageView> {
        let sender = self.user_summary(message.sender_id)?;
        Ok(build_message_view(message, viewer, sender))
    }

    /// Denormalized record broadcast as `call.history.updated`.
    pub fn call_snapshot(&self, call: &CallRecord) -> Result<CallSnapshot> {
        let mut users = UserCache::default();
        self.call_snapshot_with(call, &mut users)
    }

    /// The viewer's conversation list: only conversations with something
    /// visible, most recently active first.
    pub fn conversation_summaries(&self, viewer: UserId) -> Result<Vec<ConversationSummary>> {
        let mut summaries = Vec::new();

        for conversation in self.conversations_for_user(viewer)? {
            let Some(last) = self.last_visible_item(conversation.id, viewer)? else {
                continue;
            };
            let Some(other) = conversation.other_participant(viewer) else {
                continue;
            };

            let unread = self.unread_message_count(conversation.id, viewer)?
                + self.unseen_call_count(conversation.id, viewer)?;

            summaries.push(ConversationSummary {
                id: conversation.id,
                other_user: self.user_summary(other)?,
                last_message: Some(format_activity_preview(&last, viewer)),
                unread_count: unread,
                last_activity_at: conversation.last_activity_at,
            });
        }

        Ok(summaries)
    }

    fn visible_rows(
        &self,
        conversation: ConversationId,
        viewer: UserId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<(Vec<Message>, Vec<CallRecord>)> {
        let before = before.map(|at| ts(&at));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = self.conn().prepare(&format!(
            "{MESSAGE_SELECT}
             WHERE {MESSAGE_VISIBLE}
               AND (?3 IS NULL OR m.created_at < ?3)
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![conversation.0, viewer.0, before, limit],
            row_to_message,
        )?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }

        let mut stmt = self.conn().prepare(&format!(
            "{CALL_SELECT}
             WHERE {CALL_VISIBLE}
               AND (?3 IS NULL OR c.created_at < ?3)
             ORDER BY c.created_at DESC, c.id DESC
             LIMIT ?4"
        ))?;
        let rows = stmt.query_map(params![conversation.0, viewer.0, before, limit], row_to_call)?;
        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }

        Ok((messages, calls))
    }

    fn has_visible_before(
        &self,
        conversation: ConversationId,
        viewer: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let at = ts(&at);

        let older_message = self
            .conn()
            .query_row(
                &format!(
                    "SELECT 1 FROM messages m WHERE {MESSAGE_VISIBLE} AND m.created_at < ?3 LIMIT 1"
                ),
                params![conversation.0, viewer.0, at],
                |_| Ok(()),
            )
            .optional()?;
        if older_message.is_some() {
            return Ok(true);
        }

        let older_call = self
            .conn()
            .query_row(
                &format!(
                    "SELECT 1 FROM call_records c WHERE {CALL_VISIBLE} AND c.created_at < ?3 LIMIT 1"
                ),
                params![conversation.0, viewer.0, at],
                |_| Ok(()),
            )
            .optional()?;
        Ok(older_call.is_some())
    }

    fn timeline_entry_with(
        &self,
        item: &TimelineItem,
        viewer: UserId,
        users: &mut UserCache,
    ) -> Result<TimelineEntry> {
        Ok(match item {
            TimelineItem::Message(message) => {
                let sender = users.get(self, message.sender_id)?;
                TimelineEntry::Message(build_message_view(message, viewer, sender))
            }
            TimelineItem::Call(call) => TimelineEntry::Call(self.call_snapshot_with(call, users)?),
        })
    }

    fn call_snapshot_with(&self, call: &CallRecord, users: &mut UserCache) -> Result<CallSnapshot> {
        Ok(CallSnapshot {
            id: call.id,
            conversation_id: call.conversation_id,
            status: call.status,
            call_type: call.kind,
            duration: call.duration,
            is_seen: call.is_seen,
            caller: users.get(self, call.caller_id)?,
            receiver: users.get(self, call.receiver_id)?,
            started_at: call.started_at,
            ended_at: call.ended_at,
            created_at: call.created_at,
        })
    }
}

fn build_message_view(message: &Message, viewer: UserId, sender: UserSummary) -> MessageView {
    // Unsent rows are already cleared on disk; mask again in case a caller
    // hands in a row from before the retraction.
    let (content, attachment) = if message.unsent {
        (None, None)
    } else {
        (message.content.clone(), message.attachment.clone())
    };

    MessageView {
        id: message.id,
        conversation_id: message.conversation_id,
        sender,
        content,
        attachment,
        is_mine: message.sender_id == viewer,
        is_read: message.seen,
        unsent: message.unsent,
        created_at: message.created_at,
    }
}

/// Both participants appear on every row of a page; look each up once.
#[derive(Default)]
struct UserCache(HashMap<UserId, UserSummary>);

impl UserCache {
    fn get(&mut self, db: &Database, id: UserId) -> Result<UserSummary> {
        if let Some(summary) = self.0.get(&id) {
            return Ok(summary.clone());
        }
        let summary = db.user_summary(id)?;
        self.0.insert(id, summary.clone());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use parley_shared::types::{CallKind, CallStatus};

    use super::*;
    use crate::models::{CallTransition, NewCall, NewMessage};

    struct Fixture {
        db: Database,
        conversation: ConversationId,
        t0: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let t0 = Utc::now();
            db.upsert_user(UserId(1), "Ada", None, t0).unwrap();
            db.upsert_user(UserId(2), "Brian", None, t0).unwrap();
            let conversation = db
                .find_or_create_conversation(UserId(1), UserId(2), t0)
                .unwrap()
                .id;
            Self { db, conversation, t0 }
        }

        fn message_at(&self, secs: i64, sender: i64, text: &str) -> Message {
            self.db
                .insert_message(&NewMessage {
                    conversation_id: self.conversation,
                    sender_id: UserId(sender),
                    content: Some(text.into()),
                    attachment: None,
                    created_at: self.t0 + Duration::seconds(secs),
                })
                .unwrap()
        }

        fn call_at(&self, secs: i64) -> CallRecord {
            self.db
                .insert_call(&NewCall {
                    conversation_id: self.conversation,
                    caller_id: UserId(1),
                    receiver_id: UserId(2),
                    kind: CallKind::Audio,
                    created_at: self.t0 + Duration::seconds(secs),
                })
                .unwrap()
        }
    }

    #[test]
    fn last_visible_skips_hidden_items() {
        let f = Fixture::new();
        let m1 = f.message_at(1, 1, "one");
        let m2 = f.message_at(2, 1, "two");

        let last = f.db.last_visible_item(f.conversation, UserId(2)).unwrap().unwrap();
        assert_eq!(last.item_ref(), ItemRef::Message(m2.id));

        f.db.hide_message_for(m2.id, UserId(2), f.t0).unwrap();
        let last = f.db.last_visible_item(f.conversation, UserId(2)).unwrap().unwrap();
        assert_eq!(last.item_ref(), ItemRef::Message(m1.id));

        // The other participant is unaffected.
        let last = f.db.last_visible_item(f.conversation, UserId(1)).unwrap().unwrap();
        assert_eq!(last.item_ref(), ItemRef::Message(m2.id));
    }

    #[test]
    fn message_wins_timestamp_tie() {
        let f = Fixture::new();
        f.call_at(5);
        let m = f.message_at(5, 2, "same instant");

        let last = f.db.last_visible_item(f.conversation, UserId(1)).unwrap().unwrap();
        assert_eq!(last.item_ref(), ItemRef::Message(m.id));
    }

    #[test]
    fn calls_interleave_with_messages() {
        let f = Fixture::new();
        f.message_at(1, 1, "before");
        let call = f.call_at(2);
        f.message_at(3, 2, "after");

        let (items, has_more) = f
            .db
            .timeline_items(f.conversation, UserId(1), None, 10)
            .unwrap();
        assert!(!has_more);
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].item_ref(), ItemRef::Call(call.id));
        assert!(items.windows(2).all(|w| w[0].created_at() <= w[1].created_at()));
    }

    #[test]
    fn pagination_with_cursor() {
        let f = Fixture::new();
        for i in 0..5 {
            f.message_at(i * 2, 1, &format!("m{i}"));
        }
        f.call_at(7);

        let page = f.db.timeline_page(f.conversation, UserId(2), None, 3).unwrap();
        assert!(page.has_more);
        assert_eq!(page.items.len(), 3);
        assert!(matches!(page.items[1], TimelineEntry::Call(_)));

        let older = f
            .db
            .timeline_page(f.conversation, UserId(2), page.cursor(), 3)
            .unwrap();
        assert_eq!(older.items.len(), 3);
        assert!(!older.has_more);
        assert!(older.items.iter().all(|e| e.created_at() < page.items[0].created_at()));
    }

    #[test]
    fn has_more_ignores_hidden_rows() {
        let f = Fixture::new();
        let old = f.message_at(1, 1, "old");
        f.message_at(2, 1, "new");
        f.db.hide_message_for(old.id, UserId(2), f.t0).unwrap();

        let (items, has_more) = f
            .db
            .timeline_items(f.conversation, UserId(2), None, 1)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(!has_more);

        let (_, has_more) = f
            .db
            .timeline_items(f.conversation, UserId(1), None, 1)
            .unwrap();
        assert!(has_more);
    }

    #[test]
    fn unseen_calls_and_summaries() {
        let f = Fixture::new();
        f.message_at(1, 1, "hey");
        let call = f.call_at(2);
        f.db.transition_call(
            call.id,
            &CallTransition {
                from: CallStatus::Initiated,
                to: CallStatus::Missed,
                ended_at: Some(f.t0),
                duration: None,
                is_seen: false,
            },
        )
        .unwrap();

        assert_eq!(f.db.unseen_call_count(f.conversation, UserId(2)).unwrap(), 1);
        assert_eq!(f.db.unseen_call_count(f.conversation, UserId(1)).unwrap(), 0);

        let summaries = f.db.conversation_summaries(UserId(2)).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].other_user.name, "Ada");
        assert_eq!(summaries[0].unread_count, 2);
        assert_eq!(
            summaries[0].last_message.as_ref().unwrap().content,
            "📞 Missed call"
        );
    }

    #[test]
    fn summaries_skip_conversations_with_nothing_visible() {
        let f = Fixture::new();
        let m = f.message_at(1, 1, "only");
        f.db.hide_message_for(m.id, UserId(1), f.t0).unwrap();

        assert!(f.db.conversation_summaries(UserId(1)).unwrap().is_empty());
        assert_eq!(f.db.conversation_summaries(UserId(2)).unwrap().len(), 1);
    }
}
