use chrono::{DateTime, Utc};
use parley_shared::types::{Attachment, ConversationId, MessageId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, NewMessage};
use crate::sql::{parse_enum, parse_opt_ts, parse_ts, parse_user_set, ts};

/// Column list understood by [`row_to_message`]. The trailing column is the
/// deleted-by set.
pub(crate) const MESSAGE_SELECT: &str = "
    SELECT m.id, m.conversation_id, m.sender_id, m.content,
           m.attachment_path, m.attachment_kind, m.attachment_mime,
           m.seen, m.unsent, m.unsent_at, m.created_at,
           (SELECT GROUP_CONCAT(d.user_id) FROM message_deletions d WHERE d.message_id = m.id)
    FROM messages m";

impl Database {
    pub fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        let (path, kind, mime) = match &new.attachment {
            Some(a) => (Some(a.path.as_str()), Some(a.kind.as_str()), Some(a.mime_type.as_str())),
            None => (None, None, None),
        };

        self.conn().execute(
            "INSERT INTO messages
                 (conversation_id, sender_id, content,
                  attachment_path, attachment_kind, attachment_mime, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.conversation_id.0,
                new.sender_id.0,
                new.content,
                path,
                kind,
                mime,
                ts(&new.created_at),
            ],
        )?;

        self.get_message(MessageId(self.conn().last_insert_rowid()))
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.find_message(id)?.ok_or(StoreError::NotFound)
    }

    pub fn find_message(&self, id: MessageId) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
                params![id.0],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Every message of a conversation, oldest first, regardless of viewer.
    pub fn messages_in_conversation(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{MESSAGE_SELECT} WHERE m.conversation_id = ?1 ORDER BY m.created_at ASC, m.id ASC"
        ))?;

        let rows = stmt.query_map(params![conversation.0], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// The newest message of a conversation, ignoring per-user deletions.
    pub fn latest_message(&self, conversation: ConversationId) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "{MESSAGE_SELECT} WHERE m.conversation_id = ?1
                     ORDER BY m.created_at DESC, m.id DESC LIMIT 1"
                ),
                params![conversation.0],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Flip `seen` to true. Returns `false` if it already was.
    pub fn mark_message_seen(&self, id: MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET seen = 1 WHERE id = ?1 AND seen = 0",
            params![id.0],
        )?;
        Ok(affected > 0)
    }

    /// Add `user` to the message's deleted-by set. Returns `false` if the
    /// user had already hidden it.
    pub fn hide_message_for(&self, id: MessageId, user: UserId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO message_deletions (message_id, user_id, deleted_at)
             VALUES (?1, ?2, ?3)",
            params![id.0, user.0, ts(&at)],
        )?;
        Ok(affected > 0)
    }

    /// Physically remove a message row (and its deletion markers).
    pub fn purge_message(&self, id: MessageId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id.0])?;
        Ok(affected > 0)
    }

    /// Retract a message for everyone: content and attachment columns are
    /// cleared in the same statement that sets `unsent`. Returns `false` if
    /// the message was already unsent.
    pub fn unsend_message(&self, id: MessageId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages
             SET unsent = 1, unsent_at = ?1, content = NULL,
                 attachment_path = NULL, attachment_kind = NULL, attachment_mime = NULL
             WHERE id = ?2 AND unsent = 0",
            params![ts(&at), id.0],
        )?;
        Ok(affected > 0)
    }

    /// Messages from the other participant that `viewer` has not read and
    /// still sees.
    pub fn unread_message_count(&self, conversation: ConversationId, viewer: UserId) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages m
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND m.seen = 0
               AND m.unsent = 0
               AND NOT EXISTS (SELECT 1 FROM message_deletions d
                               WHERE d.message_id = m.id AND d.user_id = ?2)",
            params![conversation.0, viewer.0],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let conversation_id: i64 = row.get(1)?;
    let sender_id: i64 = row.get(2)?;
    let content: Option<String> = row.get(3)?;
    let attachment_path: Option<String> = row.get(4)?;
    let attachment_kind: Option<String> = row.get(5)?;
    let attachment_mime: Option<String> = row.get(6)?;
    let seen: bool = row.get(7)?;
    let unsent: bool = row.get(8)?;
    let unsent_at = parse_opt_ts(9, row.get(9)?)?;
    let created_at: String = row.get(10)?;
    let deleted_by = parse_user_set(11, row.get(11)?)?;

    let attachment = match (attachment_path, attachment_kind) {
        (Some(path), Some(kind)) => Some(Attachment {
            path,
            kind: parse_enum(5, &kind)?,
            mime_type: attachment_mime.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(Message {
        id: MessageId(id),
        conversation_id: ConversationId(conversation_id),
        sender_id: UserId(sender_id),
        content,
        attachment,
        seen,
        deleted_by,
        unsent,
        unsent_at,
        created_at: parse_ts(10, &created_at)?,
    })
}
