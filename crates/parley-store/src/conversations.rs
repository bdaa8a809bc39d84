use chrono::{DateTime, Utc};
use parley_shared::types::{ConversationId, ParticipantPair, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Conversation;
use crate::sql::{parse_ts, ts};

const CONVERSATION_COLUMNS: &str =
    "id, user_low_id, user_high_id, last_activity_at, created_at";

impl Database {
    /// Return the unique conversation for `{a, b}`, creating it on first
    /// contact.
    ///
    /// Safe under concurrent first contact: the insert is a no-op when the
    /// pair already exists, and the follow-up read returns whichever row won.
    pub fn find_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        let pair = ParticipantPair::new(a, b).ok_or(StoreError::InvalidPair(a.0))?;

        if let Some(existing) = self.find_conversation_for_pair(&pair)? {
            return Ok(existing);
        }

        let inserted = self.conn().execute(
            "INSERT INTO conversations (user_low_id, user_high_id, last_activity_at, created_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(user_low_id, user_high_id) DO NOTHING",
            params![pair.low().0, pair.high().0, ts(&now)],
        )?;

        if inserted == 0 {
            tracing::debug!(low = %pair.low(), high = %pair.high(), "conversation created concurrently");
        }

        self.find_conversation_for_pair(&pair)?
            .ok_or(StoreError::NotFound)
    }

    /// Look up the conversation between two users without creating it.
    pub fn find_conversation_between(&self, a: UserId, b: UserId) -> Result<Option<Conversation>> {
        match ParticipantPair::new(a, b) {
            Some(pair) => self.find_conversation_for_pair(&pair),
            None => Ok(None),
        }
    }

    fn find_conversation_for_pair(&self, pair: &ParticipantPair) -> Result<Option<Conversation>> {
        let conversation = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_low_id = ?1 AND user_high_id = ?2"
                ),
                params![pair.low().0, pair.high().0],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.0],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All conversations `user` takes part in, most recently active first.
    pub fn conversations_for_user(&self, user: UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE user_low_id = ?1 OR user_high_id = ?1
             ORDER BY last_activity_at DESC, id DESC"
        ))?;

        let rows = stmt.query_map(params![user.0], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Move the conversation's list sort key.
    pub fn set_last_activity(&self, id: ConversationId, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE conversations SET last_activity_at = ?1 WHERE id = ?2",
            params![ts(&at), id.0],
        )?;
        Ok(())
    }

    /// Drop a conversation that holds no messages and no call records.
    /// Returns `false` when it is gone already or has content.
    pub fn delete_conversation_if_empty(&self, id: ConversationId) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM conversations
             WHERE id = ?1
               AND NOT EXISTS (SELECT 1 FROM messages WHERE conversation_id = ?1)
               AND NOT EXISTS (SELECT 1 FROM call_records WHERE conversation_id = ?1)",
            params![id.0],
        )?;
        Ok(deleted > 0)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id: i64 = row.get(0)?;
    let low: i64 = row.get(1)?;
    let high: i64 = row.get(2)?;
    let last_activity_at: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    let participants = ParticipantPair::new(UserId(low), UserId(high)).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Integer,
            Box::new(StoreError::InvalidPair(low)),
        )
    })?;

    Ok(Conversation {
        id: ConversationId(id),
        participants,
        last_activity_at: parse_ts(3, &last_activity_at)?,
        created_at: parse_ts(4, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_order_does_not_matter() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let first = db.find_or_create_conversation(UserId(5), UserId(2), now).unwrap();
        let second = db.find_or_create_conversation(UserId(2), UserId(5), now).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.participants.low(), UserId(2));
        assert_eq!(first.other_participant(UserId(5)), Some(UserId(2)));
    }

    #[test]
    fn self_conversation_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .find_or_create_conversation(UserId(3), UserId(3), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPair(3)));
    }

    #[test]
    fn concurrent_first_contact_yields_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        Database::open_at(&path).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let db = Database::open_at(&path).unwrap();
                    let (a, b) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                    db.find_or_create_conversation(UserId(a), UserId(b), Utc::now())
                        .unwrap()
                        .id
                })
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        let db = Database::open_at(&path).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn only_empty_conversations_are_deleted() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let empty = db.find_or_create_conversation(UserId(1), UserId(2), now).unwrap();
        let busy = db.find_or_create_conversation(UserId(1), UserId(3), now).unwrap();
        db.insert_message(&crate::models::NewMessage {
            conversation_id: busy.id,
            sender_id: UserId(1),
            content: Some("hi".into()),
            attachment: None,
            created_at: now,
        })
        .unwrap();

        assert!(db.delete_conversation_if_empty(empty.id).unwrap());
        assert!(!db.delete_conversation_if_empty(empty.id).unwrap());
        assert!(db.find_conversation_between(UserId(1), UserId(2)).unwrap().is_none());

        assert!(!db.delete_conversation_if_empty(busy.id).unwrap());
        assert!(db.find_conversation_between(UserId(1), UserId(3)).unwrap().is_some());
    }

    #[test]
    fn list_is_ordered_by_activity() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();

        let older = db.find_or_create_conversation(UserId(1), UserId(2), t0).unwrap();
        let newer = db.find_or_create_conversation(UserId(1), UserId(3), t0).unwrap();
        db.set_last_activity(newer.id, t0 + chrono::Duration::seconds(1))
            .unwrap();

        let ids: Vec<_> = db
            .conversations_for_user(UserId(1))
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(db.conversations_for_user(UserId(2)).unwrap().len(), 1);
    }
}
