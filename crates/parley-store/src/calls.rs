use chrono::{DateTime, Utc};
use parley_shared::types::{CallId, CallStatus, ConversationId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{CallRecord, CallTransition, NewCall};
use crate::sql::{opt_ts, parse_enum, parse_opt_ts, parse_ts, parse_user_set, ts};

pub(crate) const CALL_SELECT: &str = "
    SELECT c.id, c.conversation_id, c.caller_id, c.receiver_id, c.status, c.call_type,
           c.duration, c.is_seen, c.started_at, c.ended_at, c.created_at,
           (SELECT GROUP_CONCAT(d.user_id) FROM call_deletions d WHERE d.call_id = c.id)
    FROM call_records c";

impl Database {
    /// Create a record in `initiated`; `started_at` equals `created_at`.
    pub fn insert_call(&self, new: &NewCall) -> Result<CallRecord> {
        self.conn().execute(
            "INSERT INTO call_records
                 (conversation_id, caller_id, receiver_id, status, call_type, started_at, created_at)
             VALUES (?1, ?2, ?3, 'initiated', ?4, ?5, ?5)",
            params![
                new.conversation_id.0,
                new.caller_id.0,
                new.receiver_id.0,
                new.kind.as_str(),
                ts(&new.created_at),
            ],
        )?;

        self.get_call(CallId(self.conn().last_insert_rowid()))
    }

    pub fn get_call(&self, id: CallId) -> Result<CallRecord> {
        self.find_call(id)?.ok_or(StoreError::NotFound)
    }

    pub fn find_call(&self, id: CallId) -> Result<Option<CallRecord>> {
        let call = self
            .conn()
            .query_row(
                &format!("{CALL_SELECT} WHERE c.id = ?1"),
                params![id.0],
                row_to_call,
            )
            .optional()?;
        Ok(call)
    }

    /// Compare-and-set on the status column. Returns `false` when the record
    /// is no longer in `transition.from`, leaving it untouched.
    pub fn transition_call(&self, id: CallId, transition: &CallTransition) -> Result<bool> {
        if !transition.from.can_become(transition.to) {
            return Ok(false);
        }

        let affected = self.conn().execute(
            "UPDATE call_records
             SET status = ?1, ended_at = ?2, duration = ?3, is_seen = ?4
             WHERE id = ?5 AND status = ?6",
            params![
                transition.to.as_str(),
                opt_ts(&transition.ended_at),
                transition.duration,
                transition.is_seen,
                id.0,
                transition.from.as_str(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn hide_call_for(&self, id: CallId, user: UserId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO call_deletions (call_id, user_id, deleted_at)
             VALUES (?1, ?2, ?3)",
            params![id.0, user.0, ts(&at)],
        )?;
        Ok(affected > 0)
    }

    pub fn purge_call(&self, id: CallId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM call_records WHERE id = ?1", params![id.0])?;
        Ok(affected > 0)
    }

    /// Terminal records in `conversation` that `receiver` still has to
    /// acknowledge.
    pub fn unseen_calls_for(&self, conversation: ConversationId, receiver: UserId) -> Result<Vec<CallRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "{CALL_SELECT}
             WHERE c.conversation_id = ?1
               AND c.receiver_id = ?2
               AND c.is_seen = 0
               AND c.status IN ('missed', 'rejected', 'cancelled')
             ORDER BY c.created_at ASC, c.id ASC"
        ))?;

        let rows = stmt.query_map(params![conversation.0, receiver.0], row_to_call)?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }
        Ok(calls)
    }

    /// Acknowledge a record. Returns `false` if it was already seen.
    pub fn mark_call_seen(&self, id: CallId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE call_records SET is_seen = 1 WHERE id = ?1 AND is_seen = 0",
            params![id.0],
        )?;
        Ok(affected > 0)
    }

    /// Calls still ringing that were created before `cutoff`.
    pub fn ringing_calls_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "{CALL_SELECT}
             WHERE c.status = 'initiated' AND c.created_at < ?1
             ORDER BY c.created_at ASC"
        ))?;

        let rows = stmt.query_map(params![ts(&cutoff)], row_to_call)?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }
        Ok(calls)
    }
}

pub(crate) fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallRecord> {
    let id: i64 = row.get(0)?;
    let conversation_id: i64 = row.get(1)?;
    let caller_id: i64 = row.get(2)?;
    let receiver_id: i64 = row.get(3)?;
    let status: String = row.get(4)?;
    let call_type: String = row.get(5)?;
    let duration: Option<i64> = row.get(6)?;
    let is_seen: bool = row.get(7)?;
    let started_at: String = row.get(8)?;
    let ended_at = parse_opt_ts(9, row.get(9)?)?;
    let created_at: String = row.get(10)?;
    let deleted_by = parse_user_set(11, row.get(11)?)?;

    Ok(CallRecord {
        id: CallId(id),
        conversation_id: ConversationId(conversation_id),
        caller_id: UserId(caller_id),
        receiver_id: UserId(receiver_id),
        status: parse_enum::<CallStatus>(4, &status)?,
        kind: parse_enum(5, &call_type)?,
        duration,
        is_seen,
        deleted_by,
        started_at: parse_ts(8, &started_at)?,
        ended_at,
        created_at: parse_ts(10, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::types::CallKind;

    fn setup() -> (Database, CallRecord) {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let conversation = db
            .find_or_create_conversation(UserId(1), UserId(2), now)
            .unwrap();
        let call = db
            .insert_call(&NewCall {
                conversation_id: conversation.id,
                caller_id: UserId(1),
                receiver_id: UserId(2),
                kind: CallKind::Video,
                created_at: now,
            })
            .unwrap();
        (db, call)
    }

    fn to(from: CallStatus, to: CallStatus) -> CallTransition {
        CallTransition {
            from,
            to,
            ended_at: None,
            duration: None,
            is_seen: false,
        }
    }

    #[test]
    fn new_call_is_initiated() {
        let (_db, call) = setup();
        assert_eq!(call.status, CallStatus::Initiated);
        assert_eq!(call.kind, CallKind::Video);
        assert_eq!(call.started_at, call.created_at);
        assert!(!call.is_seen);
    }

    #[test]
    fn transition_is_compare_and_set() {
        let (db, call) = setup();

        assert!(db
            .transition_call(call.id, &to(CallStatus::Initiated, CallStatus::Answered))
            .unwrap());
        // A concurrent reject that still believes the call is ringing loses.
        assert!(!db
            .transition_call(call.id, &to(CallStatus::Initiated, CallStatus::Rejected))
            .unwrap());
        assert_eq!(db.get_call(call.id).unwrap().status, CallStatus::Answered);
    }

    #[test]
    fn transition_rejects_illegal_steps() {
        let (db, call) = setup();
        assert!(!db
            .transition_call(call.id, &to(CallStatus::Initiated, CallStatus::Ended))
            .unwrap());
        assert_eq!(db.get_call(call.id).unwrap().status, CallStatus::Initiated);
    }

    #[test]
    fn unseen_calls_only_lists_terminal_unacknowledged() {
        let (db, call) = setup();
        assert!(db.unseen_calls_for(call.conversation_id, UserId(2)).unwrap().is_empty());

        db.transition_call(call.id, &to(CallStatus::Initiated, CallStatus::Missed))
            .unwrap();
        let unseen = db.unseen_calls_for(call.conversation_id, UserId(2)).unwrap();
        assert_eq!(unseen.len(), 1);
        assert!(db.unseen_calls_for(call.conversation_id, UserId(1)).unwrap().is_empty());

        assert!(db.mark_call_seen(call.id).unwrap());
        assert!(!db.mark_call_seen(call.id).unwrap());
        assert!(db.unseen_calls_for(call.conversation_id, UserId(2)).unwrap().is_empty());
    }

    #[test]
    fn ringing_calls_before_cutoff() {
        let (db, call) = setup();
        let later = call.created_at + chrono::Duration::seconds(60);

        assert_eq!(db.ringing_calls_before(later).unwrap().len(), 1);
        assert!(db.ringing_calls_before(call.created_at).unwrap().is_empty());
    }
}
