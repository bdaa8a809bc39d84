use chrono::{DateTime, Utc};
use parley_shared::types::UserId;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::Block;
use crate::sql::{parse_ts, ts};

impl Database {
    /// Returns `false` if `blocker` had already blocked `blocked`.
    pub fn block_user(&self, blocker: UserId, blocked: UserId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
            params![blocker.0, blocked.0, ts(&at)],
        )?;
        Ok(affected > 0)
    }

    pub fn unblock_user(&self, blocker: UserId, blocked: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![blocker.0, blocked.0],
        )?;
        Ok(affected > 0)
    }

    /// Whether either user has blocked the other.
    pub fn is_blocked_between(&self, a: UserId, b: UserId) -> Result<bool> {
        let blocked: bool = self.conn().query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM blocks
                 WHERE (blocker_id = ?1 AND blocked_id = ?2)
                    OR (blocker_id = ?2 AND blocked_id = ?1))",
            params![a.0, b.0],
            |row| row.get(0),
        )?;
        Ok(blocked)
    }

    /// Users blocked by `blocker`, newest block first.
    pub fn blocks_by(&self, blocker: UserId) -> Result<Vec<Block>> {
        let mut stmt = self.conn().prepare(
            "SELECT blocker_id, blocked_id, created_at FROM blocks
             WHERE blocker_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![blocker.0], |row| {
            let blocker_id: i64 = row.get(0)?;
            let blocked_id: i64 = row.get(1)?;
            let created_at: String = row.get(2)?;
            Ok(Block {
                blocker_id: UserId(blocker_id),
                blocked_id: UserId(blocked_id),
                created_at: parse_ts(2, &created_at)?,
            })
        })?;

        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }
}
