use chrono::{DateTime, Utc};
use parley_shared::types::UserId;
use parley_shared::views::UserSummary;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::User;
use crate::sql::{opt_ts, parse_opt_ts, parse_ts, ts};

const USER_COLUMNS: &str = "id, display_name, avatar, last_active_at, created_at";

impl Database {
    /// Insert or refresh a directory entry. `created_at` is kept from the
    /// first insert.
    pub fn upsert_user(
        &self,
        id: UserId,
        display_name: &str,
        avatar: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.conn().execute(
            "INSERT INTO users (id, display_name, avatar, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 avatar       = excluded.avatar",
            params![id.0, display_name, avatar, ts(&now)],
        )?;
        self.get_user(id)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.find_user(id)?.ok_or(StoreError::NotFound)
    }

    pub fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Record activity. Returns `false` for unknown users.
    pub fn touch_user(&self, id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET last_active_at = ?1 WHERE id = ?2",
            params![opt_ts(&Some(at)), id.0],
        )?;
        Ok(affected > 0)
    }

    /// Public profile of `id`. Users missing from the directory still get a
    /// placeholder so historic rows stay renderable.
    pub fn user_summary(&self, id: UserId) -> Result<UserSummary> {
        Ok(match self.find_user(id)? {
            Some(user) => user.summary(),
            None => UserSummary {
                id,
                name: format!("User {id}"),
                avatar: None,
                last_active_at: None,
            },
        })
    }
}

pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: i64 = row.get(0)?;
    let display_name: String = row.get(1)?;
    let avatar: Option<String> = row.get(2)?;
    let last_active_at = parse_opt_ts(3, row.get(3)?)?;
    let created_at: String = row.get(4)?;

    Ok(User {
        id: UserId(id),
        display_name,
        avatar,
        last_active_at,
        created_at: parse_ts(4, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_created_at_and_updates_profile() {
        let db = Database::open_in_memory().unwrap();
        let first = Utc::now();

        let ada = db.upsert_user(UserId(1), "Ada", None, first).unwrap();
        assert_eq!(ada.display_name, "Ada");

        let later = first + chrono::Duration::minutes(5);
        let renamed = db
            .upsert_user(UserId(1), "Ada L.", Some("avatars/1.png"), later)
            .unwrap();
        assert_eq!(renamed.display_name, "Ada L.");
        assert_eq!(renamed.avatar.as_deref(), Some("avatars/1.png"));
        assert_eq!(renamed.created_at, ada.created_at);
    }

    #[test]
    fn touch_and_summary() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        assert!(!db.touch_user(UserId(9), now).unwrap());
        assert_eq!(db.user_summary(UserId(9)).unwrap().name, "User 9");

        db.upsert_user(UserId(9), "Grace", None, now).unwrap();
        assert!(db.touch_user(UserId(9), now).unwrap());
        let summary = db.user_summary(UserId(9)).unwrap();
        assert_eq!(summary.name, "Grace");
        assert!(summary.last_active_at.is_some());
    }
}
