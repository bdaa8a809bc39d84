//! v001 -- Initial schema creation.
//!
//! Creates `users`, `conversations`, `messages`, `message_deletions` and
//! `blocks`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (directory cache of the auth collaborator)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id             INTEGER PRIMARY KEY NOT NULL,  -- id issued by the auth collaborator
    display_name   TEXT NOT NULL,
    avatar         TEXT,                          -- storage reference
    last_active_at TEXT,                          -- RFC-3339, microseconds
    created_at     TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Conversations: one row per unordered pair, stored as (low, high)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    user_low_id      INTEGER NOT NULL,
    user_high_id     INTEGER NOT NULL,
    last_activity_at TEXT NOT NULL,
    created_at       TEXT NOT NULL,

    CHECK (user_low_id < user_high_id),
    UNIQUE (user_low_id, user_high_id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_low  ON conversations(user_low_id);
CREATE INDEX IF NOT EXISTS idx_conversations_high ON conversations(user_high_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,             -- FK -> conversations(id)
    sender_id       INTEGER NOT NULL,
    content         TEXT,
    attachment_path TEXT,
    attachment_kind TEXT,                         -- image | video | voice | file
    attachment_mime TEXT,
    seen            INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    unsent          INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    unsent_at       TEXT,
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at DESC);

-- Per-user "delete for me" markers: the deleted-by set of a message.
CREATE TABLE IF NOT EXISTS message_deletions (
    message_id INTEGER NOT NULL,
    user_id    INTEGER NOT NULL,
    deleted_at TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Blocks
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    blocker_id INTEGER NOT NULL,
    blocked_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (blocker_id, blocked_id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
