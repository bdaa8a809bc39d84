use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS call_records (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,             -- FK -> conversations(id)
    caller_id       INTEGER NOT NULL,
    receiver_id     INTEGER NOT NULL,
    status          TEXT NOT NULL DEFAULT 'initiated'
        CHECK (status IN ('initiated', 'answered', 'rejected', 'missed', 'cancelled', 'ended')),
    call_type       TEXT NOT NULL DEFAULT 'audio'
        CHECK (call_type IN ('audio', 'video')),
    duration        INTEGER,                      -- seconds, set once the call is over
    is_seen         INTEGER NOT NULL DEFAULT 0,   -- receiver acknowledged the record
    started_at      TEXT NOT NULL,
    ended_at        TEXT,
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_call_records_conversation_ts
    ON call_records(conversation_id, created_at DESC);

CREATE TABLE IF NOT EXISTS call_deletions (
    call_id    INTEGER NOT NULL,
    user_id    INTEGER NOT NULL,
    deleted_at TEXT NOT NULL,

    PRIMARY KEY (call_id, user_id),
    FOREIGN KEY (call_id) REFERENCES call_records(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
