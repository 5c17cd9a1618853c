//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `connections`, `mentor_matches`,
//! and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (mirrored from the account collaborator)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           INTEGER PRIMARY KEY NOT NULL,
    display_name TEXT NOT NULL,
    active       INTEGER NOT NULL DEFAULT 1    -- boolean 0/1
);

-- ----------------------------------------------------------------
-- Connection records (social-graph edges)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS connections (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    requester_id INTEGER NOT NULL,
    receiver_id  INTEGER NOT NULL,
    status       TEXT NOT NULL,                -- pending | accepted | rejected
    created_at   TEXT NOT NULL,                -- ISO-8601 / RFC-3339
    updated_at   TEXT NOT NULL,

    CHECK (requester_id <> receiver_id)
);

-- At most one record per unordered pair, regardless of direction.
CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_pair
    ON connections (MIN(requester_id, receiver_id), MAX(requester_id, receiver_id));

-- ----------------------------------------------------------------
-- Mentor matches (owned by the matching collaborator)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS mentor_matches (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    mentor_id  INTEGER NOT NULL,
    mentee_id  INTEGER NOT NULL,
    status     TEXT NOT NULL,                  -- pending | approved | ended
    created_at TEXT NOT NULL,

    CHECK (mentor_id <> mentee_id)
);

CREATE INDEX IF NOT EXISTS idx_matches_mentor ON mentor_matches(mentor_id, status);
CREATE INDEX IF NOT EXISTS idx_matches_mentee ON mentor_matches(mentee_id, status);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,  -- submission order
    sender_id   INTEGER NOT NULL,
    receiver_id INTEGER NOT NULL,
    body        TEXT NOT NULL,
    read        INTEGER NOT NULL DEFAULT 0,         -- boolean 0/1
    created_at  TEXT NOT NULL,                      -- ISO-8601

    CHECK (sender_id <> receiver_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(sender_id, receiver_id, id);
CREATE INDEX IF NOT EXISTS idx_messages_unread
    ON messages(receiver_id, read);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
