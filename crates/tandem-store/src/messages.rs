//! The message store: append, ordered conversation reads, bulk mark-read,
//! unread counts, and bulk conversation clearing.

use chrono::{DateTime, Utc};
use rusqlite::params;

use tandem_shared::types::{Message, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Persist a new message with a server-assigned id and timestamp.
    ///
    /// The caller (relay engine) must not deliver anything until this has
    /// returned `Ok`.
    pub fn append_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> Result<Message> {
        let created_at = Utc::now();
        self.conn().execute(
            "INSERT INTO messages (sender_id, receiver_id, body, read, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![sender_id.0, receiver_id.0, body, created_at.to_rfc3339()],
        )?;

        let id = self.conn().last_insert_rowid();

        Ok(Message {
            id,
            sender_id,
            receiver_id,
            body: body.to_string(),
            read: false,
            created_at,
        })
    }

    /// All messages between the pair, in either direction, ordered by
    /// creation time ascending (id breaks ties, so the order matches
    /// submission order).
    pub fn conversation_between(&self, a: UserId, b: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, body, read, created_at
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![a.0, b.0], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Mark every unread message from `sender_id` to `receiver_id` as read.
    ///
    /// The flag only moves false -> true, so repeating the call is a no-op.
    /// Returns the number of rows updated.
    pub fn mark_read(&self, sender_id: UserId, receiver_id: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET read = 1
             WHERE sender_id = ?1 AND receiver_id = ?2 AND read = 0",
            params![sender_id.0, receiver_id.0],
        )?;
        Ok(affected)
    }

    /// Count of messages addressed to `user` that are still unread.
    pub fn unread_count(&self, user: UserId) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND read = 0",
            params![user.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete every message between the pair. Returns how many rows went.
    pub fn clear_conversation(&self, a: UserId, b: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)",
            params![a.0, b.0],
        )?;
        Ok(affected)
    }
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let sender_id: i64 = row.get(1)?;
    let receiver_id: i64 = row.get(2)?;
    let body: String = row.get(3)?;
    let read: bool = row.get(4)?;
    let ts_str: String = row.get(5)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id,
        sender_id: UserId(sender_id),
        receiver_id: UserId(receiver_id),
        body,
        read,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn append_assigns_ids_in_submission_order() {
        let db = test_db();
        let m1 = db.append_message(UserId(1), UserId(2), "first").unwrap();
        let m2 = db.append_message(UserId(1), UserId(2), "second").unwrap();
        assert!(m2.id > m1.id);
        assert!(!m1.read);
    }

    #[test]
    fn conversation_is_ordered_and_bidirectional() {
        let db = test_db();
        db.append_message(UserId(1), UserId(2), "a").unwrap();
        db.append_message(UserId(2), UserId(1), "b").unwrap();
        db.append_message(UserId(1), UserId(2), "c").unwrap();
        // Unrelated pair must not appear.
        db.append_message(UserId(1), UserId(3), "x").unwrap();

        let convo = db.conversation_between(UserId(1), UserId(2)).unwrap();
        let bodies: Vec<_> = convo.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["a", "b", "c"]);

        for pair in convo.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = test_db();
        db.append_message(UserId(1), UserId(2), "a").unwrap();
        db.append_message(UserId(1), UserId(2), "b").unwrap();

        assert_eq!(db.unread_count(UserId(2)).unwrap(), 2);
        assert_eq!(db.mark_read(UserId(1), UserId(2)).unwrap(), 2);
        assert_eq!(db.unread_count(UserId(2)).unwrap(), 0);

        // Second call touches nothing and leaves the same read set.
        assert_eq!(db.mark_read(UserId(1), UserId(2)).unwrap(), 0);
        let convo = db.conversation_between(UserId(1), UserId(2)).unwrap();
        assert!(convo.iter().all(|m| m.read));
    }

    #[test]
    fn mark_read_is_directional() {
        let db = test_db();
        db.append_message(UserId(1), UserId(2), "to-2").unwrap();
        db.append_message(UserId(2), UserId(1), "to-1").unwrap();

        db.mark_read(UserId(1), UserId(2)).unwrap();
        assert_eq!(db.unread_count(UserId(2)).unwrap(), 0);
        assert_eq!(db.unread_count(UserId(1)).unwrap(), 1);
    }

    #[test]
    fn clear_conversation_is_total() {
        let db = test_db();
        db.append_message(UserId(1), UserId(2), "a").unwrap();
        db.append_message(UserId(2), UserId(1), "b").unwrap();
        db.append_message(UserId(1), UserId(3), "keep").unwrap();

        let removed = db.clear_conversation(UserId(1), UserId(2)).unwrap();
        assert_eq!(removed, 2);
        assert!(db.conversation_between(UserId(1), UserId(2)).unwrap().is_empty());

        // The unrelated conversation survives.
        assert_eq!(db.conversation_between(UserId(1), UserId(3)).unwrap().len(), 1);
    }

    #[test]
    fn self_send_rejected_by_schema() {
        let db = test_db();
        assert!(db.append_message(UserId(5), UserId(5), "loop").is_err());
    }
}
