//! Connection-record lifecycle: request, accept/reject, reopen.
//!
//! Invariant: one record per unordered pair. Direction (who is recorded as
//! requester) is bookkeeping and swaps when a rejected record is reopened
//! by the other party.

use chrono::{DateTime, Utc};
use rusqlite::params;

use tandem_shared::types::{ConnectionRecord, ConnectionStatus, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Create a connection request from `requester` to `receiver`.
    ///
    /// - no existing record: insert a fresh `pending` one
    /// - existing `pending` from the same direction: return it unchanged
    ///   (idempotent re-request)
    /// - existing `rejected`: reopen to `pending`; either party may do
    ///   this, and the record's direction is rewritten to the new request
    /// - existing `pending` from the other direction or `accepted`: conflict
    pub fn create_connection_request(
        &self,
        requester: UserId,
        receiver: UserId,
    ) -> Result<ConnectionRecord> {
        if requester == receiver {
            return Err(StoreError::Conflict(
                "cannot request a connection with yourself".into(),
            ));
        }

        let now = Utc::now();

        match self.connection_for_pair(requester, receiver)? {
            None => {
                self.conn().execute(
                    "INSERT INTO connections (requester_id, receiver_id, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![
                        requester.0,
                        receiver.0,
                        ConnectionStatus::Pending.as_str(),
                        now.to_rfc3339(),
                    ],
                )?;
                let id = self.conn().last_insert_rowid();
                self.get_connection(id)
            }
            Some(existing) => match existing.status {
                ConnectionStatus::Pending if existing.requester_id == requester => Ok(existing),
                ConnectionStatus::Pending => Err(StoreError::Conflict(format!(
                    "user {requester} already has a pending request from {receiver}"
                ))),
                ConnectionStatus::Accepted => Err(StoreError::Conflict(format!(
                    "users {requester} and {receiver} are already connected"
                ))),
                ConnectionStatus::Rejected => {
                    // Reopen: the fresh requester takes the requester column.
                    self.conn().execute(
                        "UPDATE connections
                         SET requester_id = ?1, receiver_id = ?2, status = ?3, updated_at = ?4
                         WHERE id = ?5",
                        params![
                            requester.0,
                            receiver.0,
                            ConnectionStatus::Pending.as_str(),
                            now.to_rfc3339(),
                            existing.id,
                        ],
                    )?;
                    self.get_connection(existing.id)
                }
            },
        }
    }

    /// Accept or reject a pending request. Only the recorded receiver may
    /// respond, and only while the record is `pending`.
    pub fn respond_to_connection(
        &self,
        id: i64,
        actor: UserId,
        accept: bool,
    ) -> Result<ConnectionRecord> {
        let record = self.get_connection(id)?;

        if record.receiver_id != actor {
            return Err(StoreError::Conflict(format!(
                "user {actor} is not the receiver of connection {id}"
            )));
        }
        if record.status != ConnectionStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "connection {id} is not pending (status: {})",
                record.status.as_str()
            )));
        }

        let status = if accept {
            ConnectionStatus::Accepted
        } else {
            ConnectionStatus::Rejected
        };

        self.conn().execute(
            "UPDATE connections SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;

        self.get_connection(id)
    }

    /// Fetch a single connection record by id.
    pub fn get_connection(&self, id: i64) -> Result<ConnectionRecord> {
        self.conn()
            .query_row(
                "SELECT id, requester_id, receiver_id, status, created_at, updated_at
                 FROM connections WHERE id = ?1",
                params![id],
                row_to_connection,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The record for the unordered pair, if any, regardless of direction.
    pub fn connection_for_pair(&self, a: UserId, b: UserId) -> Result<Option<ConnectionRecord>> {
        let result = self.conn().query_row(
            "SELECT id, requester_id, receiver_id, status, created_at, updated_at
             FROM connections
             WHERE (requester_id = ?1 AND receiver_id = ?2)
                OR (requester_id = ?2 AND receiver_id = ?1)",
            params![a.0, b.0],
            row_to_connection,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }
}

/// Map a `rusqlite::Row` to a [`ConnectionRecord`].
fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionRecord> {
    let id: i64 = row.get(0)?;
    let requester_id: i64 = row.get(1)?;
    let receiver_id: i64 = row.get(2)?;
    let status_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    let status = ConnectionStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown connection status: {status_str}").into(),
        )
    })?;

    let created_at = parse_ts(&created_str, 4)?;
    let updated_at = parse_ts(&updated_str, 5)?;

    Ok(ConnectionRecord {
        id,
        requester_id: UserId(requester_id),
        receiver_id: UserId(receiver_id),
        status,
        created_at,
        updated_at,
    })
}

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn request_accept_flow() {
        let db = test_db();
        let record = db.create_connection_request(UserId(1), UserId(2)).unwrap();
        assert_eq!(record.status, ConnectionStatus::Pending);

        let updated = db.respond_to_connection(record.id, UserId(2), true).unwrap();
        assert_eq!(updated.status, ConnectionStatus::Accepted);
    }

    #[test]
    fn pair_is_unique_regardless_of_direction() {
        let db = test_db();
        db.create_connection_request(UserId(1), UserId(2)).unwrap();

        // Reverse-direction request against a pending record is a conflict,
        // not a second row.
        let err = db.create_connection_request(UserId(2), UserId(1)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let record = db.connection_for_pair(UserId(2), UserId(1)).unwrap().unwrap();
        assert_eq!(record.requester_id, UserId(1));
    }

    #[test]
    fn duplicate_pending_request_is_idempotent() {
        let db = test_db();
        let first = db.create_connection_request(UserId(1), UserId(2)).unwrap();
        let second = db.create_connection_request(UserId(1), UserId(2)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, ConnectionStatus::Pending);
    }

    #[test]
    fn rejected_record_reopens_from_either_party() {
        let db = test_db();
        let record = db.create_connection_request(UserId(1), UserId(2)).unwrap();
        db.respond_to_connection(record.id, UserId(2), false).unwrap();

        // The original receiver re-requests; direction swaps.
        let reopened = db.create_connection_request(UserId(2), UserId(1)).unwrap();
        assert_eq!(reopened.id, record.id);
        assert_eq!(reopened.status, ConnectionStatus::Pending);
        assert_eq!(reopened.requester_id, UserId(2));
        assert_eq!(reopened.receiver_id, UserId(1));
    }

    #[test]
    fn only_receiver_may_respond() {
        let db = test_db();
        let record = db.create_connection_request(UserId(1), UserId(2)).unwrap();

        let err = db.respond_to_connection(record.id, UserId(1), true).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = db.respond_to_connection(record.id, UserId(3), true).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn responding_twice_is_a_conflict() {
        let db = test_db();
        let record = db.create_connection_request(UserId(1), UserId(2)).unwrap();
        db.respond_to_connection(record.id, UserId(2), true).unwrap();

        let err = db.respond_to_connection(record.id, UserId(2), false).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn request_against_accepted_record_is_a_conflict() {
        let db = test_db();
        let record = db.create_connection_request(UserId(1), UserId(2)).unwrap();
        db.respond_to_connection(record.id, UserId(2), true).unwrap();

        let err = db.create_connection_request(UserId(1), UserId(2)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn missing_record_is_not_found() {
        let db = test_db();
        assert!(matches!(
            db.respond_to_connection(999, UserId(1), true),
            Err(StoreError::NotFound)
        ));
        assert!(db.connection_for_pair(UserId(8), UserId(9)).unwrap().is_none());
    }
}
