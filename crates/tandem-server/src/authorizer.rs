//! The relationship gate: may A message B?
//!
//! Two independent relationship kinds confer messaging rights: an explicit
//! accepted connection record, or an approved mentor/mentee match in either
//! direction. The check runs synchronously before anything is persisted or
//! relayed, never after.

use tandem_shared::types::{ConnectionStatus, MatchRole, MatchStatus, UserId};
use tandem_store::StoreError;

use crate::db::SharedDb;

#[derive(Clone)]
pub struct RelationshipAuthorizer {
    db: SharedDb,
}

impl RelationshipAuthorizer {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Whether `sender` is allowed to message `receiver`.
    pub async fn can_message(&self, sender: UserId, receiver: UserId) -> Result<bool, StoreError> {
        let db = self.db.lock().await;

        // Primary path: an accepted connection for the unordered pair.
        if let Some(record) = db.connection_for_pair(sender, receiver)? {
            if record.status == ConnectionStatus::Accepted {
                return Ok(true);
            }
        }

        // Fallback: an approved mentorship pairing, sender as mentor or as
        // mentee.
        for role in [MatchRole::Mentor, MatchRole::Mentee] {
            let edges = db.matches_involving(sender, role)?;
            if edges
                .iter()
                .any(|e| e.counterparty_id == receiver && e.status == MatchStatus::Approved)
            {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tandem_store::Database;

    fn authorizer() -> RelationshipAuthorizer {
        let db = Database::open_in_memory().unwrap();
        RelationshipAuthorizer::new(crate::db::shared(db))
    }

    #[tokio::test]
    async fn accepted_connection_allows_both_directions() {
        let auth = authorizer();
        {
            let db = auth.db.lock().await;
            let record = db.create_connection_request(UserId(1), UserId(2)).unwrap();
            db.respond_to_connection(record.id, UserId(2), true).unwrap();
        }
        assert!(auth.can_message(UserId(1), UserId(2)).await.unwrap());
        assert!(auth.can_message(UserId(2), UserId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn pending_or_rejected_connection_denies() {
        let auth = authorizer();
        {
            let db = auth.db.lock().await;
            let record = db.create_connection_request(UserId(1), UserId(2)).unwrap();
            assert!(record.status == ConnectionStatus::Pending);
        }
        assert!(!auth.can_message(UserId(1), UserId(2)).await.unwrap());

        {
            let db = auth.db.lock().await;
            let record = db.connection_for_pair(UserId(1), UserId(2)).unwrap().unwrap();
            db.respond_to_connection(record.id, UserId(2), false).unwrap();
        }
        assert!(!auth.can_message(UserId(1), UserId(2)).await.unwrap());
    }

    #[tokio::test]
    async fn approved_match_allows_either_direction() {
        let auth = authorizer();
        {
            let db = auth.db.lock().await;
            db.insert_match(UserId(3), UserId(4), MatchStatus::Approved).unwrap();
        }
        assert!(auth.can_message(UserId(3), UserId(4)).await.unwrap());
        assert!(auth.can_message(UserId(4), UserId(3)).await.unwrap());
    }

    #[tokio::test]
    async fn unapproved_match_denies() {
        let auth = authorizer();
        {
            let db = auth.db.lock().await;
            db.insert_match(UserId(3), UserId(4), MatchStatus::Pending).unwrap();
            db.insert_match(UserId(5), UserId(3), MatchStatus::Ended).unwrap();
        }
        assert!(!auth.can_message(UserId(3), UserId(4)).await.unwrap());
        assert!(!auth.can_message(UserId(3), UserId(5)).await.unwrap());
    }

    #[tokio::test]
    async fn strangers_are_denied() {
        let auth = authorizer();
        assert!(!auth.can_message(UserId(8), UserId(9)).await.unwrap());
    }
}
