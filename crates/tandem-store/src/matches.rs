//! Approved-match lookups against the mentoring collaborator's records.

use chrono::Utc;
use rusqlite::params;

use tandem_shared::types::{MatchEdge, MatchRole, MatchStatus, MentorMatch, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Record a mentor/mentee pairing. The matching service owns these;
    /// this writer exists for mirroring and for tests.
    pub fn insert_match(
        &self,
        mentor: UserId,
        mentee: UserId,
        status: MatchStatus,
    ) -> Result<MentorMatch> {
        let created_at = Utc::now();
        self.conn().execute(
            "INSERT INTO mentor_matches (mentor_id, mentee_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![mentor.0, mentee.0, status.as_str(), created_at.to_rfc3339()],
        )?;

        Ok(MentorMatch {
            id: self.conn().last_insert_rowid(),
            mentor_id: mentor,
            mentee_id: mentee,
            status,
            created_at,
        })
    }

    /// All pairings where `user` occupies `role`, projected to the
    /// counterparty and pairing status.
    pub fn matches_involving(&self, user: UserId, role: MatchRole) -> Result<Vec<MatchEdge>> {
        let sql = match role {
            MatchRole::Mentor => {
                "SELECT mentee_id, status FROM mentor_matches WHERE mentor_id = ?1"
            }
            MatchRole::Mentee => {
                "SELECT mentor_id, status FROM mentor_matches WHERE mentee_id = ?1"
            }
        };

        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![user.0], |row| {
            let counterparty: i64 = row.get(0)?;
            let status_str: String = row.get(1)?;
            let status = MatchStatus::parse(&status_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    format!("unknown match status: {status_str}").into(),
                )
            })?;
            Ok(MatchEdge {
                counterparty_id: UserId(counterparty),
                status,
            })
        })?;

        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }
}
