//! User directory mirrored from the account collaborator.
//!
//! The relay only reads from this table (auth filtering, event decoration);
//! writes happen when the account service syncs profiles over.

use rusqlite::params;

use tandem_shared::types::{UserId, UserProfile};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Fetch a single user by id.
    pub fn get_user(&self, id: UserId) -> Result<UserProfile> {
        self.conn()
            .query_row(
                "SELECT id, display_name, active FROM users WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(UserProfile {
                        id: UserId(row.get(0)?),
                        display_name: row.get(1)?,
                        active: row.get(2)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Insert or replace a mirrored profile.
    pub fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, display_name, active) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = ?2, active = ?3",
            params![profile.id.0, profile.display_name, profile.active],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn upsert_and_get() {
        let db = test_db();
        let profile = UserProfile {
            id: UserId(1),
            display_name: "Ada".into(),
            active: true,
        };
        db.upsert_user(&profile).unwrap();
        assert_eq!(db.get_user(UserId(1)).unwrap(), profile);

        // Second upsert overwrites in place.
        let renamed = UserProfile {
            display_name: "Ada L.".into(),
            active: false,
            ..profile
        };
        db.upsert_user(&renamed).unwrap();
        assert_eq!(db.get_user(UserId(1)).unwrap(), renamed);
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = test_db();
        assert!(matches!(db.get_user(UserId(404)), Err(StoreError::NotFound)));
    }
}
