//! CRUD operations for [`Like`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::Like;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Record that `liker` likes `liked`.
    ///
    /// Idempotent: an existing (liker, liked) row is left untouched and
    /// `false` is returned so the caller can report "already liked".
    pub fn create_like(&self, liker: UserId, liked: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO likes (liker, liked, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                liker.to_string(),
                liked.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Whether an ordered (liker, liked) row exists.
    pub fn has_like(&self, liker: UserId, liked: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM likes WHERE liker = ?1 AND liked = ?2",
            params![liker.to_string(), liked.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List all likes given by a user, oldest first.
    pub fn list_likes_by(&self, liker: UserId) -> Result<Vec<Like>> {
        let mut stmt = self.conn().prepare(
            "SELECT liker, liked, created_at
             FROM likes
             WHERE liker = ?1
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![liker.to_string()], row_to_like)?;

        let mut likes = Vec::new();
        for row in rows {
            likes.push(row?);
        }
        Ok(likes)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Remove a like. Returns `true` if a row was deleted. Never touches
    /// any match the like may have contributed to.
    pub fn delete_like(&self, liker: UserId, liked: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM likes WHERE liker = ?1 AND liked = ?2",
            params![liker.to_string(), liked.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Like`].
fn row_to_like(row: &rusqlite::Row<'_>) -> rusqlite::Result<Like> {
    let liker_str: String = row.get(0)?;
    let liked_str: String = row.get(1)?;
    let created_str: String = row.get(2)?;

    let liker = Uuid::parse_str(&liker_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let liked = Uuid::parse_str(&liked_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Like {
        liker: UserId(liker),
        liked: UserId(liked),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new();
        let b = UserId::new();

        assert!(db.create_like(a, b).unwrap());
        assert!(!db.create_like(a, b).unwrap());
        assert!(db.has_like(a, b).unwrap());
        // The reverse direction is a distinct row.
        assert!(!db.has_like(b, a).unwrap());
    }

    #[test]
    fn unlike_removes_only_the_ordered_pair() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new();
        let b = UserId::new();

        db.create_like(a, b).unwrap();
        db.create_like(b, a).unwrap();

        assert!(db.delete_like(a, b).unwrap());
        assert!(!db.delete_like(a, b).unwrap());
        assert!(db.has_like(b, a).unwrap());
        assert_eq!(db.list_likes_by(b).unwrap().len(), 1);
    }
}
