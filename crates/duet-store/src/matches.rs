//! CRUD operations for [`Match`] records.
//!
//! The matches table is keyed by the canonical unordered pair
//! (`pair_lo < pair_hi`, UNIQUE). [`Database::create_match`] treats a
//! constraint violation as "someone else materialized this match first"
//! and returns the existing row, so concurrent mutual likes from both
//! sides resolve to exactly one match.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::types::{MatchId, PairKey, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Match, MatchStatus};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Materialize the match for an unordered pair with status `pending`.
    ///
    /// First writer wins: if a row for the pair already exists (created by
    /// the other side or a reconciliation pass), the insert conflict is
    /// swallowed and the existing match is returned unchanged.
    pub fn create_match(&self, pair: PairKey) -> Result<Match> {
        let now = Utc::now();
        let candidate = Match {
            id: MatchId::new(),
            pair,
            status: MatchStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO matches
                 (id, pair_lo, pair_hi, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                candidate.id.to_string(),
                pair.lo.to_string(),
                pair.hi.to_string(),
                candidate.status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        if inserted > 0 {
            tracing::info!(
                lo = %pair.lo.short(),
                hi = %pair.hi.short(),
                id = %candidate.id,
                "match created"
            );
            Ok(candidate)
        } else {
            tracing::debug!(
                lo = %pair.lo.short(),
                hi = %pair.hi.short(),
                "match already exists, returning existing row"
            );
            self.get_match_for_pair(pair)?.ok_or(StoreError::NotFound)
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single match by id.
    pub fn get_match(&self, id: MatchId) -> Result<Match> {
        self.conn()
            .query_row(
                "SELECT id, pair_lo, pair_hi, status, created_at, updated_at
                 FROM matches
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_match,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the match for an unordered pair, if one exists.
    pub fn get_match_for_pair(&self, pair: PairKey) -> Result<Option<Match>> {
        let result = self.conn().query_row(
            "SELECT id, pair_lo, pair_hi, status, created_at, updated_at
             FROM matches
             WHERE pair_lo = ?1 AND pair_hi = ?2",
            params![pair.lo.to_string(), pair.hi.to_string()],
            row_to_match,
        );

        match result {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }

    /// List all matches involving a user, newest first.
    pub fn list_matches_for(&self, user: UserId) -> Result<Vec<Match>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, pair_lo, pair_hi, status, created_at, updated_at
             FROM matches
             WHERE pair_lo = ?1 OR pair_hi = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![user.to_string()], row_to_match)?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Set the status of a match.
    pub fn update_match_status(&self, id: MatchId, status: MatchStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE matches SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                status.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Match`].
fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    let id_str: String = row.get(0)?;
    let lo_str: String = row.get(1)?;
    let hi_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let lo = Uuid::parse_str(&lo_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let hi = Uuid::parse_str(&hi_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status = MatchStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown match status: {status_str}").into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Match {
        id: MatchId(id),
        pair: PairKey {
            lo: UserId(lo),
            hi: UserId(hi),
        },
        status,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_exactly_once_per_unordered_pair() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new();
        let b = UserId::new();

        // Both sides race to create the same match, each from its own
        // argument order.
        let first = db.create_match(PairKey::new(a, b).unwrap()).unwrap();
        let second = db.create_match(PairKey::new(b, a).unwrap()).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, MatchStatus::Pending);

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn status_update_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let pair = PairKey::new(UserId::new(), UserId::new()).unwrap();
        let m = db.create_match(pair).unwrap();

        db.update_match_status(m.id, MatchStatus::Accepted).unwrap();
        assert_eq!(db.get_match(m.id).unwrap().status, MatchStatus::Accepted);

        db.update_match_status(m.id, MatchStatus::Rejected).unwrap();
        assert_eq!(db.get_match(m.id).unwrap().status, MatchStatus::Rejected);
    }

    #[test]
    fn update_missing_match_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .update_match_status(MatchId::new(), MatchStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn list_matches_for_either_side() {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new();
        let b = UserId::new();
        let m = db.create_match(PairKey::new(a, b).unwrap()).unwrap();

        assert_eq!(db.list_matches_for(a).unwrap(), vec![m.clone()]);
        assert_eq!(db.list_matches_for(b).unwrap(), vec![m]);
        assert!(db.list_matches_for(UserId::new()).unwrap().is_empty());
    }
}
