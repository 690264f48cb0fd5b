//! CRUD operations for [`Call`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::types::{CallId, CallKind, MatchId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Call, CallStatus};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new call row.
    ///
    /// Idempotent: both participants derive the same call id for a given
    /// match stage, so the second insert is a silent no-op observing the
    /// first writer's row.
    pub fn create_call(&self, call: &Call) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO calls
                 (id, match_id, kind, status, duration_secs, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                call.id.to_string(),
                call.match_id.to_string(),
                call.kind.as_str(),
                call.status.as_str(),
                call.duration_secs,
                call.started_at.map(|t| t.to_rfc3339()),
                call.ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single call by id.
    pub fn get_call(&self, id: CallId) -> Result<Call> {
        self.conn()
            .query_row(
                "SELECT id, match_id, kind, status, duration_secs, started_at, ended_at
                 FROM calls
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_call,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Set a call's status, stamping `ended_at` for terminal statuses.
    pub fn update_call_status(&self, id: CallId, status: CallStatus) -> Result<()> {
        let ended_at = match status {
            CallStatus::Completed | CallStatus::Rejected => Some(Utc::now().to_rfc3339()),
            CallStatus::Pending | CallStatus::Active => None,
        };

        let affected = self.conn().execute(
            "UPDATE calls
             SET status = ?2, ended_at = COALESCE(?3, ended_at)
             WHERE id = ?1",
            params![id.to_string(), status.as_str(), ended_at],
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

/// Map a `rusqlite::Row` to a [`Call`].
fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<Call> {
    let id_str: String = row.get(0)?;
    let match_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let duration_secs: u32 = row.get(4)?;
    let started_str: Option<String> = row.get(5)?;
    let ended_str: Option<String> = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let match_id = Uuid::parse_str(&match_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let kind = CallKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown call kind: {kind_str}").into(),
        )
    })?;
    let status = CallStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown call status: {status_str}").into(),
        )
    })?;

    let parse_ts = |idx: usize, s: Option<String>| -> rusqlite::Result<Option<DateTime<Utc>>> {
        s.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        idx,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
        })
        .transpose()
    };

    Ok(Call {
        id: CallId(id),
        match_id: MatchId(match_id),
        kind,
        status,
        duration_secs,
        started_at: parse_ts(5, started_str)?,
        ended_at: parse_ts(6, ended_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_shared::types::PairKey;
    use duet_shared::types::UserId;

    #[test]
    fn call_lifecycle_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let m = db
            .create_match(PairKey::new(UserId::new(), UserId::new()).unwrap())
            .unwrap();

        let call = Call {
            id: CallId::new(),
            match_id: m.id,
            kind: CallKind::Voice,
            status: CallStatus::Active,
            duration_secs: 180,
            started_at: Some(Utc::now()),
            ended_at: None,
        };
        db.create_call(&call).unwrap();

        db.update_call_status(call.id, CallStatus::Completed).unwrap();

        let fetched = db.get_call(call.id).unwrap();
        assert_eq!(fetched.status, CallStatus::Completed);
        assert_eq!(fetched.kind, CallKind::Voice);
        assert!(fetched.ended_at.is_some());
    }

    #[test]
    fn second_insert_for_the_same_call_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        let m = db
            .create_match(PairKey::new(UserId::new(), UserId::new()).unwrap())
            .unwrap();

        let call = Call {
            id: CallId::for_stage(m.id, CallKind::Voice),
            match_id: m.id,
            kind: CallKind::Voice,
            status: CallStatus::Active,
            duration_secs: 180,
            started_at: Some(Utc::now()),
            ended_at: None,
        };
        db.create_call(&call).unwrap();

        // The peer's insert, derived from the same match stage.
        let mut peer_side = call.clone();
        peer_side.duration_secs = 180;
        db.create_call(&peer_side).unwrap();

        assert_eq!(db.get_call(call.id).unwrap().duration_secs, 180);
    }
}
