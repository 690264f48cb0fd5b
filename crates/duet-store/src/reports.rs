//! CRUD operations for [`Report`] records. Reports are append-only; this
//! core never mutates them after creation.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::types::{CallId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{Report, ReportStatus};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new abuse report with status `pending`.
    pub fn create_report(
        &self,
        reporter: UserId,
        reported: UserId,
        call_id: Option<CallId>,
        reason: &str,
    ) -> Result<Report> {
        let report = Report {
            id: Uuid::new_v4(),
            reporter,
            reported,
            call_id,
            reason: reason.to_string(),
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO reports (id, reporter, reported, call_id, reason, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.id.to_string(),
                report.reporter.to_string(),
                report.reported.to_string(),
                report.call_id.map(|c| c.to_string()),
                report.reason,
                report.status.as_str(),
                report.created_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(
            reporter = %reporter.short(),
            reported = %reported.short(),
            "report recorded"
        );

        Ok(report)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// List all reports filed by a user, newest first.
    pub fn list_reports_by(&self, reporter: UserId) -> Result<Vec<Report>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, reporter, reported, call_id, reason, status, created_at
             FROM reports
             WHERE reporter = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![reporter.to_string()], row_to_report)?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Report`].
fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let id_str: String = row.get(0)?;
    let reporter_str: String = row.get(1)?;
    let reported_str: String = row.get(2)?;
    let call_str: Option<String> = row.get(3)?;
    let reason: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let created_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let reporter = Uuid::parse_str(&reporter_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let reported = Uuid::parse_str(&reported_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let call_id = call_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let status = ReportStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown report status: {status_str}").into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Report {
        id,
        reporter: UserId(reporter),
        reported: UserId(reported),
        call_id: call_id.map(CallId),
        reason,
        status,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let reporter = UserId::new();
        let reported = UserId::new();

        let report = db
            .create_report(reporter, reported, None, "inappropriate behavior")
            .unwrap();
        assert_eq!(report.status, ReportStatus::Pending);

        let listed = db.list_reports_by(reporter).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, report.id);
        assert_eq!(listed[0].call_id, None);
        assert_eq!(listed[0].reason, "inappropriate behavior");
    }
}
