//! Per-student monthly attendance summaries.
//!
//! A summary row is never incremented. Every refresh recounts the student's
//! events for that month, so replaying a refresh is harmless and a missed one is
//! repaired by the next.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::attendance;
use crate::db;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub student_id: String,
    pub year: i32,
    pub month: u32,
    pub total_days: i64,
    pub present_days: i64,
    pub absent_days: i64,
    pub late_days: i64,
    pub attendance_percentage: Decimal,
    pub updated_at: String,
}

const SUMMARY_COLUMNS: &str = "student_id, year, month, total_days, present_days, absent_days,
    late_days, attendance_percentage, updated_at";

fn summary_from_row(r: &Row<'_>) -> rusqlite::Result<MonthlySummary> {
    Ok(MonthlySummary {
        student_id: r.get(0)?,
        year: r.get(1)?,
        month: r.get(2)?,
        total_days: r.get(3)?,
        present_days: r.get(4)?,
        absent_days: r.get(5)?,
        late_days: r.get(6)?,
        attendance_percentage: db::decimal_at(r, 7)?,
        updated_at: r.get(8)?,
    })
}

fn month_key(year: i32, month: u32) -> EngineResult<String> {
    if !(1..=12).contains(&month) {
        return Err(EngineError::validation("month", "must be between 1 and 12"));
    }
    Ok(format!("{:04}-{:02}", year, month))
}

/// Recount `(student, year, month)` from its events inside an IMMEDIATE
/// transaction, creating the row on first use.
pub fn on_event_recorded(
    conn: &Connection,
    student_id: &str,
    year: i32,
    month: u32,
) -> EngineResult<MonthlySummary> {
    let key = month_key(year, month)?;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let now = db::now_iso();

    tx.execute(
        "INSERT INTO monthly_summaries(
            student_id, year, month, total_days, present_days, absent_days, late_days,
            attendance_percentage, updated_at)
         VALUES(?, ?, ?, 0, 0, 0, 0, '0.00', ?)
         ON CONFLICT(student_id, year, month) DO NOTHING",
        (student_id, year, month, &now),
    )?;

    let t = attendance::tally(
        &tx,
        "e.student_id = ? AND substr(s.date, 1, 7) = ?",
        vec![Value::Text(student_id.to_string()), Value::Text(key)],
    )?;
    let attendance_percentage = t.percentage();
    tx.execute(
        "UPDATE monthly_summaries SET
           total_days = ?, present_days = ?, absent_days = ?, late_days = ?,
           attendance_percentage = ?, updated_at = ?
         WHERE student_id = ? AND year = ? AND month = ?",
        (
            t.total,
            t.present,
            t.absent,
            t.late,
            attendance_percentage.to_string(),
            &now,
            student_id,
            year,
            month,
        ),
    )?;
    tx.commit()?;

    Ok(MonthlySummary {
        student_id: student_id.to_string(),
        year,
        month,
        total_days: t.total,
        present_days: t.present,
        absent_days: t.absent,
        late_days: t.late,
        attendance_percentage,
        updated_at: now,
    })
}

/// Post-commit hook for attendance writes. A failed recount is logged and left
/// for [`reconcile`]; it never fails the write that triggered it.
pub fn after_commit(conn: &Connection, student_id: &str, year: i32, month: u32) {
    match on_event_recorded(conn, student_id, year, month) {
        Ok(s) => tracing::debug!(
            student_id,
            year,
            month,
            total_days = s.total_days,
            "monthly summary recounted"
        ),
        Err(e) => tracing::warn!(
            student_id,
            year,
            month,
            error = %e,
            "monthly summary recount skipped"
        ),
    }
}

pub fn get_summary(
    conn: &Connection,
    student_id: &str,
    year: i32,
    month: u32,
) -> EngineResult<Option<MonthlySummary>> {
    month_key(year, month)?;
    let sql = format!(
        "SELECT {} FROM monthly_summaries WHERE student_id = ? AND year = ? AND month = ?",
        SUMMARY_COLUMNS
    );
    Ok(conn
        .query_row(&sql, (student_id, year, month), summary_from_row)
        .optional()?)
}

pub fn list_for_student(
    conn: &Connection,
    student_id: &str,
    year: Option<i32>,
) -> EngineResult<Vec<MonthlySummary>> {
    let (sql, binds) = match year {
        Some(y) => (
            format!(
                "SELECT {} FROM monthly_summaries WHERE student_id = ? AND year = ?
                 ORDER BY year, month",
                SUMMARY_COLUMNS
            ),
            vec![Value::Text(student_id.to_string()), Value::Integer(y as i64)],
        ),
        None => (
            format!(
                "SELECT {} FROM monthly_summaries WHERE student_id = ? ORDER BY year, month",
                SUMMARY_COLUMNS
            ),
            vec![Value::Text(student_id.to_string())],
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds), summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub recounted: usize,
    pub failed: usize,
}

/// Recount every month that has events, plus every stored summary whose
/// events may since have gone. Optionally limited to one student.
pub fn reconcile(conn: &Connection, student_id: Option<&str>) -> EngineResult<ReconcileReport> {
    let (filter_events, filter_summaries, binds) = match student_id {
        Some(id) => (
            "WHERE e.student_id = ?",
            "WHERE student_id = ?",
            vec![Value::Text(id.to_string()), Value::Text(id.to_string())],
        ),
        None => ("", "", Vec::new()),
    };
    let sql = format!(
        "SELECT e.student_id,
                CAST(substr(s.date, 1, 4) AS INTEGER),
                CAST(substr(s.date, 6, 2) AS INTEGER)
         FROM attendance_events e
         JOIN attendance_sessions s ON s.id = e.session_id
         {}
         UNION
         SELECT student_id, year, month FROM monthly_summaries {}",
        filter_events, filter_summaries
    );
    let keys = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(binds), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i32>(1)?,
                    r.get::<_, u32>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut report = ReconcileReport {
        recounted: 0,
        failed: 0,
    };
    for (sid, year, month) in keys {
        match on_event_recorded(conn, &sid, year, month) {
            Ok(_) => report.recounted += 1,
            Err(e) => {
                tracing::warn!(student_id = %sid, year, month, error = %e, "reconcile recount failed");
                report.failed += 1;
            }
        }
    }
    tracing::info!(
        recounted = report.recounted,
        failed = report.failed,
        "monthly summaries reconciled"
    );
    Ok(report)
}
