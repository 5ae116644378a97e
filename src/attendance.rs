//! Attendance events keyed by scope (class, subject, date, period).
//!
//! Counts are always recomputed from the stored events of a scope rather than
//! nudged up and down, so a replayed or corrected submission cannot drift them.

use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

use crate::calc;
use crate::db;
use crate::error::{is_unique_violation, EngineError, EngineResult};
use crate::roster;
use crate::rollup;

pub const MIN_PERIOD: i64 = 1;
pub const MAX_PERIOD: i64 = 6;
pub const MAX_REMARK_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "excused" => Some(Self::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub class_id: String,
    pub subject_id: String,
    pub date: NaiveDate,
    pub period: i64,
}

impl Scope {
    pub fn new(class_id: &str, subject_id: &str, date: NaiveDate, period: i64) -> EngineResult<Self> {
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&period) {
            return Err(EngineError::validation(
                "period",
                format!("must be between {} and {}", MIN_PERIOD, MAX_PERIOD),
            ));
        }
        Ok(Self {
            class_id: class_id.to_string(),
            subject_id: subject_id.to_string(),
            date,
            period,
        })
    }

    fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Status counts over some set of attendance events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub excused: i64,
}

impl Tally {
    pub fn percentage(&self) -> Decimal {
        calc::count_percentage(self.present, self.total)
    }
}

/// Counts events joined to their session, filtered by `where_sql`.
pub(crate) fn tally(conn: &Connection, where_sql: &str, binds: Vec<Value>) -> EngineResult<Tally> {
    let sql = format!(
        "SELECT
           COUNT(*),
           COALESCE(SUM(e.status = 'present'), 0),
           COALESCE(SUM(e.status = 'absent'), 0),
           COALESCE(SUM(e.status = 'late'), 0),
           COALESCE(SUM(e.status = 'excused'), 0)
         FROM attendance_events e
         JOIN attendance_sessions s ON s.id = e.session_id
         WHERE {}",
        where_sql
    );
    Ok(conn.query_row(&sql, params_from_iter(binds), |r| {
        Ok(Tally {
            total: r.get(0)?,
            present: r.get(1)?,
            absent: r.get(2)?,
            late: r.get(3)?,
            excused: r.get(4)?,
        })
    })?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSummary {
    pub session_id: Option<String>,
    pub total_students: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub excused_count: i64,
    pub percentage: Decimal,
}

impl ScopeSummary {
    fn from_tally(session_id: Option<String>, t: Tally) -> Self {
        Self {
            session_id,
            total_students: t.total,
            present_count: t.present,
            absent_count: t.absent,
            late_count: t.late,
            excused_count: t.excused,
            percentage: t.percentage(),
        }
    }
}

fn find_session(conn: &Connection, scope: &Scope) -> EngineResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM attendance_sessions
             WHERE class_id = ? AND subject_id = ? AND date = ? AND period = ?",
            (&scope.class_id, &scope.subject_id, scope.date_key(), scope.period),
            |r| r.get(0),
        )
        .optional()?)
}

fn get_or_create_session(conn: &Connection, scope: &Scope) -> EngineResult<String> {
    conn.execute(
        "INSERT INTO attendance_sessions(id, class_id, subject_id, date, period, created_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(class_id, subject_id, date, period) DO NOTHING",
        (
            db::new_id(),
            &scope.class_id,
            &scope.subject_id,
            scope.date_key(),
            scope.period,
            db::now_iso(),
        ),
    )?;
    find_session(conn, scope)?.ok_or(EngineError::NotFound("attendance session"))
}

fn summarize_session(conn: &Connection, session_id: &str) -> EngineResult<ScopeSummary> {
    let t = tally(
        conn,
        "e.session_id = ?",
        vec![Value::Text(session_id.to_string())],
    )?;
    Ok(ScopeSummary::from_tally(Some(session_id.to_string()), t))
}

fn require_scope_refs(conn: &Connection, scope: &Scope) -> EngineResult<()> {
    roster::require_class(conn, &scope.class_id)?;
    roster::require_subject(conn, &scope.subject_id)
}

fn require_member(conn: &Connection, scope: &Scope, student_id: &str) -> EngineResult<()> {
    let student = roster::get_student(conn, student_id)?;
    if student.class_id != scope.class_id {
        return Err(EngineError::validation(
            "studentId",
            format!("student {} is not in this class", student_id),
        ));
    }
    Ok(())
}

fn check_remarks(remarks: &str) -> EngineResult<()> {
    if remarks.chars().count() > MAX_REMARK_CHARS {
        return Err(EngineError::validation(
            "remarks",
            format!("must be at most {} characters", MAX_REMARK_CHARS),
        ));
    }
    Ok(())
}

/// Record or replace one student's status for a scope.
pub fn record_event(
    conn: &Connection,
    scope: &Scope,
    student_id: &str,
    status: AttendanceStatus,
    remarks: &str,
) -> EngineResult<ScopeSummary> {
    check_remarks(remarks)?;
    require_scope_refs(conn, scope)?;
    require_member(conn, scope, student_id)?;

    let tx = conn.unchecked_transaction()?;
    let session_id = get_or_create_session(&tx, scope)?;
    tx.execute(
        "INSERT INTO attendance_events(id, session_id, student_id, status, remarks, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(session_id, student_id) DO UPDATE SET
           status = excluded.status,
           remarks = excluded.remarks,
           updated_at = excluded.updated_at",
        (
            db::new_id(),
            &session_id,
            student_id,
            status.as_str(),
            remarks,
            db::now_iso(),
        ),
    )?;
    let summary = summarize_session(&tx, &session_id)?;
    tx.commit()?;

    rollup::after_commit(conn, student_id, scope.date.year(), scope.date.month());
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub student_id: String,
    pub status: Option<AttendanceStatus>,
    pub remarks: Option<String>,
}

impl RosterEntry {
    pub fn student(student_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            status: None,
            remarks: None,
        }
    }
}

/// Active students of the class, each taking the bulk default.
pub fn class_roster(conn: &Connection, class_id: &str) -> EngineResult<Vec<RosterEntry>> {
    Ok(roster::list_students(conn, class_id, true)?
        .iter()
        .map(|s| RosterEntry::student(&s.id))
        .collect())
}

/// Take attendance for a whole roster in one go.
///
/// A scope that already holds events is refused with `DuplicateScope`; nothing
/// is written unless every roster entry is accepted.
pub fn record_bulk(
    conn: &Connection,
    scope: &Scope,
    default_status: AttendanceStatus,
    default_remarks: &str,
    roster_entries: &[RosterEntry],
) -> EngineResult<ScopeSummary> {
    check_remarks(default_remarks)?;
    require_scope_refs(conn, scope)?;

    let tx = conn.unchecked_transaction()?;
    if let Some(session_id) = find_session(&tx, scope)? {
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM attendance_events WHERE session_id = ?",
            [&session_id],
            |r| r.get(0),
        )?;
        if existing > 0 {
            return Err(EngineError::DuplicateScope { session_id });
        }
    }

    let mut seen = HashSet::new();
    for entry in roster_entries {
        if !seen.insert(entry.student_id.as_str()) {
            return Err(EngineError::validation(
                "roster",
                format!("student {} listed twice", entry.student_id),
            ));
        }
        require_member(&tx, scope, &entry.student_id)?;
        if let Some(remarks) = &entry.remarks {
            check_remarks(remarks)?;
        }
    }

    let session_id = get_or_create_session(&tx, scope)?;
    let now = db::now_iso();
    for entry in roster_entries {
        let status = entry.status.unwrap_or(default_status);
        let remarks = entry.remarks.as_deref().unwrap_or(default_remarks);
        if let Err(e) = tx.execute(
            "INSERT INTO attendance_events(id, session_id, student_id, status, remarks, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                db::new_id(),
                &session_id,
                &entry.student_id,
                status.as_str(),
                remarks,
                &now,
            ),
        ) {
            if is_unique_violation(&e) {
                return Err(EngineError::DuplicateScope { session_id });
            }
            return Err(e.into());
        }
    }
    let summary = summarize_session(&tx, &session_id)?;
    tx.commit()?;

    tracing::info!(
        class_id = %scope.class_id,
        subject_id = %scope.subject_id,
        date = %scope.date,
        period = scope.period,
        students = roster_entries.len(),
        "bulk attendance recorded"
    );
    for entry in roster_entries {
        rollup::after_commit(conn, &entry.student_id, scope.date.year(), scope.date.month());
    }
    Ok(summary)
}

/// Counts for a scope; an untouched scope reports all zeros.
pub fn summarize(conn: &Connection, scope: &Scope) -> EngineResult<ScopeSummary> {
    match find_session(conn, scope)? {
        Some(session_id) => summarize_session(conn, &session_id),
        None => Ok(ScopeSummary::from_tally(None, Tally::default())),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeEvent {
    pub student_id: String,
    pub roll_number: String,
    pub name: String,
    pub status: String,
    pub remarks: String,
}

pub fn scope_detail(
    conn: &Connection,
    scope: &Scope,
) -> EngineResult<(ScopeSummary, Vec<ScopeEvent>)> {
    let session_id =
        find_session(conn, scope)?.ok_or(EngineError::NotFound("attendance session"))?;
    let mut stmt = conn.prepare(
        "SELECT e.student_id, st.roll_number, st.name, e.status, e.remarks
         FROM attendance_events e
         JOIN students st ON st.id = e.student_id
         WHERE e.session_id = ?
         ORDER BY CAST(st.roll_number AS INTEGER), st.roll_number, st.name",
    )?;
    let events = stmt
        .query_map([&session_id], |r| {
            Ok(ScopeEvent {
                student_id: r.get(0)?,
                roll_number: r.get(1)?,
                name: r.get(2)?,
                status: r.get(3)?,
                remarks: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((summarize_session(conn, &session_id)?, events))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub class_id: String,
    pub subject_id: String,
    pub date: String,
    pub period: i64,
    pub status: String,
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentHistory {
    pub student_id: String,
    pub total_classes: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub excused_count: i64,
    pub percentage: Decimal,
    pub entries: Vec<HistoryEntry>,
}

fn period_filter(year: Option<i32>, month: Option<u32>) -> (String, Vec<Value>) {
    match (year, month) {
        (Some(y), Some(m)) => (
            " AND substr(s.date, 1, 7) = ?".to_string(),
            vec![Value::Text(format!("{:04}-{:02}", y, m))],
        ),
        (Some(y), None) => (
            " AND substr(s.date, 1, 4) = ?".to_string(),
            vec![Value::Text(format!("{:04}", y))],
        ),
        (None, Some(m)) => (
            " AND substr(s.date, 6, 2) = ?".to_string(),
            vec![Value::Text(format!("{:02}", m))],
        ),
        (None, None) => (String::new(), Vec::new()),
    }
}

/// A student's attendance, newest first, optionally narrowed to a year and/or
/// month. Totals cover the same narrowed set as the entries.
pub fn student_history(
    conn: &Connection,
    student_id: &str,
    year: Option<i32>,
    month: Option<u32>,
) -> EngineResult<StudentHistory> {
    roster::get_student(conn, student_id)?;
    let (extra_sql, extra_binds) = period_filter(year, month);

    let mut binds = vec![Value::Text(student_id.to_string())];
    binds.extend(extra_binds);
    let t = tally(conn, &format!("e.student_id = ?{}", extra_sql), binds.clone())?;

    let sql = format!(
        "SELECT s.class_id, s.subject_id, s.date, s.period, e.status, e.remarks
         FROM attendance_events e
         JOIN attendance_sessions s ON s.id = e.session_id
         WHERE e.student_id = ?{}
         ORDER BY s.date DESC, s.period DESC",
        extra_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(HistoryEntry {
                class_id: r.get(0)?,
                subject_id: r.get(1)?,
                date: r.get(2)?,
                period: r.get(3)?,
                status: r.get(4)?,
                remarks: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StudentHistory {
        student_id: student_id.to_string(),
        total_classes: t.total,
        present_count: t.present,
        absent_count: t.absent,
        late_count: t.late,
        excused_count: t.excused,
        percentage: t.percentage(),
        entries,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMonthRow {
    pub student_id: String,
    pub roll_number: String,
    pub name: String,
    pub total_classes: i64,
    pub present_count: i64,
    pub percentage: Decimal,
}

/// Per active student totals for one class in one month.
pub fn class_month(
    conn: &Connection,
    class_id: &str,
    year: i32,
    month: u32,
) -> EngineResult<Vec<ClassMonthRow>> {
    roster::require_class(conn, class_id)?;
    let month_key = format!("{:04}-{:02}", year, month);
    let mut rows = Vec::new();
    for s in roster::list_students(conn, class_id, true)? {
        let t = tally(
            conn,
            "e.student_id = ? AND substr(s.date, 1, 7) = ?",
            vec![Value::Text(s.id.clone()), Value::Text(month_key.clone())],
        )?;
        rows.push(ClassMonthRow {
            student_id: s.id,
            roll_number: s.roll_number,
            name: s.name,
            total_classes: t.total,
            present_count: t.present,
            percentage: t.percentage(),
        });
    }
    Ok(rows)
}
