use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::db;
use crate::error::{is_unique_violation, EngineError, EngineResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub year: String,
    pub start_date: String,
    pub end_date: String,
    pub is_active: bool,
}

fn year_from_row(r: &Row<'_>) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id: r.get(0)?,
        year: r.get(1)?,
        start_date: r.get(2)?,
        end_date: r.get(3)?,
        is_active: r.get::<_, i64>(4)? != 0,
    })
}

/// Label must read `YYYY-YYYY` with consecutive years.
fn validate_label(label: &str) -> EngineResult<String> {
    let t = label.trim();
    let bad = || EngineError::validation("year", "expected YYYY-YYYY");
    let (a, b) = t.split_once('-').ok_or_else(bad)?;
    if a.len() != 4 || b.len() != 4 {
        return Err(bad());
    }
    let start = a.parse::<i32>().map_err(|_| bad())?;
    let end = b.parse::<i32>().map_err(|_| bad())?;
    if end != start + 1 {
        return Err(EngineError::validation(
            "year",
            "second year must follow the first",
        ));
    }
    Ok(t.to_string())
}

pub fn create_year(
    conn: &Connection,
    label: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> EngineResult<AcademicYear> {
    let year = validate_label(label)?;
    if end_date <= start_date {
        return Err(EngineError::validation(
            "endDate",
            "must be after startDate",
        ));
    }
    let id = db::new_id();
    if let Err(e) = conn.execute(
        "INSERT INTO academic_years(id, year, start_date, end_date, is_active, created_at)
         VALUES(?, ?, ?, ?, 0, ?)",
        (
            &id,
            &year,
            start_date.to_string(),
            end_date.to_string(),
            db::now_iso(),
        ),
    ) {
        if is_unique_violation(&e) {
            return Err(EngineError::DuplicateRecord {
                entity: "academic year",
                existing_id: None,
            });
        }
        return Err(e.into());
    }
    Ok(AcademicYear {
        id,
        year,
        start_date: start_date.to_string(),
        end_date: end_date.to_string(),
        is_active: false,
    })
}

pub fn list_years(conn: &Connection) -> EngineResult<Vec<AcademicYear>> {
    let mut stmt = conn.prepare(
        "SELECT id, year, start_date, end_date, is_active FROM academic_years ORDER BY year DESC",
    )?;
    let rows = stmt
        .query_map([], year_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Make `year_id` the only active year. Both updates share one transaction so
/// readers never see zero or two active years.
pub fn activate_year(conn: &Connection, year_id: &str) -> EngineResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE academic_years SET is_active = 0 WHERE is_active = 1", [])?;
    let changed = tx.execute(
        "UPDATE academic_years SET is_active = 1 WHERE id = ?",
        [year_id],
    )?;
    if changed == 0 {
        return Err(EngineError::NotFound("academic year"));
    }
    tx.commit()?;
    tracing::info!(year_id, "academic year activated");
    Ok(())
}
