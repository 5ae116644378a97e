use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db;
use crate::error::{is_unique_violation, EngineError, EngineResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub section: String,
    pub student_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub roll_number: String,
    pub name: String,
    pub active: bool,
}

const STUDENT_COLUMNS: &str = "id, class_id, roll_number, name, active";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        class_id: r.get(1)?,
        roll_number: r.get(2)?,
        name: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
    })
}

fn non_empty(field: &str, value: &str) -> EngineResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(EngineError::validation(field, "must not be empty"));
    }
    Ok(t.to_string())
}

pub fn create_class(conn: &Connection, name: &str, section: &str) -> EngineResult<Class> {
    let name = non_empty("name", name)?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO classes(id, name, section, created_at) VALUES(?, ?, ?, ?)",
        (&id, &name, section.trim(), db::now_iso()),
    )?;
    Ok(Class {
        id,
        name,
        section: section.trim().to_string(),
        student_count: 0,
    })
}

pub fn list_classes(conn: &Connection) -> EngineResult<Vec<Class>> {
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.section,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
         FROM classes c
         ORDER BY c.name, c.section",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Class {
                id: r.get(0)?,
                name: r.get(1)?,
                section: r.get(2)?,
                student_count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn require_class(conn: &Connection, class_id: &str) -> EngineResult<()> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()?
    .map(|_| ())
    .ok_or(EngineError::NotFound("class"))
}

pub fn create_subject(conn: &Connection, name: &str, code: &str) -> EngineResult<Subject> {
    let name = non_empty("name", name)?;
    let code = non_empty("code", code)?;
    let id = db::new_id();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, name, code, created_at) VALUES(?, ?, ?, ?)",
        (&id, &name, &code, db::now_iso()),
    ) {
        if is_unique_violation(&e) {
            let existing_id = conn
                .query_row("SELECT id FROM subjects WHERE code = ?", [&code], |r| {
                    r.get(0)
                })
                .optional()?;
            return Err(EngineError::DuplicateRecord {
                entity: "subject",
                existing_id,
            });
        }
        return Err(e.into());
    }
    Ok(Subject { id, name, code })
}

pub fn list_subjects(conn: &Connection) -> EngineResult<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name, code FROM subjects ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                code: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn require_subject(conn: &Connection, subject_id: &str) -> EngineResult<()> {
    conn.query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()?
    .map(|_| ())
    .ok_or(EngineError::NotFound("subject"))
}

pub fn create_student(
    conn: &Connection,
    class_id: &str,
    roll_number: &str,
    name: &str,
) -> EngineResult<Student> {
    require_class(conn, class_id)?;
    let roll_number = non_empty("rollNumber", roll_number)?;
    let name = non_empty("name", name)?;
    let id = db::new_id();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, class_id, roll_number, name, active, created_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        (&id, class_id, &roll_number, &name, db::now_iso()),
    ) {
        if is_unique_violation(&e) {
            let existing_id = find_student_by_roll(conn, class_id, &roll_number)?.map(|s| s.id);
            return Err(EngineError::DuplicateRecord {
                entity: "student",
                existing_id,
            });
        }
        return Err(e.into());
    }
    Ok(Student {
        id,
        class_id: class_id.to_string(),
        roll_number,
        name,
        active: true,
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> EngineResult<Student> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    conn.query_row(&sql, [student_id], student_from_row)
        .optional()?
        .ok_or(EngineError::NotFound("student"))
}

pub fn find_student_by_roll(
    conn: &Connection,
    class_id: &str,
    roll_number: &str,
) -> EngineResult<Option<Student>> {
    let sql = format!(
        "SELECT {} FROM students WHERE class_id = ? AND roll_number = ?",
        STUDENT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, (class_id, roll_number.trim()), student_from_row)
        .optional()?)
}

/// Students of a class; `active_only` yields the attendance roster.
pub fn list_students(
    conn: &Connection,
    class_id: &str,
    active_only: bool,
) -> EngineResult<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students WHERE class_id = ? {} ORDER BY CAST(roll_number AS INTEGER), roll_number, name",
        STUDENT_COLUMNS,
        if active_only { "AND active = 1" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([class_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_student_active(conn: &Connection, student_id: &str, active: bool) -> EngineResult<()> {
    let changed = conn.execute(
        "UPDATE students SET active = ? WHERE id = ?",
        (active as i64, student_id),
    )?;
    if changed == 0 {
        return Err(EngineError::NotFound("student"));
    }
    Ok(())
}
