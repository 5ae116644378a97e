use rusqlite::Connection;
use serde_json::{json, Value};

use crate::error::{EngineError, EngineResult};
use crate::ipc::helpers::{opt_bool, req_str, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::roster;

fn students_list(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let class_id = req_str(req, "classId")?;
    roster::require_class(conn, class_id)?;
    let active_only = opt_bool(req, "activeOnly")?.unwrap_or(false);
    Ok(json!({ "students": roster::list_students(conn, class_id, active_only)? }))
}

fn students_create(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let student = roster::create_student(
        conn,
        req_str(req, "classId")?,
        req_str(req, "rollNumber")?,
        req_str(req, "name")?,
    )?;
    Ok(json!({ "student": student }))
}

fn students_set_active(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let student_id = req_str(req, "studentId")?;
    let active = opt_bool(req, "active")?
        .ok_or_else(|| EngineError::validation("active", "is required"))?;
    roster::set_student_active(conn, student_id, active)?;
    Ok(json!({ "studentId": student_id, "active": active }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.setActive" => Some(with_conn(state, req, students_set_active)),
        _ => None,
    }
}
