use rusqlite::Connection;
use serde_json::{json, Value};

use crate::error::{EngineError, EngineResult};
use crate::ipc::helpers::{opt_str, opt_year, req_str, req_year_month, with_conn, Handler};
use crate::ipc::types::{AppState, Request};
use crate::rollup;
use crate::roster;

fn rollup_get(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let student_id = req_str(req, "studentId")?;
    let (year, month) = req_year_month(req)?;
    let summary = rollup::get_summary(conn, student_id, year, month)?
        .ok_or(EngineError::NotFound("monthly summary"))?;
    Ok(json!({ "summary": summary }))
}

fn rollup_list_for_student(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let student_id = req_str(req, "studentId")?;
    roster::get_student(conn, student_id)?;
    let summaries = rollup::list_for_student(conn, student_id, opt_year(req)?)?;
    Ok(json!({ "studentId": student_id, "summaries": summaries }))
}

fn rollup_reconcile(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let student_id = opt_str(req, "studentId");
    if let Some(id) = student_id {
        roster::get_student(conn, id)?;
    }
    Ok(json!(rollup::reconcile(conn, student_id)?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "rollup.get" => rollup_get,
        "rollup.listForStudent" => rollup_list_for_student,
        "rollup.reconcile" => rollup_reconcile,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
