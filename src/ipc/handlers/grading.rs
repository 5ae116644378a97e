use rusqlite::Connection;
use serde_json::{json, Value};

use crate::error::{EngineError, EngineResult};
use crate::grading::{self, GradeBand};
use crate::ipc::helpers::{opt_bool, req_decimal, with_conn};
use crate::ipc::types::{AppState, Request};

fn grade_table_get(conn: &Connection, _req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    Ok(json!({ "bands": table.bands() }))
}

fn grade_table_set(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let raw = req
        .params
        .get("bands")
        .cloned()
        .ok_or_else(|| EngineError::validation("bands", "is required"))?;
    let bands: Vec<GradeBand> = serde_json::from_value(raw)
        .map_err(|e| EngineError::validation("bands", e.to_string()))?;
    let recompute = opt_bool(req, "recompute")?.unwrap_or(false);

    let (table, outcome) = grading::replace_table(conn, bands, recompute)?;
    Ok(json!({
        "bands": table.bands(),
        "recomputedResults": outcome.recomputed_results
    }))
}

fn grade_table_resolve(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let percentage = req_decimal(req, "percentage")?;
    let table = grading::load_table(conn)?;
    let band = table.resolve(percentage)?;
    Ok(json!({ "grade": band.grade, "gpa": band.gpa }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradeTable.get" => Some(with_conn(state, req, grade_table_get)),
        "gradeTable.set" => Some(with_conn(state, req, grade_table_set)),
        "gradeTable.resolve" => Some(with_conn(state, req, grade_table_resolve)),
        _ => None,
    }
}
