use rusqlite::Connection;
use serde_json::{json, Value};

use crate::academic;
use crate::error::EngineResult;
use crate::ipc::helpers::{req_date, req_str, with_conn};
use crate::ipc::types::{AppState, Request};

fn years_create(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let year = academic::create_year(
        conn,
        req_str(req, "year")?,
        req_date(req, "startDate")?,
        req_date(req, "endDate")?,
    )?;
    Ok(json!({ "academicYear": year }))
}

fn years_list(conn: &Connection, _req: &Request) -> EngineResult<Value> {
    Ok(json!({ "academicYears": academic::list_years(conn)? }))
}

fn years_activate(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let year_id = req_str(req, "yearId")?;
    academic::activate_year(conn, year_id)?;
    Ok(json!({ "activeYearId": year_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "academicYears.create" => Some(with_conn(state, req, years_create)),
        "academicYears.list" => Some(with_conn(state, req, years_list)),
        "academicYears.activate" => Some(with_conn(state, req, years_activate)),
        _ => None,
    }
}
