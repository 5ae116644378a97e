use rusqlite::Connection;
use serde_json::{json, Value};

use crate::attendance::{self, AttendanceStatus, RosterEntry};
use crate::error::{EngineError, EngineResult};
use crate::ipc::helpers::{
    opt_month, opt_str, opt_year, req_str, req_year_month, scope, with_conn, Handler,
};
use crate::ipc::types::{AppState, Request};
use crate::settings;

fn status(field: &str, raw: &str) -> EngineResult<AttendanceStatus> {
    AttendanceStatus::parse(raw).ok_or_else(|| {
        EngineError::validation(field, "must be one of: present, absent, late, excused")
    })
}

fn roster_entries(conn: &Connection, req: &Request, class_id: &str) -> EngineResult<Vec<RosterEntry>> {
    let Some(raw) = req.params.get("roster").filter(|v| !v.is_null()) else {
        return attendance::class_roster(conn, class_id);
    };
    let items = raw
        .as_array()
        .ok_or_else(|| EngineError::validation("roster", "must be an array"))?;

    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let entry = match item {
            Value::String(id) => RosterEntry::student(id),
            Value::Object(obj) => {
                let student_id = obj
                    .get("studentId")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        EngineError::validation("roster", format!("entry {} missing studentId", i))
                    })?;
                let status = match obj.get("status").and_then(|v| v.as_str()) {
                    Some(s) => Some(status("roster.status", s)?),
                    None => None,
                };
                RosterEntry {
                    student_id: student_id.to_string(),
                    status,
                    remarks: obj
                        .get("remarks")
                        .and_then(|v| v.as_str())
                        .map(|s| s.trim().to_string()),
                }
            }
            _ => {
                return Err(EngineError::validation(
                    "roster",
                    format!("entry {} must be a student id or an object", i),
                ))
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}

fn attendance_record_event(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let scope = scope(req)?;
    let student_id = req_str(req, "studentId")?;
    let status = status("status", req_str(req, "status")?)?;
    let remarks = opt_str(req, "remarks").unwrap_or("").trim();
    let summary = attendance::record_event(conn, &scope, student_id, status, remarks)?;
    Ok(json!({ "summary": summary }))
}

fn attendance_record_bulk(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let scope = scope(req)?;
    let cfg = settings::attendance_settings(conn)?;
    let default_status = match opt_str(req, "defaultStatus") {
        Some(s) => status("defaultStatus", s)?,
        None => cfg.bulk_default_status,
    };
    let remarks = opt_str(req, "remarks")
        .map(|s| s.trim().to_string())
        .unwrap_or(cfg.bulk_remark);
    let entries = roster_entries(conn, req, &scope.class_id)?;
    let summary = attendance::record_bulk(conn, &scope, default_status, &remarks, &entries)?;
    Ok(json!({ "summary": summary }))
}

fn attendance_summarize(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let scope = scope(req)?;
    Ok(json!({ "summary": attendance::summarize(conn, &scope)? }))
}

fn attendance_scope_detail(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let scope = scope(req)?;
    let (summary, events) = attendance::scope_detail(conn, &scope)?;
    Ok(json!({ "scope": scope, "summary": summary, "events": events }))
}

fn attendance_student_history(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let history = attendance::student_history(
        conn,
        req_str(req, "studentId")?,
        opt_year(req)?,
        opt_month(req)?,
    )?;
    Ok(json!(history))
}

fn attendance_class_month(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let class_id = req_str(req, "classId")?;
    let (year, month) = req_year_month(req)?;
    let rows = attendance::class_month(conn, class_id, year, month)?;
    Ok(json!({ "classId": class_id, "year": year, "month": month, "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "attendance.recordEvent" => attendance_record_event,
        "attendance.recordBulk" => attendance_record_bulk,
        "attendance.summarize" => attendance_summarize,
        "attendance.scopeDetail" => attendance_scope_detail,
        "attendance.studentHistory" => attendance_student_history,
        "attendance.classMonth" => attendance_class_month,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
