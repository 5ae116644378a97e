use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::attendance::Scope;
use crate::calc;
use crate::error::{EngineError, EngineResult};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};

pub type Handler = fn(&Connection, &Request) -> EngineResult<Value>;

/// Run `f` against the open workspace and wrap its outcome in a response.
pub fn with_conn(state: &AppState, req: &Request, f: Handler) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn missing(key: &str) -> EngineError {
    EngineError::validation(key, "is required")
}

pub fn opt_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn req_str<'a>(req: &'a Request, key: &str) -> EngineResult<&'a str> {
    opt_str(req, key).ok_or_else(|| missing(key))
}

pub fn opt_decimal(req: &Request, key: &str) -> EngineResult<Option<Decimal>> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => calc::decimal_from_json(v)
            .map(Some)
            .ok_or_else(|| EngineError::validation(key, "must be a number")),
    }
}

pub fn req_decimal(req: &Request, key: &str) -> EngineResult<Decimal> {
    opt_decimal(req, key)?.ok_or_else(|| missing(key))
}

pub fn opt_i64(req: &Request, key: &str) -> EngineResult<Option<i64>> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| EngineError::validation(key, "must be an integer")),
    }
}

pub fn req_i64(req: &Request, key: &str) -> EngineResult<i64> {
    opt_i64(req, key)?.ok_or_else(|| missing(key))
}

pub fn opt_bool(req: &Request, key: &str) -> EngineResult<Option<bool>> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| EngineError::validation(key, "must be a boolean")),
    }
}

/// Calendar date in `YYYY-MM-DD` form.
pub fn req_date(req: &Request, key: &str) -> EngineResult<NaiveDate> {
    let raw = req_str(req, key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::validation(key, "expected YYYY-MM-DD"))
}

pub fn opt_year(req: &Request) -> EngineResult<Option<i32>> {
    match opt_i64(req, "year")? {
        None => Ok(None),
        Some(y) if (1..=9999).contains(&y) => Ok(Some(y as i32)),
        Some(_) => Err(EngineError::validation("year", "must be between 1 and 9999")),
    }
}

pub fn opt_month(req: &Request) -> EngineResult<Option<u32>> {
    match opt_i64(req, "month")? {
        None => Ok(None),
        Some(m) if (1..=12).contains(&m) => Ok(Some(m as u32)),
        Some(_) => Err(EngineError::validation("month", "must be between 1 and 12")),
    }
}

pub fn req_year_month(req: &Request) -> EngineResult<(i32, u32)> {
    let year = opt_year(req)?.ok_or_else(|| missing("year"))?;
    let month = opt_month(req)?.ok_or_else(|| missing("month"))?;
    Ok((year, month))
}

/// `classId`, `subjectId`, `date` and `period` from params.
pub fn scope(req: &Request) -> EngineResult<Scope> {
    Scope::new(
        req_str(req, "classId")?,
        req_str(req, "subjectId")?,
        req_date(req, "date")?,
        req_i64(req, "period")?,
    )
}
