use rusqlite::Connection;
use serde_json::{json, Value};

use crate::error::EngineResult;
use crate::ipc::helpers::{opt_str, req_str, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::roster;

fn classes_list(conn: &Connection, _req: &Request) -> EngineResult<Value> {
    Ok(json!({ "classes": roster::list_classes(conn)? }))
}

fn classes_create(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let class = roster::create_class(
        conn,
        req_str(req, "name")?,
        opt_str(req, "section").unwrap_or(""),
    )?;
    Ok(json!({ "class": class }))
}

fn subjects_list(conn: &Connection, _req: &Request) -> EngineResult<Value> {
    Ok(json!({ "subjects": roster::list_subjects(conn)? }))
}

fn subjects_create(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let subject = roster::create_subject(conn, req_str(req, "name")?, req_str(req, "code")?)?;
    Ok(json!({ "subject": subject }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(with_conn(state, req, classes_list)),
        "classes.create" => Some(with_conn(state, req, classes_create)),
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        _ => None,
    }
}
