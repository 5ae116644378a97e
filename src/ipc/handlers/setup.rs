use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, Section, UpdateError};
use serde_json::{json, Map, Value};

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut out = Map::new();
    for section in Section::ALL {
        match settings::load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = Section::parse(section_raw) else {
        return err(
            &req.id,
            "bad_params",
            "section must be one of: results, attendance",
            None,
        );
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    match settings::update_section(conn, section, patch) {
        Ok(v) => ok(&req.id, json!({ "section": section.name(), "value": v })),
        Err(UpdateError::Invalid(msg)) => err(
            &req.id,
            "bad_params",
            msg,
            Some(json!({ "section": section.name() })),
        ),
        Err(UpdateError::Storage(e)) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
