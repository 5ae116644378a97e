use serde_json::json;

use crate::error::EngineError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Engine failures carry their own wire code and details.
pub fn engine_err(id: &str, e: &EngineError) -> serde_json::Value {
    if let EngineError::Storage(_) | EngineError::Settings(_) = e {
        tracing::error!(request_id = id, error = %e, "storage failure");
    }
    err(id, e.code(), e.to_string(), e.details())
}
