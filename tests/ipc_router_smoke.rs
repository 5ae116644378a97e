mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schoold-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let e = request_err(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    assert_eq!(error_code(&e), "no_workspace");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("school.sqlite3").exists());

    // Every family answers something other than not_implemented.
    let methods = [
        ("classes.list", json!({})),
        ("subjects.list", json!({})),
        ("students.list", json!({ "classId": "missing" })),
        ("setup.get", json!({})),
        ("gradeTable.get", json!({})),
        ("results.list", json!({})),
        ("results.csvTemplate", json!({})),
        ("results.stats", json!({})),
        (
            "attendance.summarize",
            json!({ "classId": "c", "subjectId": "s", "date": "2024-05-01", "period": 1 }),
        ),
        ("rollup.reconcile", json!({})),
        ("academicYears.list", json!({})),
    ];
    for (i, (method, params)) in methods.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("m{}", i), method, params);
        let code = resp
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        assert_ne!(code, "not_implemented", "{} not routed", method);
    }

    let e = request_err(&mut stdin, &mut reader, "4", "grades.explode", json!({}));
    assert_eq!(error_code(&e), "not_implemented");
}

#[test]
fn malformed_line_answers_bad_json_and_keeps_serving() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("response is json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_json")
    );

    let _ = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));
}
