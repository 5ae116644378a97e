mod test_support;

use serde_json::json;
use test_support::{error_code, request_err, request_ok, select_workspace, spawn_sidecar};

#[test]
fn setup_defaults_and_updates_persist() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "schoold-setup-sections");

    let defaults = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(defaults.pointer("/results/defaultTotalMarks"), Some(&json!(100)));
    assert_eq!(defaults.pointer("/results/bulkErrorLimit"), Some(&json!(10)));
    assert_eq!(
        defaults.pointer("/attendance/bulkDefaultStatus"),
        Some(&json!("present"))
    );
    assert_eq!(
        defaults.pointer("/attendance/bulkRemark"),
        Some(&json!("bulk entry"))
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({
            "section": "attendance",
            "patch": { "bulkDefaultStatus": "Late", "bulkRemark": "assembly" }
        }),
    );
    assert_eq!(updated.pointer("/value/bulkDefaultStatus"), Some(&json!("late")));

    // Reopening the workspace keeps the saved section.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let reread = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(reread.pointer("/attendance/bulkRemark"), Some(&json!("assembly")));
    assert_eq!(reread.pointer("/results/bulkErrorLimit"), Some(&json!(10)));
}

#[test]
fn setup_rejects_invalid_patches() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "schoold-setup-invalid");

    let cases = [
        json!({ "section": "results", "patch": { "bulkErrorLimit": 0 } }),
        json!({ "section": "results", "patch": { "bulkErrorLimit": 101 } }),
        json!({ "section": "results", "patch": { "defaultTotalMarks": 0 } }),
        json!({ "section": "results", "patch": { "defaultTotalMarks": 1000 } }),
        json!({ "section": "results", "patch": { "defaultTotalMarks": "100.125" } }),
        json!({ "section": "results", "patch": { "colour": "blue" } }),
        json!({ "section": "attendance", "patch": { "bulkDefaultStatus": "asleep" } }),
        json!({ "section": "attendance", "patch": { "bulkRemark": "x".repeat(201) } }),
        json!({ "section": "printer", "patch": {} }),
        json!({ "section": "results", "patch": 5 }),
    ];
    for (i, params) in cases.into_iter().enumerate() {
        let e = request_err(&mut stdin, &mut reader, &format!("c{}", i), "setup.update", params);
        assert_eq!(error_code(&e), "bad_params");
    }

    let unchanged = request_ok(&mut stdin, &mut reader, "g", "setup.get", json!({}));
    assert_eq!(unchanged.pointer("/results/bulkErrorLimit"), Some(&json!(10)));
}
