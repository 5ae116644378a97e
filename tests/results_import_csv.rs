mod test_support;

use serde_json::json;
use test_support::{error_code, request_err, request_ok, seed_class, select_workspace, spawn_sidecar};

#[test]
fn import_reports_bad_rows_and_commits_the_rest() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "schoold-import-partial");
    let seed = seed_class(&mut stdin, &mut reader, 3);

    // Student 2024003 already has a midterm result.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "pre",
        "results.create",
        json!({
            "studentId": seed.student_ids[2],
            "subjectId": seed.subject_id,
            "examType": "midterm",
            "marksObtained": 60
        }),
    );

    let csv_text = "roll_number,marks_obtained,total_marks\n\
                    2024001,85\n\
                    2024002,abc\n\
                    9999999,50\n\
                    2024003,70\n\
                    2024002,40,50\n";
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "imp",
        "results.importCsv",
        json!({
            "classId": seed.class_id,
            "subjectId": seed.subject_id,
            "examType": "midterm",
            "csvText": csv_text
        }),
    );
    assert_eq!(report["successCount"], json!(2));
    assert_eq!(report["errorCount"], json!(3));
    let errors: Vec<&str> = report["errors"]
        .as_array()
        .expect("errors array")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(
        errors,
        vec![
            "Line 3: Invalid marks format",
            "Line 4: Student with roll number 9999999 not found in selected class",
            "Line 5: Result already exists for Student 3",
        ]
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "results.list",
        json!({ "classId": seed.class_id, "examType": "midterm" }),
    );
    let rows = listed["results"].as_array().expect("results");
    assert_eq!(rows.len(), 3);
    let second = rows
        .iter()
        .find(|r| r["studentId"] == json!(seed.student_ids[1]))
        .expect("row for 2024002");
    assert_eq!(second["totalMarks"], json!("50"));
    assert_eq!(second["percentage"], json!("80.00"));
    assert_eq!(second["grade"], json!("A+"));
}

#[test]
fn import_uses_configured_total_and_error_limit() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "schoold-import-settings");
    let seed = seed_class(&mut stdin, &mut reader, 1);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "cfg",
        "setup.update",
        json!({
            "section": "results",
            "patch": { "defaultTotalMarks": 50, "bulkErrorLimit": 1 }
        }),
    );

    let csv_text = "roll_number,marks_obtained\n2024001,40\nnope,1\nnada,2\n";
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "imp",
        "results.importCsv",
        json!({
            "classId": seed.class_id,
            "subjectId": seed.subject_id,
            "examType": "quiz",
            "csvText": csv_text
        }),
    );
    assert_eq!(report["successCount"], json!(1));
    assert_eq!(report["errorCount"], json!(2));
    assert_eq!(report["errors"].as_array().map(|a| a.len()), Some(1));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "results.list",
        json!({ "studentId": seed.student_ids[0] }),
    );
    assert_eq!(listed.pointer("/results/0/percentage"), Some(&json!("80.00")));
}

#[test]
fn import_requires_known_class_and_template_has_header() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "schoold-import-template");
    let seed = seed_class(&mut stdin, &mut reader, 0);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "imp",
        "results.importCsv",
        json!({
            "classId": "missing",
            "subjectId": seed.subject_id,
            "examType": "final",
            "csvText": "roll_number,marks_obtained\n"
        }),
    );
    assert_eq!(error_code(&e), "not_found");

    let template = request_ok(&mut stdin, &mut reader, "tpl", "results.csvTemplate", json!({}));
    let text = template["csvText"].as_str().expect("csvText");
    assert!(text.starts_with("roll_number,marks_obtained\n"));
}
