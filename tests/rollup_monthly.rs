mod test_support;

use serde_json::json;
use test_support::{
    db_path, error_code, i64_at, request_err, request_ok, seed_class, select_workspace,
    spawn_sidecar,
};

#[test]
fn may_events_fold_into_one_summary() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "schoold-rollup-may");
    let seed = seed_class(&mut stdin, &mut reader, 1);
    let student = &seed.student_ids[0];

    // Out of order on purpose.
    let plan = [
        ("2024-05-20", "present"),
        ("2024-05-02", "absent"),
        ("2024-05-09", "present"),
    ];
    for (i, (date, status)) in plan.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "attendance.recordEvent",
            json!({
                "classId": seed.class_id,
                "subjectId": seed.subject_id,
                "date": date,
                "period": 1,
                "studentId": student,
                "status": status
            }),
        );
    }

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "g",
        "rollup.get",
        json!({ "studentId": student, "year": 2024, "month": 5 }),
    );
    assert_eq!(i64_at(&got, "/summary/totalDays"), 3);
    assert_eq!(i64_at(&got, "/summary/presentDays"), 2);
    assert_eq!(i64_at(&got, "/summary/absentDays"), 1);
    assert_eq!(i64_at(&got, "/summary/lateDays"), 0);
    assert_eq!(got.pointer("/summary/attendancePercentage"), Some(&json!("66.67")));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "l",
        "rollup.listForStudent",
        json!({ "studentId": student, "year": 2024 }),
    );
    assert_eq!(listed["summaries"].as_array().map(|a| a.len()), Some(1));

    let none = request_err(
        &mut stdin,
        &mut reader,
        "n",
        "rollup.get",
        json!({ "studentId": student, "year": 2024, "month": 6 }),
    );
    assert_eq!(error_code(&none), "not_found");
}

#[test]
fn reconcile_repairs_drifted_rows() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "schoold-rollup-reconcile");
    let seed = seed_class(&mut stdin, &mut reader, 2);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "bulk",
        "attendance.recordBulk",
        json!({
            "classId": seed.class_id,
            "subjectId": seed.subject_id,
            "date": "2024-09-10",
            "period": 1
        }),
    );

    {
        let conn = rusqlite::Connection::open(db_path(&workspace)).expect("open db");
        conn.execute(
            "UPDATE monthly_summaries SET total_days = 7, present_days = 0, attendance_percentage = '0.00'",
            [],
        )
        .expect("drift summaries");
    }

    let report = request_ok(&mut stdin, &mut reader, "r", "rollup.reconcile", json!({}));
    assert_eq!(report["recounted"], json!(2));
    assert_eq!(report["failed"], json!(0));

    let conn = rusqlite::Connection::open(db_path(&workspace)).expect("open db");
    let rows: Vec<(i64, i64, String)> = {
        let mut stmt = conn
            .prepare(
                "SELECT total_days, present_days, attendance_percentage
                 FROM monthly_summaries ORDER BY student_id",
            )
            .expect("prepare");
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("rows");
        rows
    };
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row, (1, 1, "100.00".to_string()));
    }
}

#[test]
fn summary_rows_are_unique_per_student_month() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "schoold-rollup-unique");
    let seed = seed_class(&mut stdin, &mut reader, 1);

    for (i, period) in [1, 2, 3].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "attendance.recordEvent",
            json!({
                "classId": seed.class_id,
                "subjectId": seed.subject_id,
                "date": "2024-10-01",
                "period": period,
                "studentId": seed.student_ids[0],
                "status": "late"
            }),
        );
    }

    let conn = rusqlite::Connection::open(db_path(&workspace)).expect("open db");
    let (count, total, late): (i64, i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), SUM(total_days), SUM(late_days) FROM monthly_summaries",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .expect("summary row");
    assert_eq!((count, total, late), (1, 3, 3));
}
