//! Exam results: marks in, percentage/grade/gpa out.
//!
//! Derived columns are written only by [`compute`] inside the same transaction
//! as the marks that produced them; nothing else in the crate updates them.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

use crate::calc;
use crate::db;
use crate::error::{is_unique_violation, EngineError, EngineResult};
use crate::grading::GradeTable;
use crate::roster::{self, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Midterm,
    Final,
    Quiz,
    Assignment,
}

impl ExamType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midterm" => Some(Self::Midterm),
            "final" => Some(Self::Final),
            "quiz" => Some(Self::Quiz),
            "assignment" => Some(Self::Assignment),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Midterm => "midterm",
            Self::Final => "final",
            Self::Quiz => "quiz",
            Self::Assignment => "assignment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedResult {
    pub percentage: Decimal,
    pub grade: String,
    pub gpa: Decimal,
}

/// Percentage (2 dp, half-up) plus the band it lands in.
///
/// Marks above the total are rejected rather than clamped.
pub fn compute(
    table: &GradeTable,
    marks_obtained: Decimal,
    total_marks: Decimal,
) -> EngineResult<ComputedResult> {
    let invalid = |reason: &str| EngineError::InvalidMarks {
        reason: reason.to_string(),
        marks_obtained,
        total_marks,
    };
    if marks_obtained < Decimal::ZERO {
        return Err(invalid("marks obtained must be >= 0"));
    }
    if total_marks < Decimal::ONE {
        return Err(invalid("total marks must be >= 1"));
    }
    if !calc::is_storable_mark(marks_obtained) || !calc::is_storable_mark(total_marks) {
        return Err(invalid(
            "marks must not exceed 999.99 or carry more than 2 decimal places",
        ));
    }
    if marks_obtained > total_marks {
        return Err(invalid("marks obtained must not exceed total marks"));
    }

    let percentage = calc::percentage(marks_obtained, total_marks)
        .ok_or_else(|| invalid("percentage does not fit in a decimal"))?;
    let band = table.resolve(percentage)?;
    let mut gpa = band.gpa;
    gpa.rescale(2);
    Ok(ComputedResult {
        percentage,
        grade: band.grade.clone(),
        gpa,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub exam_type: String,
    pub marks_obtained: Decimal,
    pub total_marks: Decimal,
    pub percentage: Decimal,
    pub grade: String,
    pub gpa: Decimal,
    pub remarks: String,
    pub created_at: String,
    pub updated_at: String,
}

const RESULT_COLUMNS: &str = "id, student_id, class_id, subject_id, exam_type,
    marks_obtained, total_marks, percentage, grade, gpa, remarks, created_at, updated_at";

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    Ok(ResultRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_id: r.get(2)?,
        subject_id: r.get(3)?,
        exam_type: r.get(4)?,
        marks_obtained: db::decimal_at(r, 5)?,
        total_marks: db::decimal_at(r, 6)?,
        percentage: db::decimal_at(r, 7)?,
        grade: r.get(8)?,
        gpa: db::decimal_at(r, 9)?,
        remarks: r.get(10)?,
        created_at: r.get(11)?,
        updated_at: r.get(12)?,
    })
}

#[derive(Debug, Clone)]
pub struct ResultInput {
    pub student_id: String,
    pub subject_id: String,
    pub exam_type: ExamType,
    pub marks_obtained: Decimal,
    pub total_marks: Decimal,
    pub remarks: String,
}

fn existing_result_id(
    conn: &Connection,
    student_id: &str,
    subject_id: &str,
    exam_type: ExamType,
) -> EngineResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM results WHERE student_id = ? AND subject_id = ? AND exam_type = ?",
            (student_id, subject_id, exam_type.as_str()),
            |r| r.get(0),
        )
        .optional()?)
}

/// Compute and insert without opening a transaction; callers own it.
fn insert_computed(
    conn: &Connection,
    table: &GradeTable,
    student: &Student,
    input: &ResultInput,
) -> EngineResult<ResultRecord> {
    let computed = compute(table, input.marks_obtained, input.total_marks)?;
    let id = db::new_id();
    let now = db::now_iso();
    let inserted = conn.execute(
        "INSERT INTO results(
            id, student_id, class_id, subject_id, exam_type,
            marks_obtained, total_marks, percentage, grade, gpa,
            remarks, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params_from_iter([
            Value::Text(id.clone()),
            Value::Text(student.id.clone()),
            Value::Text(student.class_id.clone()),
            Value::Text(input.subject_id.clone()),
            Value::Text(input.exam_type.as_str().to_string()),
            Value::Text(input.marks_obtained.to_string()),
            Value::Text(input.total_marks.to_string()),
            Value::Text(computed.percentage.to_string()),
            Value::Text(computed.grade.clone()),
            Value::Text(computed.gpa.to_string()),
            Value::Text(input.remarks.clone()),
            Value::Text(now.clone()),
            Value::Text(now.clone()),
        ]),
    );
    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            let existing_id =
                existing_result_id(conn, &student.id, &input.subject_id, input.exam_type)?;
            return Err(EngineError::DuplicateRecord {
                entity: "result",
                existing_id,
            });
        }
        return Err(e.into());
    }

    Ok(ResultRecord {
        id,
        student_id: student.id.clone(),
        class_id: student.class_id.clone(),
        subject_id: input.subject_id.clone(),
        exam_type: input.exam_type.as_str().to_string(),
        marks_obtained: input.marks_obtained,
        total_marks: input.total_marks,
        percentage: computed.percentage,
        grade: computed.grade,
        gpa: computed.gpa,
        remarks: input.remarks.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn create_result(
    conn: &Connection,
    table: &GradeTable,
    input: &ResultInput,
) -> EngineResult<ResultRecord> {
    let student = roster::get_student(conn, &input.student_id)?;
    roster::require_subject(conn, &input.subject_id)?;

    let tx = conn.unchecked_transaction()?;
    let record = insert_computed(&tx, table, &student, input)?;
    tx.commit()?;
    Ok(record)
}

/// Create, or when the row already exists update it in place. A lost insert
/// race lands in the update branch the same way.
pub fn save_result(
    conn: &Connection,
    table: &GradeTable,
    input: &ResultInput,
) -> EngineResult<(ResultRecord, bool)> {
    match create_result(conn, table, input) {
        Ok(r) => Ok((r, true)),
        Err(EngineError::DuplicateRecord {
            existing_id: Some(id),
            ..
        }) => {
            let updated = update_result(
                conn,
                table,
                &id,
                input.marks_obtained,
                input.total_marks,
                Some(input.remarks.clone()),
            )?;
            Ok((updated, false))
        }
        Err(e) => Err(e),
    }
}

pub fn update_result(
    conn: &Connection,
    table: &GradeTable,
    result_id: &str,
    marks_obtained: Decimal,
    total_marks: Decimal,
    remarks: Option<String>,
) -> EngineResult<ResultRecord> {
    let computed = compute(table, marks_obtained, total_marks)?;

    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE results SET
           marks_obtained = ?, total_marks = ?, percentage = ?, grade = ?, gpa = ?,
           remarks = COALESCE(?, remarks), updated_at = ?
         WHERE id = ?",
        (
            marks_obtained.to_string(),
            total_marks.to_string(),
            computed.percentage.to_string(),
            &computed.grade,
            computed.gpa.to_string(),
            remarks,
            db::now_iso(),
            result_id,
        ),
    )?;
    if changed == 0 {
        return Err(EngineError::NotFound("result"));
    }
    let record = get_result(&tx, result_id)?;
    tx.commit()?;
    Ok(record)
}

pub fn get_result(conn: &Connection, result_id: &str) -> EngineResult<ResultRecord> {
    let sql = format!("SELECT {} FROM results WHERE id = ?", RESULT_COLUMNS);
    conn.query_row(&sql, [result_id], result_from_row)
        .optional()?
        .ok_or(EngineError::NotFound("result"))
}

pub fn delete_result(conn: &Connection, result_id: &str) -> EngineResult<()> {
    let changed = conn.execute("DELETE FROM results WHERE id = ?", [result_id])?;
    if changed == 0 {
        return Err(EngineError::NotFound("result"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub student_id: Option<String>,
    pub exam_type: Option<ExamType>,
}

pub fn list_results(conn: &Connection, filter: &ResultFilter) -> EngineResult<Vec<ResultRecord>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(v) = &filter.class_id {
        clauses.push("class_id = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.subject_id {
        clauses.push("subject_id = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.student_id {
        clauses.push("student_id = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = filter.exam_type {
        clauses.push("exam_type = ?");
        binds.push(Value::Text(v.as_str().to_string()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM results {} ORDER BY created_at DESC, rowid DESC",
        RESULT_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), result_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Rewrites derived columns of every stored result against `table`.
pub fn recompute_all(conn: &Connection, table: &GradeTable) -> EngineResult<usize> {
    let mut stmt = conn.prepare("SELECT id, marks_obtained, total_marks FROM results")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                db::decimal_at(r, 1)?,
                db::decimal_at(r, 2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let now = db::now_iso();
    for (id, marks, total) in &rows {
        let computed = compute(table, *marks, *total)?;
        conn.execute(
            "UPDATE results SET percentage = ?, grade = ?, gpa = ?, updated_at = ? WHERE id = ?",
            (
                computed.percentage.to_string(),
                &computed.grade,
                computed.gpa.to_string(),
                &now,
                id,
            ),
        )?;
    }
    Ok(rows.len())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student_id: String,
    pub total_results: usize,
    pub total_subjects: usize,
    pub average_percentage: Decimal,
    pub overall_grade: String,
    pub final_gpa: Decimal,
    pub results: Vec<ResultRecord>,
}

pub fn student_report(
    conn: &Connection,
    table: &GradeTable,
    student_id: &str,
) -> EngineResult<StudentReport> {
    roster::get_student(conn, student_id)?;
    let results = list_results(
        conn,
        &ResultFilter {
            student_id: Some(student_id.to_string()),
            ..ResultFilter::default()
        },
    )?;

    let percentages: Vec<Decimal> = results.iter().map(|r| r.percentage).collect();
    let average_percentage = calc::mean_2dp(&percentages);
    let overall_grade = table.resolve(average_percentage)?.grade.clone();

    let final_gpas: Vec<Decimal> = results
        .iter()
        .filter(|r| r.exam_type == ExamType::Final.as_str())
        .map(|r| r.gpa)
        .collect();
    let final_gpa = calc::mean_2dp(&final_gpas);

    let total_subjects = results
        .iter()
        .map(|r| r.subject_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    Ok(StudentReport {
        student_id: student_id.to_string(),
        total_results: results.len(),
        total_subjects,
        average_percentage,
        overall_grade,
        final_gpa,
        results,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultStats {
    pub total_results: usize,
    pub average_percentage: Decimal,
    pub top_grade: String,
    pub top_grade_count: usize,
    pub failing_grade: String,
    pub failed_count: usize,
}

pub fn stats(
    conn: &Connection,
    table: &GradeTable,
    filter: &ResultFilter,
) -> EngineResult<ResultStats> {
    let results = list_results(conn, filter)?;
    let percentages: Vec<Decimal> = results.iter().map(|r| r.percentage).collect();
    let top = &table.top_band().grade;
    let bottom = &table.bottom_band().grade;
    Ok(ResultStats {
        total_results: results.len(),
        average_percentage: calc::mean_2dp(&percentages),
        top_grade: top.clone(),
        top_grade_count: results.iter().filter(|r| &r.grade == top).count(),
        failing_grade: bottom.clone(),
        failed_count: results.iter().filter(|r| &r.grade == bottom).count(),
    })
}

pub const CSV_TEMPLATE: &str = "roll_number,marks_obtained\n2024001,85\n2024002,92\n2024003,78\n";

#[derive(Debug, Clone)]
pub struct ImportRequest<'a> {
    pub class_id: &'a str,
    pub subject_id: &'a str,
    pub exam_type: ExamType,
    pub csv_text: &'a str,
    pub default_total_marks: Decimal,
    pub error_limit: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

/// Row-by-row import of `roll_number, marks_obtained[, total_marks]`.
///
/// Rows that fail are reported by line number and skipped; the rows that pass
/// are committed together.
pub fn import_csv(
    conn: &Connection,
    table: &GradeTable,
    req: &ImportRequest<'_>,
) -> EngineResult<ImportReport> {
    roster::require_class(conn, req.class_id)?;
    roster::require_subject(conn, req.subject_id)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(req.csv_text.as_bytes());

    let mut success_count = 0usize;
    let mut errors: Vec<String> = Vec::new();

    let tx = conn.unchecked_transaction()?;
    for (i, record) in reader.records().enumerate() {
        let fallback_line = i as u64 + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                errors.push(format!("Line {}: {}", line, e));
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() < 2 {
            errors.push(format!(
                "Line {}: expected roll_number and marks_obtained",
                line
            ));
            continue;
        }

        let roll_number = &record[0];
        let Some(marks_obtained) = calc::parse_decimal(&record[1]) else {
            errors.push(format!("Line {}: Invalid marks format", line));
            continue;
        };
        let total_marks = match record.get(2).filter(|s| !s.is_empty()) {
            Some(raw) => match calc::parse_decimal(raw) {
                Some(v) => v,
                None => {
                    errors.push(format!("Line {}: Invalid total marks format", line));
                    continue;
                }
            },
            None => req.default_total_marks,
        };

        let student = match roster::find_student_by_roll(&tx, req.class_id, roll_number)? {
            Some(s) => s,
            None => {
                errors.push(format!(
                    "Line {}: Student with roll number {} not found in selected class",
                    line, roll_number
                ));
                continue;
            }
        };

        let input = ResultInput {
            student_id: student.id.clone(),
            subject_id: req.subject_id.to_string(),
            exam_type: req.exam_type,
            marks_obtained,
            total_marks,
            remarks: String::new(),
        };
        match insert_computed(&tx, table, &student, &input) {
            Ok(_) => success_count += 1,
            Err(EngineError::DuplicateRecord { .. }) => {
                errors.push(format!(
                    "Line {}: Result already exists for {}",
                    line, student.name
                ));
            }
            Err(e @ (EngineError::InvalidMarks { .. } | EngineError::OutOfRange { .. })) => {
                errors.push(format!("Line {}: {}", line, e));
            }
            Err(e) => return Err(e),
        }
    }
    tx.commit()?;

    let error_count = errors.len();
    errors.truncate(req.error_limit);
    tracing::info!(
        class_id = req.class_id,
        subject_id = req.subject_id,
        exam_type = req.exam_type.as_str(),
        success_count,
        error_count,
        "result import finished"
    );
    Ok(ImportReport {
        success_count,
        error_count,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::default_bands;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    fn table() -> GradeTable {
        GradeTable::new(default_bands()).expect("default bands")
    }

    #[test]
    fn eighty_five_of_hundred_is_a_plus() {
        let r = compute(&table(), d("85"), d("100")).expect("compute");
        assert_eq!(r.percentage.to_string(), "85.00");
        assert_eq!(r.grade, "A+");
        assert_eq!(r.gpa.to_string(), "5.00");
    }

    #[test]
    fn forty_five_of_hundred_is_c() {
        let r = compute(&table(), d("45"), d("100")).expect("compute");
        assert_eq!(r.percentage.to_string(), "45.00");
        assert_eq!(r.grade, "C");
        assert_eq!(r.gpa.to_string(), "2.00");
    }

    #[test]
    fn fractional_percentage_rounds_half_up() {
        // 33.335% sits on the midpoint and rounds up into D.
        let r = compute(&table(), d("66.67"), d("200")).expect("compute");
        assert_eq!(r.percentage, d("33.34"));
        assert_eq!(r.grade, "D");

        let r = compute(&table(), d("2"), d("3")).expect("compute");
        assert_eq!(r.percentage, d("66.67"));
        assert_eq!(r.grade, "A-");
    }

    #[test]
    fn full_marks_and_zero_marks_resolve() {
        let t = table();
        assert_eq!(compute(&t, d("50"), d("50")).expect("full").grade, "A+");
        assert_eq!(compute(&t, d("0"), d("50")).expect("zero").grade, "F");
    }

    #[test]
    fn invalid_marks_are_rejected() {
        let t = table();
        for (m, total) in [
            ("-1", "100"),
            ("5", "0.5"),
            ("101", "100"),
            ("1000", "1000"),
            ("85.125", "100"),
            ("1000000000000000000000000000", "1000000000000000000000000000"),
        ] {
            let e = compute(&t, d(m), d(total)).expect_err("must reject");
            assert!(
                matches!(e, EngineError::InvalidMarks { .. }),
                "{} / {} gave {:?}",
                m,
                total,
                e
            );
        }
    }

    #[test]
    fn exam_type_parse_is_case_insensitive() {
        assert_eq!(ExamType::parse("Final"), Some(ExamType::Final));
        assert_eq!(ExamType::parse(" quiz "), Some(ExamType::Quiz));
        assert_eq!(ExamType::parse("oral"), None);
    }
}
