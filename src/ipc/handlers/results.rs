use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::error::{EngineError, EngineResult};
use crate::grading;
use crate::ipc::helpers::{opt_decimal, opt_str, req_decimal, req_str, with_conn, Handler};
use crate::ipc::types::{AppState, Request};
use crate::results::{self, ExamType, ImportRequest, ResultFilter, ResultInput};
use crate::settings;

fn exam_type(raw: &str) -> EngineResult<ExamType> {
    ExamType::parse(raw).ok_or_else(|| {
        EngineError::validation(
            "examType",
            "must be one of: midterm, final, quiz, assignment",
        )
    })
}

fn total_marks_or_default(conn: &Connection, req: &Request) -> EngineResult<Decimal> {
    match opt_decimal(req, "totalMarks")? {
        Some(v) => Ok(v),
        None => Ok(settings::results_settings(conn)?.default_total_marks),
    }
}

fn result_input(conn: &Connection, req: &Request) -> EngineResult<ResultInput> {
    Ok(ResultInput {
        student_id: req_str(req, "studentId")?.to_string(),
        subject_id: req_str(req, "subjectId")?.to_string(),
        exam_type: exam_type(req_str(req, "examType")?)?,
        marks_obtained: req_decimal(req, "marksObtained")?,
        total_marks: total_marks_or_default(conn, req)?,
        remarks: opt_str(req, "remarks").unwrap_or("").trim().to_string(),
    })
}

fn result_filter(req: &Request) -> EngineResult<ResultFilter> {
    Ok(ResultFilter {
        class_id: opt_str(req, "classId").map(str::to_string),
        subject_id: opt_str(req, "subjectId").map(str::to_string),
        student_id: opt_str(req, "studentId").map(str::to_string),
        exam_type: opt_str(req, "examType").map(exam_type).transpose()?,
    })
}

fn results_compute(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    let computed = results::compute(
        &table,
        req_decimal(req, "marksObtained")?,
        total_marks_or_default(conn, req)?,
    )?;
    Ok(json!(computed))
}

fn results_create(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    let input = result_input(conn, req)?;
    let record = results::create_result(conn, &table, &input)?;
    Ok(json!({ "result": record }))
}

fn results_save(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    let input = result_input(conn, req)?;
    let (record, created) = results::save_result(conn, &table, &input)?;
    Ok(json!({ "result": record, "created": created }))
}

fn results_update(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    let result_id = req_str(req, "resultId")?;
    let current = results::get_result(conn, result_id)?;
    let marks_obtained = opt_decimal(req, "marksObtained")?.unwrap_or(current.marks_obtained);
    let total_marks = opt_decimal(req, "totalMarks")?.unwrap_or(current.total_marks);
    let remarks = opt_str(req, "remarks").map(|s| s.trim().to_string());
    let record =
        results::update_result(conn, &table, result_id, marks_obtained, total_marks, remarks)?;
    Ok(json!({ "result": record }))
}

fn results_get(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let record = results::get_result(conn, req_str(req, "resultId")?)?;
    Ok(json!({ "result": record }))
}

fn results_list(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let filter = result_filter(req)?;
    Ok(json!({ "results": results::list_results(conn, &filter)? }))
}

fn results_delete(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let result_id = req_str(req, "resultId")?;
    results::delete_result(conn, result_id)?;
    Ok(json!({ "deleted": result_id }))
}

fn results_student_report(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    let report = results::student_report(conn, &table, req_str(req, "studentId")?)?;
    Ok(json!(report))
}

fn results_stats(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    let filter = result_filter(req)?;
    Ok(json!(results::stats(conn, &table, &filter)?))
}

fn results_import_csv(conn: &Connection, req: &Request) -> EngineResult<Value> {
    let table = grading::load_table(conn)?;
    let cfg = settings::results_settings(conn)?;
    let import = ImportRequest {
        class_id: req_str(req, "classId")?,
        subject_id: req_str(req, "subjectId")?,
        exam_type: exam_type(req_str(req, "examType")?)?,
        csv_text: req_str(req, "csvText")?,
        default_total_marks: cfg.default_total_marks,
        error_limit: cfg.bulk_error_limit,
    };
    Ok(json!(results::import_csv(conn, &table, &import)?))
}

fn results_csv_template(_conn: &Connection, _req: &Request) -> EngineResult<Value> {
    Ok(json!({
        "fileName": "results_template.csv",
        "csvText": results::CSV_TEMPLATE
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: Handler = match req.method.as_str() {
        "results.compute" => results_compute,
        "results.create" => results_create,
        "results.save" => results_save,
        "results.update" => results_update,
        "results.get" => results_get,
        "results.list" => results_list,
        "results.delete" => results_delete,
        "results.studentReport" => results_student_report,
        "results.stats" => results_stats,
        "results.importCsv" => results_import_csv,
        "results.csvTemplate" => results_csv_template,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
