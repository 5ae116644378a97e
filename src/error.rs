use rust_decimal::Decimal;
use serde_json::json;

/// Failure taxonomy shared by the grading, attendance and rollup engines.
///
/// Every variant maps onto one wire code so handlers can surface it without
/// re-deriving what went wrong.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Malformed input; nothing was written.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} already exists")]
    DuplicateRecord {
        entity: &'static str,
        existing_id: Option<String>,
    },

    #[error("attendance already recorded for this class, subject, date and period")]
    DuplicateScope { session_id: String },

    #[error("invalid marks: {reason}")]
    InvalidMarks {
        reason: String,
        marks_obtained: Decimal,
        total_marks: Decimal,
    },

    #[error("no grade band contains {percentage}%")]
    OutOfRange { percentage: Decimal },

    #[error("grade table is invalid: {0}")]
    Configuration(String),

    #[error("grade table is in use by {result_count} results; replace it with recompute")]
    GradeTableLocked { result_count: i64 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Settings(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "bad_params",
            Self::DuplicateRecord { .. } => "duplicate_record",
            Self::DuplicateScope { .. } => "duplicate_scope",
            Self::InvalidMarks { .. } => "invalid_marks",
            Self::OutOfRange { .. } => "out_of_range",
            Self::Configuration(_) => "grade_table_invalid",
            Self::GradeTableLocked { .. } => "grade_table_locked",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) | Self::Settings(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, .. } => Some(json!({ "field": field })),
            Self::DuplicateRecord {
                entity,
                existing_id,
            } => Some(json!({ "entity": entity, "existingId": existing_id })),
            Self::DuplicateScope { session_id } => Some(json!({ "sessionId": session_id })),
            Self::InvalidMarks {
                marks_obtained,
                total_marks,
                ..
            } => Some(json!({
                "marksObtained": marks_obtained,
                "totalMarks": total_marks
            })),
            Self::OutOfRange { percentage } => Some(json!({ "percentage": percentage })),
            Self::GradeTableLocked { result_count } => {
                Some(json!({ "resultCount": result_count }))
            }
            Self::Configuration(_)
            | Self::NotFound(_)
            | Self::Storage(_)
            | Self::Settings(_) => None,
        }
    }
}

/// True when `e` is SQLite rejecting a UNIQUE constraint.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

pub type EngineResult<T> = Result<T, EngineError>;
