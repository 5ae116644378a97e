//! Workspace-scoped settings, stored as JSON documents in the `settings` table.
//!
//! Each section has typed defaults; saved documents are merged over them field
//! by field, and malformed historical values fall back to the default.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::attendance::{AttendanceStatus, MAX_REMARK_CHARS};
use crate::calc;
use crate::db;

const MAX_BULK_ERROR_LIMIT: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Results,
    Attendance,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::Results, Section::Attendance];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "results" => Some(Self::Results),
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Results => "results",
            Self::Attendance => "attendance",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Results => "setup.results",
            Self::Attendance => "setup.attendance",
        }
    }

    fn defaults(self) -> Value {
        match self {
            Self::Results => json!({
                "defaultTotalMarks": 100,
                "bulkErrorLimit": 10
            }),
            Self::Attendance => json!({
                "bulkDefaultStatus": "present",
                "bulkRemark": "bulk entry"
            }),
        }
    }
}

fn merge_patch(section: Section, current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal settings value must be a JSON object".to_string())?;
    for (k, v) in patch {
        match (section, k.as_str()) {
            (Section::Results, "defaultTotalMarks") => {
                let total = calc::decimal_from_json(v)
                    .filter(|d| *d >= Decimal::ONE && calc::is_storable_mark(*d))
                    .ok_or_else(|| {
                        "defaultTotalMarks must be a number between 1 and 999.99".to_string()
                    })?;
                obj.insert(k.clone(), json!(total));
            }
            (Section::Results, "bulkErrorLimit") => {
                let n = v
                    .as_u64()
                    .filter(|n| (1..=MAX_BULK_ERROR_LIMIT).contains(n))
                    .ok_or_else(|| {
                        format!("bulkErrorLimit must be between 1 and {}", MAX_BULK_ERROR_LIMIT)
                    })?;
                obj.insert(k.clone(), json!(n));
            }
            (Section::Attendance, "bulkDefaultStatus") => {
                let status = v
                    .as_str()
                    .and_then(AttendanceStatus::parse)
                    .ok_or_else(|| {
                        "bulkDefaultStatus must be one of: present, absent, late, excused"
                            .to_string()
                    })?;
                obj.insert(k.clone(), json!(status.as_str()));
            }
            (Section::Attendance, "bulkRemark") => {
                let s = v
                    .as_str()
                    .ok_or_else(|| "bulkRemark must be a string".to_string())?;
                if s.chars().count() > MAX_REMARK_CHARS {
                    return Err(format!(
                        "bulkRemark must be at most {} characters",
                        MAX_REMARK_CHARS
                    ));
                }
                obj.insert(k.clone(), json!(s));
            }
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: Section) -> anyhow::Result<Value> {
    let mut current = section.defaults();
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Apply field by field so one stale value does not discard the rest.
            for (k, v) in saved_obj {
                let mut single = Map::new();
                single.insert(k.clone(), v.clone());
                let _ = merge_patch(section, &mut current, &single);
            }
        }
    }
    Ok(current)
}

pub enum UpdateError {
    Invalid(String),
    Storage(anyhow::Error),
}

pub fn update_section(
    conn: &Connection,
    section: Section,
    patch: &Map<String, Value>,
) -> Result<Value, UpdateError> {
    let mut current = load_section(conn, section).map_err(UpdateError::Storage)?;
    merge_patch(section, &mut current, patch).map_err(UpdateError::Invalid)?;
    db::settings_set_json(conn, section.key(), &current).map_err(UpdateError::Storage)?;
    tracing::info!(section = section.name(), "settings updated");
    Ok(current)
}

#[derive(Debug, Clone)]
pub struct ResultsSettings {
    pub default_total_marks: Decimal,
    pub bulk_error_limit: usize,
}

pub fn results_settings(conn: &Connection) -> anyhow::Result<ResultsSettings> {
    let v = load_section(conn, Section::Results)?;
    Ok(ResultsSettings {
        default_total_marks: v
            .get("defaultTotalMarks")
            .and_then(calc::decimal_from_json)
            .unwrap_or(Decimal::ONE_HUNDRED),
        bulk_error_limit: v
            .get("bulkErrorLimit")
            .and_then(|n| n.as_u64())
            .unwrap_or(10) as usize,
    })
}

#[derive(Debug, Clone)]
pub struct AttendanceSettings {
    pub bulk_default_status: AttendanceStatus,
    pub bulk_remark: String,
}

pub fn attendance_settings(conn: &Connection) -> anyhow::Result<AttendanceSettings> {
    let v = load_section(conn, Section::Attendance)?;
    Ok(AttendanceSettings {
        bulk_default_status: v
            .get("bulkDefaultStatus")
            .and_then(|s| s.as_str())
            .and_then(AttendanceStatus::parse)
            .unwrap_or(AttendanceStatus::Present),
        bulk_remark: v
            .get("bulkRemark")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string(),
    })
}
