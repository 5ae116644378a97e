//! Percentage-range to letter-grade mapping.
//!
//! A [`GradeTable`] is only ever built through [`GradeTable::new`], which refuses
//! gaps, overlaps and tables that do not span exactly `[0, 100]`. Lookups on a
//! constructed table therefore only fail for percentages outside that range.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::results;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: String,
    pub min_percentage: Decimal,
    pub max_percentage: Decimal,
    pub gpa: Decimal,
}

impl GradeBand {
    fn new(grade: &str, min: i64, max: i64, gpa_hundredths: i64) -> Self {
        Self {
            grade: grade.to_string(),
            min_percentage: Decimal::from(min),
            max_percentage: Decimal::from(max),
            gpa: Decimal::new(gpa_hundredths, 2),
        }
    }
}

/// Bands a fresh workspace starts with.
pub fn default_bands() -> Vec<GradeBand> {
    vec![
        GradeBand::new("A+", 80, 100, 500),
        GradeBand::new("A", 70, 80, 400),
        GradeBand::new("A-", 60, 70, 350),
        GradeBand::new("B", 50, 60, 300),
        GradeBand::new("C", 40, 50, 200),
        GradeBand::new("D", 33, 40, 100),
        GradeBand::new("F", 0, 33, 0),
    ]
}

#[derive(Debug, Clone)]
pub struct GradeTable {
    /// Highest band first.
    bands: Vec<GradeBand>,
}

impl GradeTable {
    pub fn new(mut bands: Vec<GradeBand>) -> EngineResult<Self> {
        if bands.is_empty() {
            return Err(EngineError::Configuration(
                "at least one band is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for b in &bands {
            if b.grade.trim().is_empty() {
                return Err(EngineError::Configuration(
                    "grade label must not be empty".to_string(),
                ));
            }
            if !seen.insert(b.grade.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "grade {} appears more than once",
                    b.grade
                )));
            }
            if b.min_percentage >= b.max_percentage {
                return Err(EngineError::Configuration(format!(
                    "band {} has min {} >= max {}",
                    b.grade, b.min_percentage, b.max_percentage
                )));
            }
            if b.gpa.is_sign_negative() {
                return Err(EngineError::Configuration(format!(
                    "band {} has negative gpa",
                    b.grade
                )));
            }
        }

        bands.sort_by(|a, b| a.min_percentage.cmp(&b.min_percentage));

        if !bands[0].min_percentage.is_zero() {
            return Err(EngineError::Configuration(format!(
                "lowest band {} starts at {} instead of 0",
                bands[0].grade, bands[0].min_percentage
            )));
        }
        for pair in bands.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if hi.min_percentage > lo.max_percentage {
                return Err(EngineError::Configuration(format!(
                    "gap between {} (ends {}) and {} (starts {})",
                    lo.grade, lo.max_percentage, hi.grade, hi.min_percentage
                )));
            }
            if hi.min_percentage < lo.max_percentage {
                return Err(EngineError::Configuration(format!(
                    "{} and {} overlap",
                    lo.grade, hi.grade
                )));
            }
        }
        let last = &bands[bands.len() - 1];
        if last.max_percentage != Decimal::ONE_HUNDRED {
            return Err(EngineError::Configuration(format!(
                "highest band {} ends at {} instead of 100",
                last.grade, last.max_percentage
            )));
        }

        bands.reverse();
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// First band, scanning from the top, whose `[min, max)` holds `percentage`.
    /// The top band also holds its own max so a perfect score resolves.
    pub fn resolve(&self, percentage: Decimal) -> EngineResult<&GradeBand> {
        self.bands
            .iter()
            .enumerate()
            .find(|(i, b)| {
                let under_max = if *i == 0 {
                    percentage <= b.max_percentage
                } else {
                    percentage < b.max_percentage
                };
                percentage >= b.min_percentage && under_max
            })
            .map(|(_, b)| b)
            .ok_or(EngineError::OutOfRange { percentage })
    }

    pub fn top_band(&self) -> &GradeBand {
        &self.bands[0]
    }

    pub fn bottom_band(&self) -> &GradeBand {
        &self.bands[self.bands.len() - 1]
    }
}

pub fn load_table(conn: &Connection) -> EngineResult<GradeTable> {
    let mut stmt = conn.prepare(
        "SELECT grade, min_percentage, max_percentage, gpa FROM grade_bands",
    )?;
    let bands = stmt
        .query_map([], |r| {
            Ok(GradeBand {
                grade: r.get(0)?,
                min_percentage: db::decimal_at(r, 1)?,
                max_percentage: db::decimal_at(r, 2)?,
                gpa: db::decimal_at(r, 3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    GradeTable::new(bands)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceOutcome {
    pub recomputed_results: usize,
}

/// Swap in a new table. Existing results pin the current table unless the
/// caller asks for them to be recomputed inside the same transaction.
pub fn replace_table(
    conn: &Connection,
    bands: Vec<GradeBand>,
    recompute: bool,
) -> EngineResult<(GradeTable, ReplaceOutcome)> {
    let table = GradeTable::new(bands)?;

    let tx = conn.unchecked_transaction()?;
    let result_count: i64 = tx.query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))?;
    if result_count > 0 && !recompute {
        return Err(EngineError::GradeTableLocked { result_count });
    }

    tx.execute("DELETE FROM grade_bands", [])?;
    for b in table.bands() {
        tx.execute(
            "INSERT INTO grade_bands(grade, min_percentage, max_percentage, gpa)
             VALUES(?, ?, ?, ?)",
            (
                &b.grade,
                b.min_percentage.to_string(),
                b.max_percentage.to_string(),
                b.gpa.to_string(),
            ),
        )?;
    }
    let recomputed_results = if recompute {
        results::recompute_all(&tx, &table)?
    } else {
        0
    };
    tx.commit()?;

    tracing::info!(
        bands = table.bands().len(),
        recomputed_results,
        "grade table replaced"
    );
    Ok((table, ReplaceOutcome { recomputed_results }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    fn table() -> GradeTable {
        GradeTable::new(default_bands()).expect("default bands are valid")
    }

    #[test]
    fn band_edges_resolve_upwards() {
        let t = table();
        assert_eq!(t.resolve(d("80")).expect("80").grade, "A+");
        assert_eq!(t.resolve(d("79.99")).expect("79.99").grade, "A");
        assert_eq!(t.resolve(d("33")).expect("33").grade, "D");
        assert_eq!(t.resolve(d("32.99")).expect("32.99").grade, "F");
        assert_eq!(t.resolve(d("0")).expect("0").grade, "F");
        assert_eq!(t.resolve(d("100")).expect("100").grade, "A+");
    }

    #[test]
    fn outside_zero_to_hundred_is_out_of_range() {
        let t = table();
        assert!(matches!(
            t.resolve(d("100.01")),
            Err(EngineError::OutOfRange { .. })
        ));
        assert!(matches!(
            t.resolve(d("-0.5")),
            Err(EngineError::OutOfRange { .. })
        ));
    }

    #[test]
    fn gap_is_rejected() {
        let mut bands = default_bands();
        // C now ends at 45, leaving [45, 50) uncovered.
        bands[4].max_percentage = d("45");
        let e = GradeTable::new(bands).expect_err("gap must fail");
        assert!(matches!(e, EngineError::Configuration(ref m) if m.contains("gap")));
    }

    #[test]
    fn overlap_is_rejected() {
        let mut bands = default_bands();
        bands[0].min_percentage = d("75");
        let e = GradeTable::new(bands).expect_err("overlap must fail");
        assert!(matches!(e, EngineError::Configuration(ref m) if m.contains("overlap")));
    }

    #[test]
    fn coverage_must_reach_both_ends() {
        let mut low = default_bands();
        low[6].min_percentage = d("5");
        assert!(GradeTable::new(low).is_err());

        let mut high = default_bands();
        high[0].max_percentage = d("99");
        assert!(GradeTable::new(high).is_err());
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut bands = default_bands();
        bands[1].grade = "A+".to_string();
        assert!(GradeTable::new(bands).is_err());
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let mut bands = default_bands();
        bands.reverse();
        let t = GradeTable::new(bands).expect("valid");
        assert_eq!(t.top_band().grade, "A+");
        assert_eq!(t.bottom_band().grade, "F");
    }
}
