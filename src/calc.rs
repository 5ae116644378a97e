use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Round to 2 decimal places, half away from zero, and pin the scale at 2 so
/// `85` renders as `85.00`.
pub fn round_2dp(x: Decimal) -> Decimal {
    let mut r = x.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    r.rescale(2);
    r
}

/// Largest mark or total a result may carry.
pub fn max_marks() -> Decimal {
    Decimal::new(99999, 2)
}

/// Within `0..=999.99` with at most 2 decimal places.
pub fn is_storable_mark(x: Decimal) -> bool {
    !x.is_sign_negative() && x <= max_marks() && x.normalize().scale() <= 2
}

/// `part / whole * 100` rounded to 2 dp; 0 when `whole` is zero. `None` when
/// the intermediate product does not fit in a decimal.
pub fn percentage(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole.is_zero() {
        return Some(round_2dp(Decimal::ZERO));
    }
    part.checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(whole)
        .map(round_2dp)
}

pub fn count_percentage(part: i64, whole: i64) -> Decimal {
    // An i64 count times 100 stays well inside the 96-bit mantissa.
    percentage(Decimal::from(part), Decimal::from(whole)).unwrap_or_default()
}

/// Arithmetic mean rounded to 2 dp; 0 for an empty slice.
pub fn mean_2dp(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return round_2dp(Decimal::ZERO);
    }
    let sum: Decimal = values.iter().copied().sum();
    round_2dp(sum / Decimal::from(values.len() as i64))
}

/// Parses a user-supplied number ("85", "85.5", " 92 ") into a decimal.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    Decimal::from_str(t).ok()
}

/// JSON numbers and numeric strings are both accepted; the textual form of a
/// JSON number is parsed so `85.1` does not pick up binary float noise.
pub fn decimal_from_json(v: &serde_json::Value) -> Option<Decimal> {
    match v {
        serde_json::Value::Number(n) => parse_decimal(&n.to_string()),
        serde_json::Value::String(s) => parse_decimal(s),
        _ => None,
    }
}
