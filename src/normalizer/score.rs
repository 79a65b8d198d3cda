use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// All normalized scores live on this scale.
pub const TARGET_SCALE: Decimal = Decimal::TEN;

/// Parses a score literal such as `"4"`, `"4.5"`, `"8/10"` or `"4.5点"`.
/// For `a/b` shapes only the numerator is the score.
pub fn parse_score_literal(literal: &str) -> Option<Decimal> {
    let numerator = literal.split('/').next()?.trim();
    let numerator = numerator.trim_end_matches('点').trim();
    if numerator.is_empty() {
        return None;
    }
    Decimal::from_str(numerator).ok()
}

/// Rescales `original_score` from `original_scale` onto `target_scale`, rounded
/// half-up to one decimal place.
///
/// Returns `None` for missing or non-numeric input, a non-positive scale, or a
/// score outside `0..=original_scale`. A `None` is a data-quality signal for
/// the caller to log, never an error.
pub fn normalize_score(
    original_score: Option<&str>,
    original_scale: Option<Decimal>,
    target_scale: Decimal,
) -> Option<Decimal> {
    let score = parse_score_literal(original_score?)?;
    let scale = original_scale?;
    if scale <= Decimal::ZERO || target_scale <= Decimal::ZERO {
        return None;
    }
    if score < Decimal::ZERO || score > scale {
        return None;
    }

    let mut normalized = score
        .checked_div(scale)?
        .checked_mul(target_scale)?
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    normalized.rescale(1);
    Some(normalized)
}

/// `normalize_score` onto the 10-point scale.
pub fn normalize_to_target(original_score: Option<&str>, original_scale: Option<Decimal>) -> Option<Decimal> {
    normalize_score(original_score, original_scale, TARGET_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn norm(score: &str, scale: u32) -> Option<String> {
        normalize_to_target(Some(score), Some(Decimal::from(scale))).map(|d| d.to_string())
    }

    #[test]
    fn rescales_five_point_ratings() {
        assert_eq!(norm("4", 5).as_deref(), Some("8.0"));
        assert_eq!(norm("4.5", 5).as_deref(), Some("9.0"));
        assert_eq!(norm("3.7", 5).as_deref(), Some("7.4"));
        assert_eq!(norm("5", 5).as_deref(), Some("10.0"));
        assert_eq!(norm("0", 5).as_deref(), Some("0.0"));
    }

    #[test]
    fn ten_point_scale_is_unchanged() {
        assert_eq!(norm("8", 10).as_deref(), Some("8.0"));
        assert_eq!(norm("8.6", 10).as_deref(), Some("8.6"));
    }

    #[test]
    fn rounds_half_up_not_to_even() {
        // banker's rounding would give 1.2 here
        assert_eq!(norm("0.125", 1).as_deref(), Some("1.3"));
        assert_eq!(norm("0.35", 1).as_deref(), Some("3.5"));
        assert_eq!(norm("1", 3).as_deref(), Some("3.3"));
        assert_eq!(norm("2", 3).as_deref(), Some("6.7"));
        assert_eq!(norm("4.25", 5).as_deref(), Some("8.5"));
        assert_eq!(norm("0.45", 4).as_deref(), Some("1.1"));
    }

    #[test]
    fn accepts_fraction_and_suffixed_literals() {
        assert_eq!(norm("8/10", 10).as_deref(), Some("8.0"));
        assert_eq!(norm("4.5 / 5", 5).as_deref(), Some("9.0"));
        assert_eq!(norm("4点", 5).as_deref(), Some("8.0"));
    }

    #[test]
    fn bad_input_yields_none() {
        assert_eq!(normalize_to_target(None, Some(dec("5"))), None);
        assert_eq!(normalize_to_target(Some("abc"), Some(dec("5"))), None);
        assert_eq!(normalize_to_target(Some(""), Some(dec("5"))), None);
        assert_eq!(normalize_to_target(Some("4"), None), None);
        assert_eq!(normalize_to_target(Some("4"), Some(Decimal::ZERO)), None);
        assert_eq!(normalize_to_target(Some("-1"), Some(dec("5"))), None);
        assert_eq!(normalize_to_target(Some("6"), Some(dec("5"))), None);
    }

    #[test]
    fn results_stay_in_range_with_one_decimal() {
        for scale in [1u32, 3, 4, 5, 7, 10, 100] {
            for step in 0..=40u32 {
                let score = Decimal::from(step * scale) / Decimal::from(40u32);
                let normalized =
                    normalize_to_target(Some(&score.to_string()), Some(Decimal::from(scale)))
                        .unwrap();
                assert!(normalized >= Decimal::ZERO && normalized <= TARGET_SCALE);
                assert_eq!(normalized.scale(), 1);
            }
        }
    }

    #[test]
    fn renormalizing_is_a_no_op() {
        for (score, scale) in [("3.7", 5u32), ("1", 3), ("88", 100), ("2.25", 4), ("9.95", 10)] {
            let first = normalize_to_target(Some(score), Some(Decimal::from(scale))).unwrap();
            let second = normalize_to_target(Some(&first.to_string()), Some(TARGET_SCALE)).unwrap();
            assert_eq!(first, second);
        }
    }
}
