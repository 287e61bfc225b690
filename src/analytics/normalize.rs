//! Canonicalization of raw metric scores to the [0, 1] range.
//!
//! Evaluators report scores on different scales: fractions, percentages or
//! booleans already mapped to 0/1. Every consumer goes through
//! [`normalize_score`] so comparisons never mix scales.

/// Upper bound of the percentage scale.
const PERCENT_SCALE: f64 = 100.0;

/// Map a raw score to [0, 1].
///
/// - Values in [0, 1] are returned unchanged.
/// - Values in (1, 100] are read as percentages.
/// - Anything else (NaN, infinities, negatives, > 100) is clamped.
pub fn normalize_score(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    if (0.0..=1.0).contains(&raw) {
        return raw;
    }
    if raw > 1.0 && raw <= PERCENT_SCALE {
        return raw / PERCENT_SCALE;
    }
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_range_is_identity() {
        for x in [0.0, 0.1, 0.5, 0.999, 1.0] {
            assert_eq!(normalize_score(x), x);
        }
    }

    #[test]
    fn test_percentages_are_scaled() {
        assert!((normalize_score(85.0) - 0.85).abs() < 1e-12);
        assert!((normalize_score(100.0) - 1.0).abs() < 1e-12);
        assert!((normalize_score(1.5) - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_malformed_values_are_clamped() {
        assert_eq!(normalize_score(f64::NAN), 0.0);
        assert_eq!(normalize_score(-5.0), 0.0);
        assert_eq!(normalize_score(500.0), 1.0);
        assert_eq!(normalize_score(f64::INFINITY), 1.0);
        assert_eq!(normalize_score(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_always_in_unit_range() {
        let inputs = [-1e9, -0.0001, 0.3, 1.0001, 42.0, 100.0001, 1e12];
        for x in inputs {
            let n = normalize_score(x);
            assert!((0.0..=1.0).contains(&n), "normalize_score({x}) = {n}");
        }
    }
}
