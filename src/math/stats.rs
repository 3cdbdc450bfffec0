//! Order-independent summary statistics.
//!
//! Every function here gives the same result for any permutation of its input,
//! so callers can feed values collected from parallel workers or hash maps
//! without sorting first.

use std::cmp::Ordering;

/// Median of the finite values in `values`.
///
/// Even counts average the two middle values. Returns `None` when no finite
/// value is present.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    median_mut(&mut finite)
}

/// Median that sorts `values` in place (non-finite values must already be removed).
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// `(min, max)` over the finite values in `values`.
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_ignores_non_finite() {
        assert_eq!(median(&[f64::NAN, 5.0, f64::INFINITY]), Some(5.0));
        assert_eq!(median(&[f64::NAN]), None);
    }

    #[test]
    fn min_max_is_permutation_invariant() {
        let a = min_max(&[3.0, -1.0, 7.5, 2.0]);
        let b = min_max(&[7.5, 2.0, 3.0, -1.0]);
        assert_eq!(a, Some((-1.0, 7.5)));
        assert_eq!(a, b);
        assert_eq!(min_max(&[f64::NAN]), None);
    }
}
