//! Min-max normalization to a 0-100 risk subscore (100 = highest risk).

use crate::domain::{Direction, IndicatorSpec};
use crate::math::min_max;

/// Subscore assigned to every value of a zero-variance panel.
pub const FLAT_SUBSCORE: f64 = 50.0;

/// Scale fitted over one indicator's full panel of available values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScale {
    pub min: f64,
    pub max: f64,
    pub direction: Direction,
}

impl MinMaxScale {
    pub fn subscore(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return FLAT_SUBSCORE;
        }
        let scaled = ((value - self.min) / span * 100.0).clamp(0.0, 100.0);
        match self.direction {
            Direction::HigherIsWorse => scaled,
            Direction::HigherIsBetter => 100.0 - scaled,
        }
    }
}

/// Fit a scale for `spec`; catalog bounds replace the panel range unless the panel is constant.
///
/// Returns `None` for an empty panel. A zero-variance panel yields a flat
/// scale (every value scores `FLAT_SUBSCORE`) even when bounds are declared.
pub fn normalize(spec: &IndicatorSpec, values: &[f64]) -> Option<MinMaxScale> {
    let (min, max) = min_max(values)?;
    let (min, max) = match spec.bounds {
        Some(bounds) if max > min => (bounds.min, bounds.max),
        _ => (min, max),
    };
    Some(MinMaxScale {
        min,
        max,
        direction: spec.direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bounds;
    use approx::assert_relative_eq;

    fn spec(direction: Direction, bounds: Option<Bounds>) -> IndicatorSpec {
        IndicatorSpec {
            id: "a".into(),
            name: "A".into(),
            pillar: None,
            direction,
            base_weight: 1.0,
            source_priority: Vec::new(),
            imputation_chain: Vec::new(),
            lookback_years: None,
            bounds,
            scale: None,
        }
    }

    #[test]
    fn min_max_maps_panel_to_0_100() {
        let scale = normalize(&spec(Direction::HigherIsWorse, None), &[2.0, 4.0, 6.0]).unwrap();
        assert_relative_eq!(scale.subscore(2.0), 0.0);
        assert_relative_eq!(scale.subscore(4.0), 50.0);
        assert_relative_eq!(scale.subscore(6.0), 100.0);
    }

    #[test]
    fn higher_is_better_is_non_increasing() {
        let values = [1.0, 2.0, 3.5, 8.0, 13.0];
        let scale = normalize(&spec(Direction::HigherIsBetter, None), &values).unwrap();
        let scores: Vec<f64> = values.iter().map(|v| scale.subscore(*v)).collect();
        assert!(scores.windows(2).all(|w| w[1] <= w[0]));
        assert_relative_eq!(scores[0], 100.0);
        assert_relative_eq!(scores[4], 0.0);
    }

    #[test]
    fn constant_panel_scores_fifty() {
        for direction in [Direction::HigherIsWorse, Direction::HigherIsBetter] {
            let scale = normalize(&spec(direction, None), &[3.0, 3.0, 3.0]).unwrap();
            assert_relative_eq!(scale.subscore(3.0), FLAT_SUBSCORE);
        }
    }

    #[test]
    fn fixed_bounds_replace_range_and_clamp() {
        let bounds = Some(Bounds { min: -2.5, max: 2.5 });
        let scale = normalize(&spec(Direction::HigherIsBetter, bounds), &[0.0, 1.0]).unwrap();
        assert_relative_eq!(scale.subscore(0.0), 50.0);
        assert_relative_eq!(scale.subscore(2.5), 0.0);
        assert_relative_eq!(scale.subscore(-4.0), 100.0);
    }

    #[test]
    fn constant_panel_with_bounds_scores_fifty() {
        let bounds = Some(Bounds { min: -2.5, max: 2.5 });
        for direction in [Direction::HigherIsWorse, Direction::HigherIsBetter] {
            let scale = normalize(&spec(direction, bounds), &[1.0, 1.0]).unwrap();
            assert_relative_eq!(scale.subscore(1.0), FLAT_SUBSCORE);
        }
    }

    #[test]
    fn empty_panel_has_no_scale() {
        assert!(normalize(&spec(Direction::HigherIsWorse, None), &[]).is_none());
    }

    #[test]
    fn order_independent() {
        let s = spec(Direction::HigherIsWorse, None);
        assert_eq!(normalize(&s, &[5.0, 1.0, 3.0]), normalize(&s, &[3.0, 5.0, 1.0]));
    }
}
