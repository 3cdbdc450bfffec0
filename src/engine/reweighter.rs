//! Per-record weight redistribution over available indicators.

use std::collections::BTreeMap;

use crate::catalog::Catalog;

/// Weighted combination for one country-year.
#[derive(Debug, Clone, PartialEq)]
pub struct Combined {
    pub composite: f64,
    pub coverage_ratio: f64,
    /// Every catalog indicator; 0 for unavailable ones.
    pub effective_weights: BTreeMap<String, f64>,
    pub pillars: BTreeMap<String, f64>,
}

/// Combine the subscores of the available indicators.
///
/// `subscores` holds exactly the available indicators. Returns `None` when
/// none of them carries weight (zero coverage).
pub fn combine(catalog: &Catalog, subscores: &BTreeMap<String, f64>) -> Option<Combined> {
    let total_available: f64 = catalog
        .indicators()
        .iter()
        .filter(|spec| subscores.contains_key(&spec.id))
        .map(|spec| spec.base_weight)
        .sum();
    if total_available <= 0.0 {
        return None;
    }

    let mut composite = 0.0;
    let mut effective_weights = BTreeMap::new();
    for spec in catalog.indicators() {
        let weight = match subscores.get(&spec.id) {
            Some(subscore) => {
                let w = spec.base_weight / total_available;
                composite += w * subscore;
                w
            }
            None => 0.0,
        };
        effective_weights.insert(spec.id.clone(), weight);
    }

    let mut pillars = BTreeMap::new();
    for pillar in catalog.pillars() {
        let mut weight = 0.0;
        let mut weighted = 0.0;
        for spec in catalog.indicators() {
            if spec.pillar.as_deref() != Some(pillar.as_str()) {
                continue;
            }
            if let Some(subscore) = subscores.get(&spec.id) {
                weight += spec.base_weight;
                weighted += spec.base_weight * subscore;
            }
        }
        if weight > 0.0 {
            pillars.insert(pillar, (weighted / weight).clamp(0.0, 100.0));
        }
    }

    Some(Combined {
        composite: composite.clamp(0.0, 100.0),
        coverage_ratio: total_available,
        effective_weights,
        pillars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CATALOG: &str = r#"
indicators:
  - { id: a, pillar: security, direction: higher_is_worse, weight: 0.5, sources: [{ source: worldbank }] }
  - { id: b, pillar: security, direction: higher_is_worse, weight: 0.3, sources: [{ source: worldbank }] }
  - { id: c, pillar: governance, direction: higher_is_better, weight: 0.2, sources: [{ source: wgi }] }
"#;

    fn subs(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn full_coverage_uses_base_weights() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let c = combine(&catalog, &subs(&[("a", 80.0), ("b", 40.0), ("c", 10.0)])).unwrap();
        assert_relative_eq!(c.coverage_ratio, 1.0, epsilon = 1e-9);
        assert_relative_eq!(c.composite, 0.5 * 80.0 + 0.3 * 40.0 + 0.2 * 10.0, epsilon = 1e-9);
        assert_relative_eq!(c.pillars["security"], (0.5 * 80.0 + 0.3 * 40.0) / 0.8, epsilon = 1e-9);
        assert_relative_eq!(c.pillars["governance"], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_indicator_weight_is_redistributed() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let c = combine(&catalog, &subs(&[("a", 80.0), ("c", 10.0)])).unwrap();
        assert_relative_eq!(c.coverage_ratio, 0.7, epsilon = 1e-9);
        assert_eq!(c.effective_weights["b"], 0.0);
        assert_relative_eq!(c.effective_weights["a"], 0.5 / 0.7, epsilon = 1e-9);
        let sum: f64 = c.effective_weights.values().sum();
        assert!((sum - 1.0).abs() <= 1e-9);
        assert_relative_eq!(c.composite, (0.5 * 80.0 + 0.2 * 10.0) / 0.7, epsilon = 1e-9);
    }

    #[test]
    fn pillar_without_members_is_absent() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let c = combine(&catalog, &subs(&[("a", 60.0)])).unwrap();
        assert!(c.pillars.contains_key("security"));
        assert!(!c.pillars.contains_key("governance"));
    }

    #[test]
    fn zero_coverage_yields_nothing() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        assert!(combine(&catalog, &BTreeMap::new()).is_none());
    }
}
