//! Source fallback: first adapter with a finite value wins.
//!
//! The catalog `scale` of the indicator is applied to the fetched value.

use tracing::debug;

use crate::data::{SourceFailure, SourceRegistry};
use crate::domain::{IndicatorSpec, Observation, PanelKey};
use crate::report::RunTally;

/// Tally reason for a catalog source id with no registered adapter.
pub const UNREGISTERED: &str = "unregistered";

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Sourced(Observation),
    Unresolved,
}

/// Walk `spec.source_priority` in order for one key.
///
/// Never fails: every adapter failure is tallied and the loop moves on.
pub fn resolve(
    key: &PanelKey,
    spec: &IndicatorSpec,
    sources: &SourceRegistry,
    tally: &mut RunTally,
) -> Resolution {
    for source_ref in &spec.source_priority {
        let source_id = source_ref.source.as_str();
        let Some(adapter) = sources.get(source_id) else {
            tally.source_failure(source_id, UNREGISTERED);
            continue;
        };

        let outcome = if adapter.is_enabled() {
            adapter.fetch(&spec.id, &key.iso3, key.year)
        } else {
            Err(SourceFailure::Disabled)
        };
        let outcome = outcome.and_then(|value| {
            let value = spec.scale.map_or(value, |scale| value * scale);
            if value.is_finite() {
                Ok(value)
            } else {
                Err(SourceFailure::Malformed(format!("non-finite value {value}")))
            }
        });

        match outcome {
            Ok(value) => {
                tally.source_success(source_id);
                return Resolution::Sourced(Observation::sourced(key, &spec.id, value, source_id));
            }
            Err(failure) => {
                debug!(source = source_id, indicator = %spec.id, iso3 = %key.iso3, year = key.year, reason = failure.reason(), "source miss");
                tally.source_failure(source_id, failure.reason());
            }
        }
    }
    Resolution::Unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticSource;
    use crate::domain::{Direction, SourceRef};

    fn spec(sources: &[&str]) -> IndicatorSpec {
        IndicatorSpec {
            id: "a".into(),
            name: "A".into(),
            pillar: None,
            direction: Direction::HigherIsWorse,
            base_weight: 1.0,
            source_priority: sources.iter().map(|s| SourceRef::new(s, None)).collect(),
            imputation_chain: Vec::new(),
            lookback_years: None,
            bounds: None,
            scale: None,
        }
    }

    #[test]
    fn falls_through_to_first_source_with_a_value() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(StaticSource::disabled("primary")));
        registry.register(Box::new(StaticSource::new("secondary").with_value("a", "USA", 2023, 4.0)));
        registry.register(Box::new(StaticSource::new("tertiary").with_value("a", "USA", 2023, 9.0)));

        let mut tally = RunTally::new();
        let key = PanelKey::new("USA", 2023);
        let resolution = resolve(&key, &spec(&["primary", "secondary", "tertiary"]), &registry, &mut tally);

        let Resolution::Sourced(obs) = resolution else {
            panic!("expected a sourced value");
        };
        assert_eq!(obs.raw_value, 4.0);
        assert_eq!(obs.source_id(), Some("secondary"));
        assert_eq!(tally.sources["primary"].failure_reasons["disabled"], 1);
        assert_eq!(tally.sources["secondary"].successes, 1);
        assert!(!tally.sources.contains_key("tertiary"));
    }

    #[test]
    fn catalog_scale_applies_to_sourced_value() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(StaticSource::new("primary").with_value("a", "USA", 2023, 0.25)));

        let mut spec = spec(&["primary"]);
        spec.scale = Some(100.0);
        let mut tally = RunTally::new();
        let Resolution::Sourced(obs) = resolve(&PanelKey::new("USA", 2023), &spec, &registry, &mut tally) else {
            panic!("expected a sourced value");
        };
        assert_eq!(obs.raw_value, 25.0);
    }

    #[test]
    fn unregistered_and_missing_sources_leave_key_unresolved() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(StaticSource::new("present").with_value("a", "USA", 2020, 1.0)));

        let mut tally = RunTally::new();
        let key = PanelKey::new("USA", 2023);
        let resolution = resolve(&key, &spec(&["ghost", "present"]), &registry, &mut tally);

        assert_eq!(resolution, Resolution::Unresolved);
        assert_eq!(tally.sources["ghost"].failure_reasons[UNREGISTERED], 1);
        assert_eq!(tally.sources["present"].failure_reasons["missing"], 1);
    }
}
