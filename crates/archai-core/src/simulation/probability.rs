//! Completion-probability model and forecast grading.

use crate::config::{RiskFactors, SimulationConfig};
use crate::models::{ForecastStatus, RiskLevel};

/// Under `strict`, missing evidence is planned for as the worst case.
pub fn effective_risk(level: RiskLevel, strict: bool) -> RiskLevel {
    if strict && level == RiskLevel::Unknown {
        RiskLevel::High
    } else {
        level
    }
}

pub fn risk_factor(level: RiskLevel, factors: &RiskFactors) -> f64 {
    match level {
        RiskLevel::Low => factors.low,
        RiskLevel::Medium => factors.medium,
        RiskLevel::High => factors.high,
        RiskLevel::Unknown => factors.unknown,
    }
}

/// `r(risk) * exp(-effort / (effort_scale * velocity))`, clamped to `[0, 1]`.
pub fn base_probability(level: RiskLevel, effort_hours: f64, config: &SimulationConfig) -> f64 {
    let scale = config.effort_scale_hours * config.velocity;
    if scale <= 0.0 || !effort_hours.is_finite() {
        return 0.0;
    }
    let p = risk_factor(level, &config.risk_factors) * (-effort_hours.max(0.0) / scale).exp();
    p.clamp(0.0, 1.0)
}

/// Weighted mean of `(weight, value)` pairs; `None` when no weight is
/// positive.
pub fn weighted_mean(items: impl IntoIterator<Item = (f64, f64)>) -> Option<f64> {
    let (total, weighted) = items
        .into_iter()
        .filter(|(w, _)| *w > 0.0)
        .fold((0.0, 0.0), |(t, s), (w, v)| (t + w, s + w * v));
    (total > 0.0).then(|| weighted / total)
}

pub fn forecast_status(confidence: f64, config: &SimulationConfig) -> ForecastStatus {
    if confidence >= config.on_track_confidence {
        ForecastStatus::OnTrack
    } else if confidence >= config.at_risk_confidence {
        ForecastStatus::AtRisk
    } else {
        ForecastStatus::OffTrack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_orders_by_risk() {
        let config = SimulationConfig::default();
        let low = base_probability(RiskLevel::Low, 8.0, &config);
        let medium = base_probability(RiskLevel::Medium, 8.0, &config);
        let unknown = base_probability(RiskLevel::Unknown, 8.0, &config);
        let high = base_probability(RiskLevel::High, 8.0, &config);
        assert!(low > medium && medium > unknown && unknown > high);
        assert!((low - 0.95 * (-0.2f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_probability_decreases_with_effort_and_stays_bounded() {
        let config = SimulationConfig::default();
        let small = base_probability(RiskLevel::Low, 1.0, &config);
        let large = base_probability(RiskLevel::Low, 40.0, &config);
        assert!(small > large);
        assert!((0.0..=1.0).contains(&large));
        let broken = SimulationConfig {
            velocity: 0.0,
            ..SimulationConfig::default()
        };
        assert_eq!(base_probability(RiskLevel::Low, 1.0, &broken), 0.0);
    }

    #[test]
    fn test_strict_maps_unknown_to_high() {
        assert_eq!(effective_risk(RiskLevel::Unknown, true), RiskLevel::High);
        assert_eq!(effective_risk(RiskLevel::Unknown, false), RiskLevel::Unknown);
        assert_eq!(effective_risk(RiskLevel::Low, true), RiskLevel::Low);
    }

    #[test]
    fn test_weighted_mean() {
        assert_eq!(weighted_mean([(1.0, 1.0), (3.0, 0.0)]), Some(0.25));
        assert_eq!(weighted_mean([(0.0, 1.0)]), None);
    }

    #[test]
    fn test_forecast_status_thresholds() {
        let config = SimulationConfig::default();
        assert_eq!(forecast_status(0.8, &config), ForecastStatus::OnTrack);
        assert_eq!(forecast_status(0.5, &config), ForecastStatus::AtRisk);
        assert_eq!(forecast_status(0.1, &config), ForecastStatus::OffTrack);
    }
}
