//! Signal aggregation: structural, historical and quality components folded
//! into one raw score in `[0, 100]`.

use crate::config::RiskConfig;

/// A single contributing signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    FanIn,
    Reach,
    Span,
    Churn,
    Defects,
    Untested,
    Undocumented,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::FanIn => "fan_in",
            Signal::Reach => "reach",
            Signal::Span => "span",
            Signal::Churn => "churn",
            Signal::Defects => "defects",
            Signal::Untested => "untested",
            Signal::Undocumented => "undocumented",
        }
    }
}

/// Raw observations about one target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalInputs {
    /// Distinct direct callers.
    pub fan_in: usize,
    /// Sum of `1 / depth` over every affected component.
    pub reach: f64,
    pub line_span: u32,
    pub churn: u32,
    pub defect_history: bool,
    pub untested: bool,
    pub undocumented: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SignalScores {
    pub structural: f64,
    pub historical: f64,
    pub quality: f64,
    pub raw_score: f64,
    /// Points each signal adds to `raw_score`, largest first.
    pub contributions: Vec<(Signal, f64)>,
}

impl SignalScores {
    pub fn dominant(&self) -> Option<Signal> {
        self.contributions
            .first()
            .filter(|(_, points)| *points > 0.0)
            .map(|(signal, _)| *signal)
    }
}

/// `1 - exp(-x / scale)`: zero at zero, approaching one, monotone in `x`.
pub fn saturate(x: f64, scale: f64) -> f64 {
    let x = x.max(0.0);
    if scale <= 0.0 {
        return if x > 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - (-x / scale).exp()
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Normalized weights; all zero when the weights sum to zero.
fn shares<const N: usize>(weights: [f64; N]) -> [f64; N] {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return [0.0; N];
    }
    weights.map(|w| w / total)
}

pub fn score(inputs: &SignalInputs, config: &RiskConfig) -> SignalScores {
    let s = &config.structural;
    let h = &config.historical;
    let q = &config.quality;

    let structural_values = [
        (Signal::FanIn, saturate(inputs.fan_in as f64, s.fan_in_scale)),
        (Signal::Reach, saturate(inputs.reach, s.reach_scale)),
        (Signal::Span, saturate(inputs.line_span as f64, s.span_scale)),
    ];
    let historical_values = [
        (Signal::Churn, saturate(inputs.churn as f64, h.churn_scale)),
        (Signal::Defects, flag(inputs.defect_history)),
    ];
    let quality_values = [
        (Signal::Untested, flag(inputs.untested)),
        (Signal::Undocumented, flag(inputs.undocumented)),
    ];

    let structural_shares = shares([s.fan_in, s.reach, s.span]);
    let historical_shares = shares([h.churn, h.defects]);
    let quality_shares = shares([q.untested, q.undocumented]);
    let [ws, wh, wq] = shares([
        config.weights.structural,
        config.weights.historical,
        config.weights.quality,
    ]);

    let mut contributions = Vec::with_capacity(7);
    let mut component = |values: &[(Signal, f64)], split: &[f64], weight: f64| -> f64 {
        let mut total = 0.0;
        for ((signal, value), share) in values.iter().zip(split) {
            total += share * value;
            contributions.push((*signal, 100.0 * weight * share * value));
        }
        total
    };
    let structural = component(&structural_values[..], &structural_shares[..], ws);
    let historical = component(&historical_values[..], &historical_shares[..], wh);
    let quality = component(&quality_values[..], &quality_shares[..], wq);

    contributions.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let raw_score = (100.0 * (ws * structural + wh * historical + wq * quality)).clamp(0.0, 100.0);

    SignalScores {
        structural,
        historical,
        quality,
        raw_score,
        contributions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(fan_in: usize) -> SignalInputs {
        SignalInputs {
            fan_in,
            reach: fan_in as f64,
            line_span: 30,
            churn: 3,
            defect_history: false,
            untested: true,
            undocumented: false,
        }
    }

    #[test]
    fn test_saturate_bounds() {
        assert_eq!(saturate(0.0, 4.0), 0.0);
        assert!(saturate(1000.0, 4.0) <= 1.0);
        assert!(saturate(2.0, 4.0) < saturate(3.0, 4.0));
        assert_eq!(saturate(-5.0, 4.0), 0.0);
        assert_eq!(saturate(1.0, 0.0), 1.0);
    }

    #[test]
    fn test_score_monotone_in_fan_in() {
        let config = RiskConfig::default();
        let mut previous = 0.0;
        for fan_in in 0..20 {
            let scores = score(&inputs(fan_in), &config);
            assert!(scores.raw_score >= previous);
            assert!((0.0..=100.0).contains(&scores.raw_score));
            previous = scores.raw_score;
        }
    }

    #[test]
    fn test_contributions_sum_to_raw_score() {
        let scores = score(&inputs(5), &RiskConfig::default());
        let total: f64 = scores.contributions.iter().map(|(_, p)| p).sum();
        assert!((total - scores.raw_score).abs() < 1e-9);
        assert_eq!(scores.dominant(), Some(Signal::FanIn));
    }

    #[test]
    fn test_zero_weights_score_zero() {
        let mut config = RiskConfig::default();
        config.weights.structural = 0.0;
        config.weights.historical = 0.0;
        config.weights.quality = 0.0;
        let scores = score(&inputs(5), &config);
        assert_eq!(scores.raw_score, 0.0);
        assert_eq!(scores.dominant(), None);
    }
}
