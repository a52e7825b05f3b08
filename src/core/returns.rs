use std::collections::BTreeMap;

use tracing::warn;

use super::types::{AssetWeightVector, BlendedReturn, ExpectedReturn};

/// Supplies a historical mean monthly return per ticker. `None` means the
/// estimate could not be produced, which is distinct from a 0% return.
pub trait ReturnSource {
    fn mean_monthly_return(&self, ticker: &str) -> Option<f64>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticReturns {
    returns: BTreeMap<String, f64>,
}

impl StaticReturns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: impl Into<String>, monthly_return: f64) -> Self {
        self.insert(ticker, monthly_return);
        self
    }

    pub fn insert(&mut self, ticker: impl Into<String>, monthly_return: f64) {
        self.returns.insert(ticker.into(), monthly_return);
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for StaticReturns {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut returns = Self::new();
        for (ticker, monthly_return) in iter {
            returns.insert(ticker, monthly_return);
        }
        returns
    }
}

impl ReturnSource for StaticReturns {
    fn mean_monthly_return(&self, ticker: &str) -> Option<f64> {
        self.returns.get(ticker).copied()
    }
}

/// Weight-sum of per-asset returns over the assets that have an estimate,
/// rescaled by the weight they cover. With no usable estimate at all the
/// result is [`ExpectedReturn::Unavailable`].
pub fn blend_expected_return(
    weights: &AssetWeightVector,
    source: &impl ReturnSource,
) -> ExpectedReturn {
    let mut weighted_sum = 0.0;
    let mut covered = 0.0;
    let mut missing = Vec::new();

    for entry in weights.iter() {
        match source
            .mean_monthly_return(entry.ticker())
            .filter(|r| r.is_finite())
        {
            Some(monthly_return) => {
                weighted_sum += monthly_return * entry.weight();
                covered += entry.weight();
            }
            None => missing.push(entry.ticker().to_string()),
        }
    }

    if covered <= 0.0 {
        warn!(?missing, "no return estimate available for any weighted asset");
        return ExpectedReturn::Unavailable;
    }

    if !missing.is_empty() {
        warn!(?missing, coverage = covered, "blending returns without some assets");
    }

    ExpectedReturn::Historical(BlendedReturn {
        monthly: weighted_sum / covered,
        coverage: covered.min(1.0),
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocate;
    use crate::core::types::{AssetClass, AssetWeight, RiskTier};

    const EPS: f64 = 1e-12;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn two_asset_weights() -> AssetWeightVector {
        AssetWeightVector::normalized(vec![
            AssetWeight::new("0050.TW", AssetClass::Equity, 0.6),
            AssetWeight::new("BND", AssetClass::Bond, 0.4),
        ])
        .expect("valid weights")
    }

    #[test]
    fn blend_is_weight_sum_when_every_asset_has_data() {
        let source = StaticReturns::new().with("0050.TW", 0.01).with("BND", 0.002);

        let ExpectedReturn::Historical(blended) = blend_expected_return(&two_asset_weights(), &source)
        else {
            panic!("expected a historical blend");
        };
        assert_approx(blended.monthly, 0.6 * 0.01 + 0.4 * 0.002);
        assert_approx(blended.coverage, 1.0);
        assert!(blended.missing.is_empty());
    }

    #[test]
    fn blend_rescales_over_covered_weight_and_reports_missing() {
        let source = StaticReturns::new().with("0050.TW", 0.01);

        let ExpectedReturn::Historical(blended) = blend_expected_return(&two_asset_weights(), &source)
        else {
            panic!("expected a historical blend");
        };
        assert_approx(blended.monthly, 0.01);
        assert_approx(blended.coverage, 0.6);
        assert_eq!(blended.missing, vec!["BND".to_string()]);
    }

    #[test]
    fn blend_ignores_non_finite_estimates() {
        let source = StaticReturns::new()
            .with("0050.TW", f64::NAN)
            .with("BND", 0.003);

        let ExpectedReturn::Historical(blended) = blend_expected_return(&two_asset_weights(), &source)
        else {
            panic!("expected a historical blend");
        };
        assert_approx(blended.monthly, 0.003);
        assert_eq!(blended.missing, vec!["0050.TW".to_string()]);
    }

    #[test]
    fn blend_without_any_data_is_unavailable() {
        let weights = allocate(RiskTier::Aggressive, 30).expect("valid allocation");
        let source = StaticReturns::new().with("UNRELATED", 0.02);

        assert_eq!(
            blend_expected_return(&weights, &source),
            ExpectedReturn::Unavailable
        );
    }

    #[test]
    fn static_returns_collects_from_pairs() {
        let source: StaticReturns = [("VT", 0.007), ("BND", 0.002)].into_iter().collect();

        assert_eq!(source.len(), 2);
        assert_eq!(source.mean_monthly_return("VT"), Some(0.007));
        assert_eq!(source.mean_monthly_return("TSLA"), None);
    }
}
