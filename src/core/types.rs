use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::error::EngineError;

pub const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskTier {
    Conservative,
    Moderate,
    Balanced,
    Growth,
    Aggressive,
}

impl RiskTier {
    pub const ALL: [RiskTier; 5] = [
        RiskTier::Conservative,
        RiskTier::Moderate,
        RiskTier::Balanced,
        RiskTier::Growth,
        RiskTier::Aggressive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Conservative => "conservative",
            RiskTier::Moderate => "moderate",
            RiskTier::Balanced => "balanced",
            RiskTier::Growth => "growth",
            RiskTier::Aggressive => "aggressive",
        }
    }

    /// Investor profile the tier is meant for.
    pub fn description(self) -> &'static str {
        match self {
            RiskTier::Conservative => "Stable cash flow from dividends and low-volatility bonds",
            RiskTier::Moderate => "Steady income first, with a measured growth sleeve",
            RiskTier::Balanced => "Growth and stability weighted evenly",
            RiskTier::Growth => "Long-term capital appreciation with a small bond cushion",
            RiskTier::Aggressive => "Maximum long-term appreciation, accepting high volatility",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the canonical names in any case, plus the dashboard labels the
/// tiers were originally offered under. Anything else is rejected.
impl FromStr for RiskTier {
    type Err = EngineError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let normalized = label.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "conservative" | "保守" => Ok(RiskTier::Conservative),
            "moderate" | "穩健" => Ok(RiskTier::Moderate),
            "balanced" | "平衡" | "中性" => Ok(RiskTier::Balanced),
            "growth" | "積極" => Ok(RiskTier::Growth),
            "aggressive" | "極進取" => Ok(RiskTier::Aggressive),
            _ => Err(EngineError::InvalidTier(label.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equity,
    Bond,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributionTiming {
    /// Grow the balance, then add the month's contribution.
    EndOfPeriod,
    /// Add the month's contribution, then grow the balance.
    BeginningOfPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetWeight {
    ticker: String,
    class: AssetClass,
    weight: f64,
}

impl AssetWeight {
    pub fn new(ticker: impl Into<String>, class: AssetClass, weight: f64) -> Self {
        Self {
            ticker: ticker.into(),
            class,
            weight,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn class(&self) -> AssetClass {
        self.class
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub(crate) fn scale(&mut self, factor: f64) {
        self.weight *= factor;
    }
}

/// Target allocation over a set of tickers. Only constructible through
/// [`AssetWeightVector::normalized`], so every instance sums to one and holds
/// no negative weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AssetWeightVector {
    entries: Vec<AssetWeight>,
}

impl AssetWeightVector {
    pub fn normalized(entries: Vec<AssetWeight>) -> Result<Self, EngineError> {
        if entries.is_empty() {
            return Err(EngineError::InvalidWeights(
                "at least one asset is required".to_string(),
            ));
        }

        for (idx, entry) in entries.iter().enumerate() {
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                return Err(EngineError::InvalidWeights(format!(
                    "weight for {} must be finite and >= 0, got {}",
                    entry.ticker, entry.weight
                )));
            }
            if entries[..idx].iter().any(|prev| prev.ticker == entry.ticker) {
                return Err(EngineError::InvalidWeights(format!(
                    "duplicate ticker {}",
                    entry.ticker
                )));
            }
        }

        let total: f64 = entries.iter().map(|entry| entry.weight).sum();
        if total <= 0.0 {
            return Err(EngineError::InvalidWeights(
                "weights must not all be zero".to_string(),
            ));
        }

        let mut entries = entries;
        for entry in &mut entries {
            entry.scale(1.0 / total);
        }
        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetWeight> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.ticker == ticker)
            .map(|entry| entry.weight)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|entry| entry.weight).sum()
    }

    pub fn class_share(&self, class: AssetClass) -> f64 {
        self.entries
            .iter()
            .filter(|entry| entry.class == class)
            .map(|entry| entry.weight)
            .sum()
    }

    pub fn equity_share(&self) -> f64 {
        self.class_share(AssetClass::Equity)
    }

    pub fn bond_share(&self) -> f64 {
        self.class_share(AssetClass::Bond)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlendedReturn {
    pub monthly: f64,
    /// Fraction of portfolio weight that had a usable estimate.
    pub coverage: f64,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedReturn {
    Historical(BlendedReturn),
    Provided(f64),
    Unavailable,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnBasis {
    Historical,
    Provided,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProjectionWarning {
    #[serde(rename_all = "camelCase")]
    DataUnavailableFallbackUsed { fallback_monthly_return: f64 },
    #[serde(rename_all = "camelCase")]
    PartialReturnCoverage { coverage: f64, missing: Vec<String> },
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryPoint {
    pub month: u32,
    pub years: f64,
    pub value: f64,
}

impl TrajectoryPoint {
    pub fn new(month: u32, value: f64) -> Self {
        Self {
            month,
            years: f64::from(month) / 12.0,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Trajectory {
    points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub(crate) fn from_points(points: Vec<TrajectoryPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    pub fn final_value(&self) -> f64 {
        self.points.last().map_or(0.0, |point| point.value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub monthly_return: f64,
    pub annualized_return_equivalent: f64,
    pub total_contributed: f64,
    pub final_value: f64,
    pub total_growth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub weights: AssetWeightVector,
    pub contribution_timing: ContributionTiming,
    pub monthly_contribution: f64,
    pub horizon_months: u32,
    pub trajectory: Trajectory,
    pub summary: ProjectionSummary,
    pub return_basis: ReturnBasis,
    pub fallback_used: bool,
    pub return_coverage: Option<f64>,
    pub warnings: Vec<ProjectionWarning>,
}
