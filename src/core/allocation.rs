use serde::Serialize;
use tracing::debug;

use super::error::EngineError;
use super::types::{AssetClass, AssetWeight, AssetWeightVector, RiskTier, WEIGHT_TOLERANCE};

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 80;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Asset {
    pub ticker: &'static str,
    pub role: &'static str,
    pub class: AssetClass,
}

pub const BROAD_MARKET_ETF: Asset = Asset {
    ticker: "0050.TW",
    role: "broad-market ETF",
    class: AssetClass::Equity,
};

pub const DIVIDEND_ETF: Asset = Asset {
    ticker: "0056.TW",
    role: "dividend ETF",
    class: AssetClass::Equity,
};

pub const GLOBAL_EQUITY_ETF: Asset = Asset {
    ticker: "VT",
    role: "global-equity ETF",
    class: AssetClass::Equity,
};

pub const BOND_ETF: Asset = Asset {
    ticker: "BND",
    role: "bond ETF",
    class: AssetClass::Bond,
};

pub const HIGH_VOLATILITY_STOCK: Asset = Asset {
    ticker: "TSLA",
    role: "high-volatility stock",
    class: AssetClass::Equity,
};

pub const UNIVERSE: [Asset; 5] = [
    BROAD_MARKET_ETF,
    DIVIDEND_ETF,
    GLOBAL_EQUITY_ETF,
    BOND_ETF,
    HIGH_VOLATILITY_STOCK,
];

/// Receives the tilted weight when a tier holds no bond-class asset.
pub const DEFAULT_BOND_ASSET: Asset = BOND_ETF;

fn base_weights(tier: RiskTier) -> &'static [(Asset, f64)] {
    match tier {
        RiskTier::Conservative => &[(BROAD_MARKET_ETF, 0.2), (DIVIDEND_ETF, 0.4), (BOND_ETF, 0.4)],
        RiskTier::Moderate => &[(BROAD_MARKET_ETF, 0.4), (DIVIDEND_ETF, 0.3), (BOND_ETF, 0.3)],
        RiskTier::Balanced => &[
            (BROAD_MARKET_ETF, 0.5),
            (DIVIDEND_ETF, 0.2),
            (GLOBAL_EQUITY_ETF, 0.2),
            (BOND_ETF, 0.1),
        ],
        RiskTier::Growth => &[(BROAD_MARKET_ETF, 0.6), (GLOBAL_EQUITY_ETF, 0.3), (BOND_ETF, 0.1)],
        RiskTier::Aggressive => &[
            (BROAD_MARKET_ETF, 0.4),
            (GLOBAL_EQUITY_ETF, 0.4),
            (HIGH_VOLATILITY_STOCK, 0.2),
        ],
    }
}

/// Age-based de-risking. Past `pivot_age`, each year moves `points_per_year`
/// percentage points of weight from equities to bonds, bounded by
/// `equity_floor` and `bond_cap` (both fractions of the portfolio).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TiltConfig {
    pub pivot_age: u32,
    pub points_per_year: f64,
    pub equity_floor: f64,
    pub bond_cap: f64,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            pivot_age: 30,
            points_per_year: 0.5,
            equity_floor: 0.10,
            bond_cap: 0.80,
        }
    }
}

impl TiltConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.points_per_year.is_finite() || self.points_per_year < 0.0 {
            return Err(EngineError::InvalidTiltConfig(format!(
                "points per year must be finite and >= 0, got {}",
                self.points_per_year
            )));
        }

        for (name, value) in [("equity floor", self.equity_floor), ("bond cap", self.bond_cap)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidTiltConfig(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }

        // The tilt only moves weight toward bonds, so a base table already
        // outside the bounds could never be brought back inside them.
        for tier in RiskTier::ALL {
            let table = base_weights(tier);
            let equity = base_class_total(table, AssetClass::Equity);
            let bond = base_class_total(table, AssetClass::Bond);
            if equity + WEIGHT_TOLERANCE < self.equity_floor {
                return Err(EngineError::InvalidTiltConfig(format!(
                    "equity floor {} is above the {tier} base equity share {equity}",
                    self.equity_floor
                )));
            }
            if bond > self.bond_cap + WEIGHT_TOLERANCE {
                return Err(EngineError::InvalidTiltConfig(format!(
                    "bond cap {} is below the {tier} base bond share {bond}",
                    self.bond_cap
                )));
            }
        }

        Ok(())
    }

    /// Requested shift as a portfolio fraction, before floor/cap limits.
    pub fn shift_for_age(&self, age: u32) -> f64 {
        let years_past_pivot = f64::from(age.saturating_sub(self.pivot_age));
        (years_past_pivot * self.points_per_year / 100.0).max(0.0)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AllocationPolicy {
    tilt: TiltConfig,
}

impl AllocationPolicy {
    pub fn new(tilt: TiltConfig) -> Result<Self, EngineError> {
        tilt.validate()?;
        Ok(Self { tilt })
    }

    pub fn tilt(&self) -> TiltConfig {
        self.tilt
    }

    pub fn allocate(&self, tier: RiskTier, age: u32) -> Result<AssetWeightVector, EngineError> {
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(EngineError::InvalidAge(age));
        }

        let mut entries = base_weights(tier)
            .iter()
            .map(|(asset, weight)| AssetWeight::new(asset.ticker, asset.class, *weight))
            .collect::<Vec<_>>();
        let shift = apply_age_tilt(&mut entries, &self.tilt, age);

        let weights = AssetWeightVector::normalized(entries)?;
        debug!(
            %tier,
            age,
            shift,
            equity = weights.equity_share(),
            bond = weights.bond_share(),
            "allocated target weights"
        );
        Ok(weights)
    }
}

pub fn allocate(tier: RiskTier, age: u32) -> Result<AssetWeightVector, EngineError> {
    AllocationPolicy::default().allocate(tier, age)
}

fn base_class_total(table: &[(Asset, f64)], class: AssetClass) -> f64 {
    table
        .iter()
        .filter(|(asset, _)| asset.class == class)
        .map(|(_, weight)| weight)
        .sum()
}

fn class_total(entries: &[AssetWeight], class: AssetClass) -> f64 {
    entries
        .iter()
        .filter(|entry| entry.class() == class)
        .map(|entry| entry.weight())
        .sum()
}

/// Returns the shift actually applied. It is the requested shift limited by
/// the equity headroom above the floor and the bond headroom below the cap,
/// so the total weight is unchanged.
fn apply_age_tilt(entries: &mut Vec<AssetWeight>, tilt: &TiltConfig, age: u32) -> f64 {
    let requested = tilt.shift_for_age(age);
    if requested <= 0.0 {
        return 0.0;
    }

    let equity = class_total(entries, AssetClass::Equity);
    let bond = class_total(entries, AssetClass::Bond);
    let shift = requested
        .min((equity - tilt.equity_floor).max(0.0))
        .min((tilt.bond_cap - bond).max(0.0));
    if shift <= 0.0 {
        return 0.0;
    }

    let equity_scale = (equity - shift) / equity;
    for entry in entries.iter_mut() {
        if entry.class() == AssetClass::Equity {
            entry.scale(equity_scale);
        }
    }

    if bond > 0.0 {
        let bond_scale = (bond + shift) / bond;
        for entry in entries.iter_mut() {
            if entry.class() == AssetClass::Bond {
                entry.scale(bond_scale);
            }
        }
    } else {
        entries.push(AssetWeight::new(
            DEFAULT_BOND_ASSET.ticker,
            DEFAULT_BOND_ASSET.class,
            shift,
        ));
    }

    shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = crate::core::WEIGHT_TOLERANCE;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn base_tables_sum_to_one_and_cover_universe() {
        for tier in RiskTier::ALL {
            let total: f64 = base_weights(tier).iter().map(|(_, w)| w).sum();
            assert_approx(total, 1.0);
            for (asset, _) in base_weights(tier) {
                assert!(UNIVERSE.contains(asset), "{} not in universe", asset.ticker);
            }
        }
    }

    #[test]
    fn aggressive_at_pivot_age_keeps_base_weights() {
        let weights = allocate(RiskTier::Aggressive, 30).expect("valid allocation");

        assert_eq!(weights.len(), 3);
        assert_approx(weights.get("0050.TW").unwrap_or_default(), 0.4);
        assert_approx(weights.get("VT").unwrap_or_default(), 0.4);
        assert_approx(weights.get("TSLA").unwrap_or_default(), 0.2);
        assert_eq!(weights.get("BND"), None);
    }

    #[test]
    fn conservative_holds_more_bonds_than_aggressive() {
        let conservative = allocate(RiskTier::Conservative, 30).expect("valid allocation");
        let aggressive = allocate(RiskTier::Aggressive, 30).expect("valid allocation");

        assert!(conservative.bond_share() > aggressive.bond_share());
    }

    #[test]
    fn bond_share_rises_with_tier_conservatism() {
        let shares = RiskTier::ALL
            .iter()
            .map(|tier| allocate(*tier, 30).expect("valid allocation").bond_share())
            .collect::<Vec<_>>();

        for pair in shares.windows(2) {
            assert!(pair[0] >= pair[1], "bond shares not ordered: {shares:?}");
        }
    }

    #[test]
    fn tilt_moves_half_point_per_year_past_pivot() {
        // Growth: equity 0.9, bond 0.1. Age 50 -> 20 years * 0.5pt = 10pt.
        let weights = allocate(RiskTier::Growth, 50).expect("valid allocation");

        assert_approx(weights.bond_share(), 0.2);
        assert_approx(weights.equity_share(), 0.8);
        // Equity sleeve shrinks proportionally: 0.6 * 0.8 / 0.9 and 0.3 * 0.8 / 0.9.
        assert_approx(weights.get("0050.TW").unwrap_or_default(), 0.6 * 0.8 / 0.9);
        assert_approx(weights.get("VT").unwrap_or_default(), 0.3 * 0.8 / 0.9);
    }

    #[test]
    fn tilt_adds_default_bond_when_tier_has_none() {
        let weights = allocate(RiskTier::Aggressive, 60).expect("valid allocation");

        assert_approx(weights.get(DEFAULT_BOND_ASSET.ticker).unwrap_or_default(), 0.15);
        assert_approx(weights.equity_share(), 0.85);
        assert_approx(weights.total(), 1.0);
    }

    #[test]
    fn tilt_respects_bond_cap() {
        let policy = AllocationPolicy::new(TiltConfig {
            points_per_year: 5.0,
            ..TiltConfig::default()
        })
        .expect("valid tilt");

        let weights = policy
            .allocate(RiskTier::Conservative, 80)
            .expect("valid allocation");
        assert_approx(weights.bond_share(), 0.8);
        assert_approx(weights.equity_share(), 0.2);
    }

    #[test]
    fn tilt_respects_equity_floor() {
        let policy = AllocationPolicy::new(TiltConfig {
            points_per_year: 5.0,
            equity_floor: 0.3,
            bond_cap: 1.0,
            ..TiltConfig::default()
        })
        .expect("valid tilt");

        let weights = policy
            .allocate(RiskTier::Conservative, 80)
            .expect("valid allocation");
        assert_approx(weights.equity_share(), 0.3);
        assert_approx(weights.bond_share(), 0.7);
    }

    #[test]
    fn zero_rate_tilt_never_shifts() {
        let policy = AllocationPolicy::new(TiltConfig {
            points_per_year: 0.0,
            ..TiltConfig::default()
        })
        .expect("valid tilt");

        let young = policy.allocate(RiskTier::Balanced, 18).expect("valid");
        let old = policy.allocate(RiskTier::Balanced, 80).expect("valid");
        assert_eq!(young, old);
    }

    #[test]
    fn allocate_rejects_out_of_range_age() {
        assert_eq!(
            allocate(RiskTier::Balanced, 17),
            Err(EngineError::InvalidAge(17))
        );
        assert_eq!(
            allocate(RiskTier::Balanced, 81),
            Err(EngineError::InvalidAge(81))
        );
        assert!(allocate(RiskTier::Balanced, MIN_AGE).is_ok());
        assert!(allocate(RiskTier::Balanced, MAX_AGE).is_ok());
    }

    #[test]
    fn policy_rejects_invalid_tilt() {
        let negative_rate = TiltConfig {
            points_per_year: -1.0,
            ..TiltConfig::default()
        };
        assert!(matches!(
            AllocationPolicy::new(negative_rate),
            Err(EngineError::InvalidTiltConfig(_))
        ));

        let cap_above_one = TiltConfig {
            bond_cap: 1.5,
            ..TiltConfig::default()
        };
        assert!(matches!(
            AllocationPolicy::new(cap_above_one),
            Err(EngineError::InvalidTiltConfig(_))
        ));
    }

    #[test]
    fn policy_rejects_bounds_a_base_table_already_breaches() {
        // Conservative starts at 40% bonds, so a 20% cap cannot hold.
        let tight_cap = TiltConfig {
            bond_cap: 0.2,
            ..TiltConfig::default()
        };
        let err = AllocationPolicy::new(tight_cap).expect_err("cap below base bond share");
        assert!(err.to_string().contains("conservative"), "{err}");

        // Conservative starts at 60% equities, so a 90% floor cannot hold.
        let high_floor = TiltConfig {
            equity_floor: 0.9,
            ..TiltConfig::default()
        };
        assert!(matches!(
            AllocationPolicy::new(high_floor),
            Err(EngineError::InvalidTiltConfig(_))
        ));

        // Bounds equal to the extreme base shares are still accepted.
        let at_limits = TiltConfig {
            equity_floor: 0.6,
            bond_cap: 0.4,
            ..TiltConfig::default()
        };
        assert!(AllocationPolicy::new(at_limits).is_ok());
    }

    #[test]
    fn shift_for_age_is_zero_before_pivot() {
        let tilt = TiltConfig::default();
        assert_approx(tilt.shift_for_age(18), 0.0);
        assert_approx(tilt.shift_for_age(30), 0.0);
        assert_approx(tilt.shift_for_age(31), 0.005);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_weights_sum_to_one_and_are_non_negative(
            tier_idx in 0usize..5,
            age in MIN_AGE..=MAX_AGE,
            pivot_age in 18u32..70,
            points_bp in 0u32..500,
            floor_pct in 0u32..40,
            cap_pct in 50u32..101
        ) {
            let policy = AllocationPolicy::new(TiltConfig {
                pivot_age,
                points_per_year: f64::from(points_bp) / 100.0,
                equity_floor: f64::from(floor_pct) / 100.0,
                bond_cap: f64::from(cap_pct) / 100.0,
            })
            .expect("valid tilt");
            let weights = policy.allocate(RiskTier::ALL[tier_idx], age).expect("valid allocation");

            prop_assert!((weights.total() - 1.0).abs() <= EPS);
            prop_assert!(weights.iter().all(|entry| entry.weight() >= 0.0));
            prop_assert!(weights.bond_share() <= policy.tilt().bond_cap + EPS);
            prop_assert!(weights.equity_share() + EPS >= policy.tilt().equity_floor);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_equity_share_never_rises_with_age(
            tier_idx in 0usize..5,
            younger in MIN_AGE..=MAX_AGE,
            extra_years in 0u32..63
        ) {
            let older = (younger + extra_years).min(MAX_AGE);
            let tier = RiskTier::ALL[tier_idx];
            let young_weights = allocate(tier, younger).expect("valid allocation");
            let old_weights = allocate(tier, older).expect("valid allocation");

            prop_assert!(old_weights.equity_share() <= young_weights.equity_share() + EPS);
            prop_assert!(old_weights.bond_share() <= TiltConfig::default().bond_cap + EPS);
        }
    }
}
