use tracing::{debug, warn};

use super::error::EngineError;
use super::types::{
    AssetWeightVector, ContributionTiming, ExpectedReturn, Projection, ProjectionSummary,
    ProjectionWarning, ReturnBasis, Trajectory, TrajectoryPoint,
};

/// Substituted when no return estimate could be produced (0.5% per month).
pub const FALLBACK_MONTHLY_RETURN: f64 = 0.005;
pub const SAMPLE_INTERVAL_MONTHS: u32 = 12;
/// Longest supported horizon (100 years).
pub const MAX_HORIZON_MONTHS: u32 = 1200;

const COVERAGE_EPS: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CompoundingProjector {
    timing: ContributionTiming,
    fallback_monthly_return: f64,
}

impl Default for CompoundingProjector {
    fn default() -> Self {
        Self::new(ContributionTiming::EndOfPeriod)
    }
}

#[derive(Debug)]
struct ResolvedReturn {
    monthly: f64,
    basis: ReturnBasis,
    coverage: Option<f64>,
    warnings: Vec<ProjectionWarning>,
}

impl CompoundingProjector {
    pub fn new(timing: ContributionTiming) -> Self {
        Self {
            timing,
            fallback_monthly_return: FALLBACK_MONTHLY_RETURN,
        }
    }

    pub fn with_fallback_return(mut self, monthly_return: f64) -> Self {
        self.fallback_monthly_return = monthly_return;
        self
    }

    pub fn timing(&self) -> ContributionTiming {
        self.timing
    }

    pub fn project(
        &self,
        weights: &AssetWeightVector,
        expected: &ExpectedReturn,
        monthly_contribution: f64,
        horizon_months: u32,
    ) -> Result<Projection, EngineError> {
        check_horizon(horizon_months)?;
        if !monthly_contribution.is_finite() || monthly_contribution < 0.0 {
            return Err(EngineError::InvalidContribution(monthly_contribution));
        }

        let resolved = self.resolve_return(expected)?;
        let trajectory = compound_trajectory(
            resolved.monthly,
            monthly_contribution,
            horizon_months,
            self.timing,
        )?;

        let total_contributed = monthly_contribution * f64::from(horizon_months);
        let final_value = trajectory.final_value();
        let summary = ProjectionSummary {
            monthly_return: resolved.monthly,
            annualized_return_equivalent: annualized_return_equivalent(resolved.monthly),
            total_contributed,
            final_value,
            total_growth: final_value - total_contributed,
        };
        debug!(
            horizon_months,
            monthly_contribution,
            monthly_return = resolved.monthly,
            final_value,
            "projected trajectory"
        );

        Ok(Projection {
            weights: weights.clone(),
            contribution_timing: self.timing,
            monthly_contribution,
            horizon_months,
            trajectory,
            summary,
            return_basis: resolved.basis,
            fallback_used: resolved.basis == ReturnBasis::Fallback,
            return_coverage: resolved.coverage,
            warnings: resolved.warnings,
        })
    }

    fn resolve_return(&self, expected: &ExpectedReturn) -> Result<ResolvedReturn, EngineError> {
        let resolved = match expected {
            ExpectedReturn::Historical(blended) => {
                let mut warnings = Vec::new();
                if blended.coverage < 1.0 - COVERAGE_EPS {
                    warnings.push(ProjectionWarning::PartialReturnCoverage {
                        coverage: blended.coverage,
                        missing: blended.missing.clone(),
                    });
                }
                ResolvedReturn {
                    monthly: blended.monthly,
                    basis: ReturnBasis::Historical,
                    coverage: Some(blended.coverage),
                    warnings,
                }
            }
            ExpectedReturn::Provided(monthly) => ResolvedReturn {
                monthly: *monthly,
                basis: ReturnBasis::Provided,
                coverage: None,
                warnings: Vec::new(),
            },
            ExpectedReturn::Unavailable => {
                warn!(
                    fallback = self.fallback_monthly_return,
                    "return estimate unavailable, using fallback monthly return"
                );
                ResolvedReturn {
                    monthly: self.fallback_monthly_return,
                    basis: ReturnBasis::Fallback,
                    coverage: Some(0.0),
                    warnings: vec![ProjectionWarning::DataUnavailableFallbackUsed {
                        fallback_monthly_return: self.fallback_monthly_return,
                    }],
                }
            }
        };

        if !resolved.monthly.is_finite() {
            return Err(EngineError::InvalidReturn(resolved.monthly));
        }
        Ok(resolved)
    }
}

fn check_horizon(horizon_months: u32) -> Result<(), EngineError> {
    if (1..=MAX_HORIZON_MONTHS).contains(&horizon_months) {
        Ok(())
    } else {
        Err(EngineError::InvalidHorizon(horizon_months))
    }
}

pub fn annualized_return_equivalent(monthly_return: f64) -> f64 {
    (1.0 + monthly_return).powi(12) - 1.0
}

/// Number of samples a trajectory over `horizon_months` holds: month 0, every
/// sampling boundary, and the final month when it is off-boundary.
pub fn sample_count(horizon_months: u32) -> usize {
    let boundaries = (horizon_months / SAMPLE_INTERVAL_MONTHS) as usize;
    let tail = usize::from(horizon_months % SAMPLE_INTERVAL_MONTHS != 0);
    boundaries + 1 + tail
}

pub fn compound_trajectory(
    monthly_return: f64,
    monthly_contribution: f64,
    horizon_months: u32,
    timing: ContributionTiming,
) -> Result<Trajectory, EngineError> {
    check_horizon(horizon_months)?;
    let growth = 1.0 + monthly_return;
    let mut points = Vec::with_capacity(sample_count(horizon_months));
    let mut value = 0.0;
    points.push(TrajectoryPoint::new(0, value));

    for month in 1..=horizon_months {
        value = match timing {
            ContributionTiming::EndOfPeriod => value * growth + monthly_contribution,
            ContributionTiming::BeginningOfPeriod => (value + monthly_contribution) * growth,
        };
        if month % SAMPLE_INTERVAL_MONTHS == 0 || month == horizon_months {
            points.push(TrajectoryPoint::new(month, value));
        }
    }

    Ok(Trajectory::from_points(points))
}
