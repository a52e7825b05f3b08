mod allocation;
mod error;
mod projector;
mod returns;
mod types;

pub use allocation::{
    AllocationPolicy, Asset, DEFAULT_BOND_ASSET, MAX_AGE, MIN_AGE, TiltConfig, UNIVERSE, allocate,
};
pub use error::EngineError;
pub use projector::{
    CompoundingProjector, FALLBACK_MONTHLY_RETURN, MAX_HORIZON_MONTHS, SAMPLE_INTERVAL_MONTHS,
    annualized_return_equivalent, compound_trajectory, sample_count,
};
pub use returns::{ReturnSource, StaticReturns, blend_expected_return};
pub use types::{
    AssetClass, AssetWeight, AssetWeightVector, BlendedReturn, ContributionTiming,
    ExpectedReturn, Projection, ProjectionSummary, ProjectionWarning, ReturnBasis, RiskTier,
    Trajectory, TrajectoryPoint, WEIGHT_TOLERANCE,
};
