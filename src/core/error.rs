use thiserror::Error;

use super::allocation::{MAX_AGE, MIN_AGE};
use super::projector::MAX_HORIZON_MONTHS;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unrecognized risk tier '{0}'")]
    InvalidTier(String),

    #[error("age {0} is outside the supported range {min}..={max}", min = MIN_AGE, max = MAX_AGE)]
    InvalidAge(u32),

    #[error("horizon must be between 1 and {max} months, got {0}", max = MAX_HORIZON_MONTHS)]
    InvalidHorizon(u32),

    #[error("monthly contribution must be finite and >= 0, got {0}")]
    InvalidContribution(f64),

    #[error("expected monthly return must be finite, got {0}")]
    InvalidReturn(f64),

    #[error("invalid weight vector: {0}")]
    InvalidWeights(String),

    #[error("invalid age tilt configuration: {0}")]
    InvalidTiltConfig(String),
}
