//! Error types for piecewise regression.
//!
//! Every failure surfaces as a [`RegressionError`]. Errors fall into four
//! categories (see [`ErrorCategory`]): configuration problems detected before
//! any computation, data problems detected during validation, solver problems
//! raised while fitting, and usage errors such as predicting before fitting.

/// Broad classification of a [`RegressionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid or incompatible parameters.
    Configuration,
    /// Malformed input data, splits or bounds.
    Data,
    /// Rank-deficient direct solve, infeasible or failed convex solve.
    Solver,
    /// The model was used in the wrong order.
    Usage,
}

/// Errors that can occur while configuring, fitting or evaluating a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegressionError {
    /// A parameter is out of range or cannot be parsed.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The options are individually valid but cannot be combined.
    #[error("Incompatible configuration: {0}")]
    IncompatibleConfiguration(String),

    /// An input array is empty.
    #[error("`{0}` must contain at least one value")]
    EmptyInput(&'static str),

    /// `x` and `y` have different lengths.
    #[error("x and y must have the same length (x: {x}, y: {y})")]
    LengthMismatch { x: usize, y: usize },

    /// An input contains NaN or infinity.
    #[error("`{name}` contains a non-finite value at index {index}")]
    NonFinite { name: &'static str, index: usize },

    /// A split point appears more than once.
    #[error("Split points are not unique: {0} appears more than once")]
    DuplicateSplit(f64),

    /// The lower bound exceeds the upper bound.
    #[error("Lower bound must be <= upper bound (lb: {lb}, ub: {ub})")]
    InvalidBounds { lb: f64, ub: f64 },

    /// The least-squares design does not have full column rank.
    #[error(
        "Design matrix is rank deficient (rank {rank} < {expected}){location}; the segment may have too few samples for the degree",
        location = .segment.map(|s| format!(" in segment {}", s)).unwrap_or_default()
    )]
    RankDeficient {
        rank: usize,
        expected: usize,
        segment: Option<usize>,
    },

    /// The convex solver proved the problem infeasible.
    #[error("Optimization problem is infeasible. Status: {0}")]
    Infeasible(String),

    /// The convex solver stopped without a usable solution.
    #[error("Solver did not find an optimal solution. Status: {0}")]
    SolverFailed(String),

    /// `predict` was called before a successful `fit`.
    #[error("This PiecewiseRegression instance is not fitted yet. Call `fit` with appropriate arguments.")]
    NotFitted,
}

impl RegressionError {
    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RegressionError::InvalidParameter(_) | RegressionError::IncompatibleConfiguration(_) => {
                ErrorCategory::Configuration
            }
            RegressionError::EmptyInput(_)
            | RegressionError::LengthMismatch { .. }
            | RegressionError::NonFinite { .. }
            | RegressionError::DuplicateSplit(_)
            | RegressionError::InvalidBounds { .. } => ErrorCategory::Data,
            RegressionError::RankDeficient { .. }
            | RegressionError::Infeasible(_)
            | RegressionError::SolverFailed(_) => ErrorCategory::Solver,
            RegressionError::NotFitted => ErrorCategory::Usage,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RegressionError>;

/// Checks that `lb <= ub` when both bounds are given.
pub(crate) fn check_bounds(lb: Option<f64>, ub: Option<f64>) -> Result<()> {
    for (name, bound) in [("lb", lb), ("ub", ub)] {
        if let Some(value) = bound {
            if !value.is_finite() {
                return Err(RegressionError::NonFinite { name, index: 0 });
            }
        }
    }
    if let (Some(lb), Some(ub)) = (lb, ub) {
        if lb > ub {
            return Err(RegressionError::InvalidBounds { lb, ub });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            RegressionError::InvalidParameter("degree".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(RegressionError::DuplicateSplit(1.0).category(), ErrorCategory::Data);
        assert_eq!(
            RegressionError::Infeasible("PrimalInfeasible".into()).category(),
            ErrorCategory::Solver
        );
        assert_eq!(RegressionError::NotFitted.category(), ErrorCategory::Usage);
    }

    #[test]
    fn test_rank_deficient_message_mentions_segment() {
        let err = RegressionError::RankDeficient { rank: 1, expected: 2, segment: Some(3) };
        assert!(err.to_string().contains("in segment 3"));
        let err = RegressionError::RankDeficient { rank: 1, expected: 2, segment: None };
        assert!(!err.to_string().contains("segment 3"));
    }

    #[test]
    fn test_check_bounds() {
        assert!(check_bounds(None, None).is_ok());
        assert!(check_bounds(Some(0.0), None).is_ok());
        assert!(check_bounds(Some(1.0), Some(1.0)).is_ok());
        assert_eq!(
            check_bounds(Some(2.0), Some(1.0)),
            Err(RegressionError::InvalidBounds { lb: 2.0, ub: 1.0 })
        );
        assert!(matches!(
            check_bounds(None, Some(f64::NAN)),
            Err(RegressionError::NonFinite { name: "ub", .. })
        ));
    }
}
