//! Model options and their validation.
//!
//! String tags accepted by the public API are parsed into closed enums, and the
//! full option set is validated once when a [`RegressionConfig`] is built. A
//! built configuration is immutable and always internally consistent.

use std::fmt;
use std::str::FromStr;

use crate::error::{RegressionError, Result};

/// Highest polynomial degree supported per segment.
pub const MAX_DEGREE: usize = 5;

/// Loss minimised by the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Objective {
    /// Sum of squared residuals.
    L2,
    /// Sum of absolute residuals.
    L1,
    /// Huber loss with threshold `h_epsilon`.
    Huber,
    /// Pinball loss at level `quantile`.
    Quantile,
}

/// Shape constraint imposed on the fitted curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeConstraint {
    /// Non-decreasing, `s'(x) >= 0`.
    Ascending,
    /// Non-increasing, `s'(x) <= 0`.
    Descending,
    /// Convex, slopes non-decreasing.
    Convex,
    /// Concave, slopes non-increasing.
    Concave,
    /// Ascending up to segment `turn`, descending from it.
    Peak { turn: usize },
    /// Descending up to segment `turn`, ascending from it.
    Valley { turn: usize },
}

impl ShapeConstraint {
    /// `true` for the convex and concave trends, which constrain the second derivative.
    pub fn is_curvature(&self) -> bool {
        matches!(self, ShapeConstraint::Convex | ShapeConstraint::Concave)
    }
}

/// Solver requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverChoice {
    /// Pick the cheapest formulation that can express the problem.
    Auto,
    /// Conic (SOCP) formulation.
    Ecos,
    /// Quadratic program formulation.
    Osqp,
    /// Closed-form least squares.
    Direct,
}

impl FromStr for Objective {
    type Err = RegressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l2" => Ok(Objective::L2),
            "l1" => Ok(Objective::L1),
            "huber" => Ok(Objective::Huber),
            "quantile" => Ok(Objective::Quantile),
            other => Err(RegressionError::InvalidParameter(format!(
                "objective must be one of \"l1\", \"l2\", \"huber\" and \"quantile\"; got \"{}\"",
                other
            ))),
        }
    }
}

/// Parses `"ascending"`, `"descending"`, `"convex"` and `"concave"`.
/// Peak and valley trends need a turning segment and are built directly.
impl FromStr for ShapeConstraint {
    type Err = RegressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ascending" => Ok(ShapeConstraint::Ascending),
            "descending" => Ok(ShapeConstraint::Descending),
            "convex" => Ok(ShapeConstraint::Convex),
            "concave" => Ok(ShapeConstraint::Concave),
            other => Err(RegressionError::InvalidParameter(format!(
                "monotonic trend must be one of \"ascending\", \"descending\", \"convex\" and \"concave\"; got \"{}\"",
                other
            ))),
        }
    }
}

impl FromStr for SolverChoice {
    type Err = RegressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(SolverChoice::Auto),
            "ecos" => Ok(SolverChoice::Ecos),
            "osqp" => Ok(SolverChoice::Osqp),
            "direct" => Ok(SolverChoice::Direct),
            other => Err(RegressionError::InvalidParameter(format!(
                "solver must be one of \"auto\", \"ecos\", \"osqp\" and \"direct\"; got \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Objective::L2 => "l2",
            Objective::L1 => "l1",
            Objective::Huber => "huber",
            Objective::Quantile => "quantile",
        };
        f.write_str(name)
    }
}

impl fmt::Display for SolverChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverChoice::Auto => "auto",
            SolverChoice::Ecos => "ecos",
            SolverChoice::Osqp => "osqp",
            SolverChoice::Direct => "direct",
        };
        f.write_str(name)
    }
}

/// Validated options of a piecewise regression.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionConfig {
    objective: Objective,
    degree: usize,
    continuous: bool,
    monotonic_trend: Option<ShapeConstraint>,
    solver: SolverChoice,
    h_epsilon: f64,
    quantile: f64,
    verbose: bool,
}

impl RegressionConfig {
    pub fn builder() -> RegressionConfigBuilder {
        RegressionConfigBuilder::default()
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of coefficients per segment.
    pub fn order(&self) -> usize {
        self.degree + 1
    }

    pub fn continuous(&self) -> bool {
        self.continuous
    }

    pub fn monotonic_trend(&self) -> Option<ShapeConstraint> {
        self.monotonic_trend
    }

    pub fn solver(&self) -> SolverChoice {
        self.solver
    }

    pub fn h_epsilon(&self) -> f64 {
        self.h_epsilon
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for RegressionConfig {
    fn default() -> Self {
        RegressionConfig {
            objective: Objective::L2,
            degree: 1,
            continuous: true,
            monotonic_trend: None,
            solver: SolverChoice::Auto,
            h_epsilon: 1.35,
            quantile: 0.5,
            verbose: false,
        }
    }
}

/// Builder for [`RegressionConfig`]. Unset options keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct RegressionConfigBuilder {
    inner: RegressionConfig,
}

impl RegressionConfigBuilder {
    pub fn objective(mut self, objective: Objective) -> Self {
        self.inner.objective = objective;
        self
    }

    pub fn degree(mut self, degree: usize) -> Self {
        self.inner.degree = degree;
        self
    }

    pub fn continuous(mut self, continuous: bool) -> Self {
        self.inner.continuous = continuous;
        self
    }

    pub fn monotonic_trend(mut self, trend: Option<ShapeConstraint>) -> Self {
        self.inner.monotonic_trend = trend;
        self
    }

    pub fn solver(mut self, solver: SolverChoice) -> Self {
        self.inner.solver = solver;
        self
    }

    pub fn h_epsilon(mut self, h_epsilon: f64) -> Self {
        self.inner.h_epsilon = h_epsilon;
        self
    }

    pub fn quantile(mut self, quantile: f64) -> Self {
        self.inner.quantile = quantile;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.inner.verbose = verbose;
        self
    }

    /// Validates the option set.
    ///
    /// # Errors
    /// `InvalidParameter` for out-of-range values and
    /// `IncompatibleConfiguration` for curvature trends outside the
    /// continuous piecewise-linear case.
    pub fn build(self) -> Result<RegressionConfig> {
        let config = self.inner;

        if config.degree > MAX_DEGREE {
            return Err(RegressionError::InvalidParameter(format!(
                "degree must be an integer in [0, {}]; got {}",
                MAX_DEGREE, config.degree
            )));
        }

        if let Some(trend) = config.monotonic_trend {
            if trend.is_curvature() && config.degree != 1 {
                return Err(RegressionError::IncompatibleConfiguration(
                    "monotonic trend \"convex\" and \"concave\" are only valid if degree = 1".to_string(),
                ));
            }
            if trend.is_curvature() && !config.continuous {
                return Err(RegressionError::IncompatibleConfiguration(
                    "monotonic trend \"convex\" and \"concave\" are only valid if continuous = true".to_string(),
                ));
            }
            if let ShapeConstraint::Peak { turn } | ShapeConstraint::Valley { turn } = trend {
                if turn == 0 {
                    return Err(RegressionError::InvalidParameter(
                        "the turning segment of a peak or valley trend must be >= 1".to_string(),
                    ));
                }
            }
        }

        // NaN fails both comparisons.
        if !(config.h_epsilon >= 1.0) || !config.h_epsilon.is_finite() {
            return Err(RegressionError::InvalidParameter(format!(
                "h_epsilon must be a number >= 1.0; got {}",
                config.h_epsilon
            )));
        }

        if !(config.quantile > 0.0 && config.quantile < 1.0) {
            return Err(RegressionError::InvalidParameter(format!(
                "quantile must be a value in (0, 1); got {}",
                config.quantile
            )));
        }

        Ok(config)
    }
}
