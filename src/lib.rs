//! `piecewise_rs`: robust piecewise polynomial regression.
//!
//! Fits one polynomial per segment delimited by user-supplied split points,
//! under a choice of loss (`l2`, `l1`, `huber`, `quantile`), optional value
//! continuity at the splits, optional shape constraints and optional value
//! bounds. Unconstrained least squares is solved in closed form; everything
//! else is handed to a convex solver as a quadratic or second-order-cone
//! program.
//!
//! - [`core`] holds the building blocks, each usable on its own
//! - [`regression`] holds the [`PiecewiseRegression`] estimator

pub mod core;
pub mod error;
pub mod regression;

pub use crate::core::config::{Objective, RegressionConfig, RegressionConfigBuilder, ShapeConstraint, SolverChoice};
pub use crate::core::method::Method;
pub use crate::core::solver_interface::{ClarabelSolver, ConvexSolver};
pub use error::{ErrorCategory, RegressionError, Result};
pub use regression::{FitInfo, PiecewiseRegression};
