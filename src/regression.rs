//! Piecewise polynomial regression estimator.
//!
//! [`PiecewiseRegression`] validates the data, picks a formulation with
//! [`choose_method`], fits the coefficients and evaluates the fitted curve.
//!
//! ```no_run
//! use ndarray::arr1;
//! use piecewise_rs::{PiecewiseRegression, RegressionConfig};
//!
//! let config = RegressionConfig::builder().degree(1).continuous(false).build()?;
//! let mut model = PiecewiseRegression::new(config);
//! let x = arr1(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! let y = arr1(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0]);
//! model.fit(&x, &y, &arr1(&[3.5]), None, None)?;
//! let prediction = model.predict(&arr1(&[2.5, 4.5]), None, None)?;
//! # Ok::<(), piecewise_rs::RegressionError>(())
//! ```

use ndarray::{Array1, Array2};

use crate::core::config::{RegressionConfig, ShapeConstraint};
use crate::core::direct::{lsq_direct, lsq_direct_separated};
use crate::core::formulation::{qp, socp, solve_formulation, FitProblem};
use crate::core::method::{choose_method, Method};
use crate::core::polynomial::horner;
use crate::core::solver_interface::{ClarabelSolver, ConvexSolver};
use crate::core::splits::SplitIndex;
use crate::error::{check_bounds, RegressionError, Result};

/// Size of the problem solved by the last successful fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitInfo {
    /// Formulation chosen by the method selector.
    pub method: Method,
    /// Number of scalar variables, auxiliaries included.
    pub n_variables: usize,
    /// Number of scalar constraint rows.
    pub n_constraints: usize,
}

#[derive(Debug, Clone)]
struct FittedState {
    coefficients: Array2<f64>,
    splits: SplitIndex,
    info: FitInfo,
}

/// Robust piecewise polynomial regression.
#[derive(Debug, Clone, Default)]
pub struct PiecewiseRegression {
    config: RegressionConfig,
    fitted: Option<FittedState>,
}

fn check_finite(values: &Array1<f64>, name: &'static str) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(RegressionError::NonFinite { name, index }),
        None => Ok(()),
    }
}

impl PiecewiseRegression {
    pub fn new(config: RegressionConfig) -> Self {
        PiecewiseRegression { config, fitted: None }
    }

    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fitted coefficients, one row per segment in ascending powers.
    pub fn coefficients(&self) -> Result<&Array2<f64>> {
        self.state().map(|s| &s.coefficients)
    }

    /// Sorted split points used by the last successful fit.
    pub fn splits(&self) -> Result<&Array1<f64>> {
        self.state().map(|s| s.splits.splits())
    }

    pub fn fit_info(&self) -> Result<&FitInfo> {
        self.state().map(|s| &s.info)
    }

    fn state(&self) -> Result<&FittedState> {
        self.fitted.as_ref().ok_or(RegressionError::NotFitted)
    }

    /// Fits the piecewise regression with the default convex backend.
    ///
    /// `lb` and `ub` impose value bounds at every sample. See
    /// [`fit_with_solver`](Self::fit_with_solver).
    pub fn fit(
        &mut self,
        x: &Array1<f64>,
        y: &Array1<f64>,
        splits: &Array1<f64>,
        lb: Option<f64>,
        ub: Option<f64>,
    ) -> Result<&mut Self> {
        let solver = ClarabelSolver::new(self.config.verbose());
        self.fit_with_solver(x, y, splits, lb, ub, &solver)
    }

    /// Fits the piecewise regression, delegating quadratic and conic problems
    /// to `solver`.
    ///
    /// The fitted state is replaced only when the whole fit succeeds; on error
    /// the previous coefficients stay in place.
    ///
    /// The method is selected before the data is looked at, so configuration
    /// errors take precedence over data errors.
    ///
    /// # Errors
    /// Data errors for empty, mismatched or non-finite inputs, invalid splits
    /// or bounds; configuration errors for a turning segment beyond the last
    /// segment or a solver that cannot express the problem; solver errors
    /// from the chosen formulation.
    pub fn fit_with_solver(
        &mut self,
        x: &Array1<f64>,
        y: &Array1<f64>,
        splits: &Array1<f64>,
        lb: Option<f64>,
        ub: Option<f64>,
        solver: &dyn ConvexSolver,
    ) -> Result<&mut Self> {
        let method = choose_method(&self.config, lb.is_some() || ub.is_some())?;

        if x.is_empty() {
            return Err(RegressionError::EmptyInput("x"));
        }
        if x.len() != y.len() {
            return Err(RegressionError::LengthMismatch { x: x.len(), y: y.len() });
        }
        check_finite(x, "x")?;
        check_finite(y, "y")?;

        let split_index = SplitIndex::new(splits)?;
        check_bounds(lb, ub)?;

        if let Some(ShapeConstraint::Peak { turn } | ShapeConstraint::Valley { turn }) = self.config.monotonic_trend() {
            if turn >= split_index.n_bins() {
                return Err(RegressionError::InvalidParameter(format!(
                    "turning segment {} is out of range for {} segments",
                    turn,
                    split_index.n_bins()
                )));
            }
        }

        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|&i, &j| x[i].total_cmp(&x[j]));
        let xs: Array1<f64> = order.iter().map(|&i| x[i]).collect();
        let ys: Array1<f64> = order.iter().map(|&i| y[i]).collect();

        let degree = self.config.degree();
        let n_coefficients = split_index.n_bins() * self.config.order();

        let (coefficients, info) = match method {
            Method::LsqDirect | Method::LsqDirectSeparated => {
                let coefficients = if method.is_continuous() {
                    lsq_direct(&xs, &ys, &split_index, degree)?
                } else {
                    lsq_direct_separated(&xs, &ys, &split_index, degree)?
                };
                let n_constraints = if method.is_continuous() { split_index.n_splits() } else { 0 };
                let info = FitInfo {
                    method,
                    n_variables: n_coefficients,
                    n_constraints,
                };
                (coefficients, info)
            }
            Method::Qp | Method::QpSeparated | Method::Socp | Method::SocpSeparated => {
                let fit = FitProblem {
                    xs: &xs,
                    ys: &ys,
                    splits: &split_index,
                    degree,
                    continuous: method.is_continuous(),
                    monotonic_trend: self.config.monotonic_trend(),
                    lb,
                    ub,
                };
                let problem = match method {
                    Method::Qp | Method::QpSeparated => qp(&fit),
                    _ => socp(&fit, self.config.objective(), self.config.h_epsilon(), self.config.quantile()),
                };
                let coefficients = solve_formulation(&fit, &problem, solver)?;
                let info = FitInfo {
                    method,
                    n_variables: problem.n_vars,
                    n_constraints: problem.n_constraints(),
                };
                (coefficients, info)
            }
        };

        log::debug!(
            "fitted {} segments of degree {} with {} ({} variables, {} constraints)",
            split_index.n_bins(),
            degree,
            info.method,
            info.n_variables,
            info.n_constraints
        );

        self.fitted = Some(FittedState {
            coefficients,
            splits: split_index,
            info,
        });
        Ok(self)
    }

    /// Evaluates the fitted curve at `x`.
    ///
    /// Each value is assigned to a segment with the same right-open rule as at
    /// fit time and evaluated with Horner's rule. Results are clipped to `lb`
    /// and `ub` when given.
    ///
    /// # Errors
    /// `NotFitted` before a successful fit, `InvalidBounds` if `lb > ub`.
    pub fn predict(&self, x: &Array1<f64>, lb: Option<f64>, ub: Option<f64>) -> Result<Array1<f64>> {
        let state = self.state()?;
        check_bounds(lb, ub)?;

        let prediction = x.mapv(|xi| {
            let segment = state.splits.bin_of(xi);
            let mut value = horner(state.coefficients.row(segment), xi);
            if let Some(lb) = lb {
                value = value.max(lb);
            }
            if let Some(ub) = ub {
                value = value.min(ub);
            }
            value
        });
        Ok(prediction)
    }

    /// Fits on `(x, y)` and predicts at `x` with the same bounds.
    pub fn fit_predict(
        &mut self,
        x: &Array1<f64>,
        y: &Array1<f64>,
        splits: &Array1<f64>,
        lb: Option<f64>,
        ub: Option<f64>,
    ) -> Result<Array1<f64>> {
        self.fit(x, y, splits, lb, ub)?.predict(x, lb, ub)
    }
}
