use std::fmt;

use crate::core::config::{Objective, RegressionConfig, SolverChoice};
use crate::error::{RegressionError, Result};

/// Numerical formulation used to fit the coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Joint least squares with continuity eliminated, closed form.
    LsqDirect,
    /// Independent least squares per segment, closed form.
    LsqDirectSeparated,
    /// Quadratic program with continuity equalities.
    Qp,
    /// Quadratic program without continuity equalities.
    QpSeparated,
    /// Second-order-cone program with continuity equalities.
    Socp,
    /// Second-order-cone program without continuity equalities.
    SocpSeparated,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::LsqDirect,
        Method::LsqDirectSeparated,
        Method::Qp,
        Method::QpSeparated,
        Method::Socp,
        Method::SocpSeparated,
    ];

    /// Whether the formulation carries continuity equalities.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Method::LsqDirect | Method::Qp | Method::Socp)
    }

    /// Whether the formulation is solved in closed form rather than by a convex solver.
    pub fn is_direct(&self) -> bool {
        matches!(self, Method::LsqDirect | Method::LsqDirectSeparated)
    }

    fn direct(continuous: bool) -> Self {
        if continuous {
            Method::LsqDirect
        } else {
            Method::LsqDirectSeparated
        }
    }

    fn qp(continuous: bool) -> Self {
        if continuous {
            Method::Qp
        } else {
            Method::QpSeparated
        }
    }

    fn socp(continuous: bool) -> Self {
        if continuous {
            Method::Socp
        } else {
            Method::SocpSeparated
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::LsqDirect => "lsq_direct",
            Method::LsqDirectSeparated => "lsq_direct_separated",
            Method::Qp => "qp",
            Method::QpSeparated => "qp_separated",
            Method::Socp => "socp",
            Method::SocpSeparated => "socp_separated",
        };
        f.write_str(name)
    }
}

/// Picks the formulation for a validated configuration.
///
/// `bounded` tells whether value bounds are imposed at fit time. The choice is
/// final: a failure of the chosen formulation is reported, never retried with
/// another one.
///
/// # Errors
/// `IncompatibleConfiguration` when the requested solver cannot express the
/// problem (`Direct` with a robust objective, a shape constraint or bounds;
/// `Osqp` with a robust objective).
pub fn choose_method(config: &RegressionConfig, bounded: bool) -> Result<Method> {
    let continuous = config.continuous();
    let is_l2 = config.objective() == Objective::L2;
    let shaped = config.monotonic_trend().is_some();

    let method = match config.solver() {
        SolverChoice::Auto if bounded => Method::socp(continuous),
        SolverChoice::Auto if is_l2 && !shaped => Method::direct(continuous),
        SolverChoice::Auto if is_l2 => Method::qp(continuous),
        SolverChoice::Auto => Method::socp(continuous),
        SolverChoice::Direct if !is_l2 || shaped || bounded => {
            return Err(RegressionError::IncompatibleConfiguration(
                "solver \"direct\" only for objective=\"l2\", no monotonic trend and no bounds".to_string(),
            ));
        }
        SolverChoice::Direct => Method::direct(continuous),
        SolverChoice::Osqp if !is_l2 => {
            return Err(RegressionError::IncompatibleConfiguration(format!(
                "solver \"osqp\" only for objective=\"l2\"; got objective=\"{}\"",
                config.objective()
            )));
        }
        SolverChoice::Osqp => Method::qp(continuous),
        SolverChoice::Ecos => Method::socp(continuous),
    };

    log::debug!(
        "selected method {} (solver={}, objective={}, continuous={}, trend={:?}, bounded={})",
        method,
        config.solver(),
        config.objective(),
        continuous,
        config.monotonic_trend(),
        bounded
    );
    Ok(method)
}
