//! Quadratic-program and second-order-cone-program formulations.
//!
//! Both builders produce a [`ConicProblem`] whose leading variables are the
//! flattened polynomial coefficients `c` (segment-major, ascending powers),
//! followed by objective-specific auxiliary variables. The continuity and
//! shape rows come from [`generate_constraint_rows`]; the separated and
//! continuous variants differ only by the `continuous` flag passed there.

use ndarray::{s, Array1, Array2, ArrayView1};

use crate::core::config::{Objective, ShapeConstraint};
use crate::core::constraints::{generate_bound_rows, generate_constraint_rows, ConstraintKind, ConstraintSet};
use crate::core::polynomial::vandermonde_row;
use crate::core::solver_interface::{dense_entries, ConicProblem, ConvexSolver, ProblemBuilder};
use crate::core::splits::SplitIndex;
use crate::error::{RegressionError, Result};

/// Design matrix over the flattened coefficients: the row of sample `j`
/// holds `x_j^0..x_j^degree` in the column block of its segment.
pub fn design_matrix(xs: &Array1<f64>, splits: &SplitIndex, degree: usize) -> Array2<f64> {
    let order = degree + 1;
    let mut design = Array2::zeros((xs.len(), splits.n_bins() * order));
    for (j, &x) in xs.iter().enumerate() {
        let segment = splits.bin_of(x);
        design
            .slice_mut(s![j, segment * order..(segment + 1) * order])
            .assign(&vandermonde_row(x, degree));
    }
    design
}

/// Reshapes a flattened coefficient vector into the `(n_bins, degree + 1)` table.
pub fn coefficient_table(c: &Array1<f64>, n_bins: usize, degree: usize) -> Array2<f64> {
    let order = degree + 1;
    Array2::from_shape_fn((n_bins, order), |(i, k)| c[i * order + k])
}

/// Sorted samples and the structural options shared by the convex formulations.
#[derive(Debug, Clone)]
pub struct FitProblem<'a> {
    pub xs: &'a Array1<f64>,
    pub ys: &'a Array1<f64>,
    pub splits: &'a SplitIndex,
    pub degree: usize,
    pub continuous: bool,
    pub monotonic_trend: Option<ShapeConstraint>,
    pub lb: Option<f64>,
    pub ub: Option<f64>,
}

impl FitProblem<'_> {
    pub fn n_coefficients(&self) -> usize {
        self.splits.n_bins() * (self.degree + 1)
    }

    fn n_samples(&self) -> usize {
        self.xs.len()
    }

    /// Continuity, shape and bound rows over the coefficients.
    fn coefficient_constraints(&self, design: &Array2<f64>) -> ConstraintSet {
        let x_min = self.xs.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = self.xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut set = generate_constraint_rows(
            self.splits,
            self.degree,
            self.continuous,
            self.monotonic_trend,
            x_min,
            x_max,
        );
        set.extend(generate_bound_rows(design, self.lb, self.ub));
        set
    }
}

fn add_coefficient_constraints(builder: &mut ProblemBuilder, set: &ConstraintSet) {
    for row in set.equalities.iter().chain(set.inequalities.iter()) {
        builder.add_constraint_row(row, &[]);
    }
}

fn scaled(entries: &[(usize, f64)], factor: f64) -> Vec<(usize, f64)> {
    entries.iter().map(|&(c, v)| (c, factor * v)).collect()
}

fn with_aux(mut entries: Vec<(usize, f64)>, aux: &[(usize, f64)]) -> Vec<(usize, f64)> {
    entries.extend_from_slice(aux);
    entries
}

/// Least-squares quadratic program.
///
/// ```text
/// minimize    ||A c - y||^2  =  0.5 c'(2 A'A) c - 2 (A'y)'c + const
/// subject to  continuity equalities, shape inequalities, optional bounds
/// ```
pub fn qp(fit: &FitProblem) -> ConicProblem {
    let n_coefficients = fit.n_coefficients();
    let design = design_matrix(fit.xs, fit.splits, fit.degree);
    let gram = design.t().dot(&design);
    let aty = design.t().dot(fit.ys);

    let mut builder = ProblemBuilder::new(n_coefficients);
    for i in 0..n_coefficients {
        builder.set_linear_cost(i, -2.0 * aty[i]);
        for j in i..n_coefficients {
            builder.add_quadratic_cost(i, j, 2.0 * gram[[i, j]]);
        }
    }
    add_coefficient_constraints(&mut builder, &fit.coefficient_constraints(&design));

    let problem = builder.build();
    log::debug!(
        "qp formulation: {} variables, {} constraints",
        problem.n_vars,
        problem.n_constraints()
    );
    problem
}

/// Second-order-cone program for any objective.
///
/// Variables are `z = [c, aux]`, with `n` samples:
///
/// * `l2`: `aux = [t]`, minimise `t` with `||y - A c||_2 <= t`.
/// * `l1`: `aux = r (n)`, minimise `sum r` with `|y_j - A_j c| <= r_j`.
/// * `huber`: `aux = [u (n), w (n), s]`, minimise `s + 2h sum w` with
///   `|A_j c - y_j - u_j| <= w_j` and `||u||^2 <= s`, the latter written as the
///   cone `||(2u, s - 1)||_2 <= s + 1`.
/// * `quantile`: `aux = r (n)`, minimise `sum r` with `r_j >= q (y_j - A_j c)`
///   and `r_j >= (q - 1)(y_j - A_j c)`.
pub fn socp(fit: &FitProblem, objective: Objective, h_epsilon: f64, quantile: f64) -> ConicProblem {
    let p = fit.n_coefficients();
    let n = fit.n_samples();
    let design = design_matrix(fit.xs, fit.splits, fit.degree);
    let rows: Vec<Vec<(usize, f64)>> = design.rows().into_iter().map(|r| dense_entries(&r.to_owned())).collect();
    let ys = fit.ys;

    let n_aux = match objective {
        Objective::L2 => 1,
        Objective::L1 | Objective::Quantile => n,
        Objective::Huber => 2 * n + 1,
    };
    let mut builder = ProblemBuilder::new(p + n_aux);

    match objective {
        Objective::L2 => {
            let t = p;
            builder.set_linear_cost(t, 1.0);
            let mut components = Vec::with_capacity(n + 1);
            components.push((vec![(t, -1.0)], 0.0));
            for (j, entries) in rows.iter().enumerate() {
                components.push((entries.clone(), ys[j]));
            }
            builder.add_second_order_cone(components);
        }
        Objective::L1 => {
            for (j, entries) in rows.iter().enumerate() {
                let r = p + j;
                builder.set_linear_cost(r, 1.0);
                builder.add_row(with_aux(entries.clone(), &[(r, -1.0)]), ys[j], ConstraintKind::LessThanOrEqual);
                builder.add_row(with_aux(scaled(entries, -1.0), &[(r, -1.0)]), -ys[j], ConstraintKind::LessThanOrEqual);
            }
        }
        Objective::Huber => {
            let s_var = p + 2 * n;
            builder.set_linear_cost(s_var, 1.0);
            let mut components = Vec::with_capacity(n + 2);
            components.push((vec![(s_var, -1.0)], 1.0));
            for (j, entries) in rows.iter().enumerate() {
                let u = p + j;
                let w = p + n + j;
                builder.set_linear_cost(w, 2.0 * h_epsilon);
                builder.add_row(
                    with_aux(entries.clone(), &[(u, -1.0), (w, -1.0)]),
                    ys[j],
                    ConstraintKind::LessThanOrEqual,
                );
                builder.add_row(
                    with_aux(scaled(entries, -1.0), &[(u, 1.0), (w, -1.0)]),
                    -ys[j],
                    ConstraintKind::LessThanOrEqual,
                );
                components.push((vec![(u, -2.0)], 0.0));
            }
            components.push((vec![(s_var, -1.0)], -1.0));
            builder.add_second_order_cone(components);
        }
        Objective::Quantile => {
            for (j, entries) in rows.iter().enumerate() {
                let r = p + j;
                builder.set_linear_cost(r, 1.0);
                builder.add_row(
                    with_aux(scaled(entries, -quantile), &[(r, -1.0)]),
                    -quantile * ys[j],
                    ConstraintKind::LessThanOrEqual,
                );
                builder.add_row(
                    with_aux(scaled(entries, 1.0 - quantile), &[(r, -1.0)]),
                    (1.0 - quantile) * ys[j],
                    ConstraintKind::LessThanOrEqual,
                );
            }
        }
    }

    add_coefficient_constraints(&mut builder, &fit.coefficient_constraints(&design));

    let problem = builder.build();
    log::debug!(
        "socp formulation ({}): {} variables, {} constraints",
        objective,
        problem.n_vars,
        problem.n_constraints()
    );
    problem
}

/// Solves a formulation and extracts the coefficient table from the leading
/// variables of the solution.
pub fn solve_formulation(
    fit: &FitProblem,
    problem: &ConicProblem,
    solver: &dyn ConvexSolver,
) -> Result<Array2<f64>> {
    let p = fit.n_coefficients();
    let z = solver.solve(problem)?;
    if z.len() < p {
        return Err(RegressionError::SolverFailed(format!(
            "solution has {} values, expected at least {}",
            z.len(),
            p
        )));
    }
    let c: ArrayView1<f64> = z.slice(s![..p]);
    if c.iter().any(|v| !v.is_finite()) {
        return Err(RegressionError::SolverFailed("solution is not finite".to_string()));
    }
    Ok(coefficient_table(&c.to_owned(), fit.splits.n_bins(), fit.degree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::polynomial::horner;
    use crate::core::solver_interface::{ClarabelSolver, Cone};
    use ndarray::{arr1, arr2};

    const TOL_SOLVER: f64 = 1e-4;

    fn fit_problem<'a>(xs: &'a Array1<f64>, ys: &'a Array1<f64>, splits: &'a SplitIndex, degree: usize) -> FitProblem<'a> {
        FitProblem {
            xs,
            ys,
            splits,
            degree,
            continuous: true,
            monotonic_trend: None,
            lb: None,
            ub: None,
        }
    }

    fn solve(fit: &FitProblem, problem: &ConicProblem) -> Array2<f64> {
        solve_formulation(fit, problem, &ClarabelSolver::default()).unwrap()
    }

    #[test]
    fn test_design_matrix_blocks() {
        let xs = arr1(&[0.5, 1.0, 2.0]);
        let splits = SplitIndex::new(&arr1(&[1.0])).unwrap();
        let design = design_matrix(&xs, &splits, 1);
        let expected = arr2(&[[1.0, 0.5, 0.0, 0.0], [0.0, 0.0, 1.0, 1.0], [0.0, 0.0, 1.0, 2.0]]);
        assert_eq!(design, expected);
    }

    #[test]
    fn test_coefficient_table() {
        let c = arr1(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(coefficient_table(&c, 2, 2), arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));
        assert_eq!(coefficient_table(&c, 3, 1), arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]));
    }

    #[test]
    fn test_qp_structure() {
        let xs = arr1(&[0.0, 1.0, 2.0, 3.0]);
        let ys = arr1(&[0.0, 1.0, 2.0, 3.0]);
        let splits = SplitIndex::new(&arr1(&[1.5])).unwrap();
        let mut fit = fit_problem(&xs, &ys, &splits, 1);
        fit.monotonic_trend = Some(ShapeConstraint::Ascending);

        let problem = qp(&fit);
        assert_eq!(problem.n_vars, 4);
        assert!(problem.is_quadratic());
        assert!(problem.p_triplets.iter().all(|&(i, j, _)| i <= j));
        // One continuity row, two slope rows per segment.
        assert_eq!(problem.cones, vec![Cone::Zero(1), Cone::NonNegative(4)]);

        fit.continuous = false;
        let separated = qp(&fit);
        // No continuity rows, one jump row more.
        assert_eq!(separated.cones, vec![Cone::NonNegative(5)]);
    }

    #[test]
    fn test_socp_structure_per_objective() {
        let xs = arr1(&[0.0, 1.0, 2.0]);
        let ys = arr1(&[0.0, 1.0, 2.0]);
        let splits = SplitIndex::empty();
        let mut fit = fit_problem(&xs, &ys, &splits, 1);

        let l2 = socp(&fit, Objective::L2, 1.35, 0.5);
        assert_eq!(l2.n_vars, 3);
        assert_eq!(l2.cones, vec![Cone::SecondOrder(4)]);
        assert!(!l2.is_quadratic());

        let l1 = socp(&fit, Objective::L1, 1.35, 0.5);
        assert_eq!(l1.n_vars, 5);
        assert_eq!(l1.cones, vec![Cone::NonNegative(6)]);

        let huber = socp(&fit, Objective::Huber, 1.35, 0.5);
        assert_eq!(huber.n_vars, 2 + 7);
        assert_eq!(huber.cones, vec![Cone::NonNegative(6), Cone::SecondOrder(5)]);

        fit.lb = Some(0.0);
        fit.ub = Some(1.0);
        let quantile = socp(&fit, Objective::Quantile, 1.35, 0.9);
        assert_eq!(quantile.n_vars, 5);
        assert_eq!(quantile.cones, vec![Cone::NonNegative(12)]);
    }

    #[test]
    fn test_qp_matches_least_squares() {
        let xs = Array1::linspace(0.0, 2.0, 11);
        let ys = xs.mapv(|x| 1.0 + 2.0 * x);
        let splits = SplitIndex::empty();
        let fit = fit_problem(&xs, &ys, &splits, 1);

        let c = solve(&fit, &qp(&fit));
        assert!((c[[0, 0]] - 1.0).abs() < TOL_SOLVER);
        assert!((c[[0, 1]] - 2.0).abs() < TOL_SOLVER);
    }

    #[test]
    fn test_socp_l2_matches_least_squares() {
        let xs = Array1::linspace(0.0, 2.0, 11);
        let ys = xs.mapv(|x: f64| 1.0 + 2.0 * x + 0.05 * (7.0 * x).cos());
        let splits = SplitIndex::new(&arr1(&[1.0])).unwrap();
        let fit = fit_problem(&xs, &ys, &splits, 1);

        let from_qp = solve(&fit, &qp(&fit));
        let from_socp = solve(&fit, &socp(&fit, Objective::L2, 1.35, 0.5));
        for (a, b) in from_qp.iter().zip(from_socp.iter()) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_socp_l1_ignores_outlier() {
        let xs = arr1(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut ys = xs.mapv(|x| 2.0 * x);
        ys[3] = 100.0;
        let splits = SplitIndex::empty();
        let fit = fit_problem(&xs, &ys, &splits, 1);

        let c = solve(&fit, &socp(&fit, Objective::L1, 1.35, 0.5));
        assert!(c[[0, 0]].abs() < TOL_SOLVER, "intercept {}", c[[0, 0]]);
        assert!((c[[0, 1]] - 2.0).abs() < TOL_SOLVER, "slope {}", c[[0, 1]]);
    }

    #[test]
    fn test_socp_huber_is_robust() {
        let xs = Array1::linspace(0.0, 10.0, 21);
        let mut ys = xs.mapv(|x| 3.0 + 0.5 * x);
        ys[10] += 50.0;
        let splits = SplitIndex::empty();
        let fit = fit_problem(&xs, &ys, &splits, 1);

        let huber = solve(&fit, &socp(&fit, Objective::Huber, 1.35, 0.5));
        let l2 = solve(&fit, &qp(&fit));
        let huber_error = (huber[[0, 0]] - 3.0).abs() + (huber[[0, 1]] - 0.5).abs();
        let l2_error = (l2[[0, 0]] - 3.0).abs() + (l2[[0, 1]] - 0.5).abs();
        assert!(huber_error < l2_error, "huber {} vs l2 {}", huber_error, l2_error);
        // Huber with a single outlier shifts the intercept by at most 2h/n.
        assert!((huber[[0, 0]] - 3.0).abs() < 0.2, "intercept {}", huber[[0, 0]]);
    }

    #[test]
    fn test_socp_quantile_degree_zero() {
        // Constant fit at the 0.8 quantile of 1..=10.
        let xs = Array1::linspace(0.0, 9.0, 10);
        let ys = Array1::linspace(1.0, 10.0, 10);
        let splits = SplitIndex::empty();
        let fit = fit_problem(&xs, &ys, &splits, 0);

        let c = solve(&fit, &socp(&fit, Objective::Quantile, 1.35, 0.8));
        // Any value in [8, 9] minimises the pinball loss.
        assert!(c[[0, 0]] > 8.0 - TOL_SOLVER && c[[0, 0]] < 9.0 + TOL_SOLVER, "{}", c[[0, 0]]);
    }

    #[test]
    fn test_socp_bounds_are_enforced_at_samples() {
        let xs = Array1::linspace(0.0, 1.0, 11);
        let ys = xs.mapv(|x| 4.0 * x - 1.0);
        let splits = SplitIndex::empty();
        let mut fit = fit_problem(&xs, &ys, &splits, 1);
        fit.lb = Some(0.0);
        fit.ub = Some(2.0);

        let c = solve(&fit, &socp(&fit, Objective::L2, 1.35, 0.5));
        for &x in xs.iter() {
            let value = horner(c.row(0), x);
            assert!(value >= -TOL_SOLVER && value <= 2.0 + TOL_SOLVER, "p({}) = {}", x, value);
        }
    }

    #[test]
    fn test_socp_descending_separated_with_jump() {
        // Increasing data forced down: segments may not jump upwards.
        let xs = Array1::linspace(0.0, 3.9, 40);
        let ys = xs.mapv(|x: f64| x.floor());
        let splits = SplitIndex::new(&arr1(&[1.0, 2.0, 3.0])).unwrap();
        let mut fit = fit_problem(&xs, &ys, &splits, 1);
        fit.continuous = false;
        fit.monotonic_trend = Some(ShapeConstraint::Descending);

        let c = solve(&fit, &socp(&fit, Objective::L1, 1.35, 0.5));
        for i in 0..4 {
            assert!(c[[i, 1]] <= TOL_SOLVER, "slope {} = {}", i, c[[i, 1]]);
        }
        for (i, &b) in splits.splits().iter().enumerate() {
            let left = horner(c.row(i), b);
            let right = horner(c.row(i + 1), b);
            assert!(right <= left + TOL_SOLVER, "jump up at {}: {} -> {}", b, left, right);
        }
    }

    struct FailingSolver;

    impl ConvexSolver for FailingSolver {
        fn solve(&self, _problem: &ConicProblem) -> Result<Array1<f64>> {
            Ok(arr1(&[f64::NAN, 1.0]))
        }
    }

    #[test]
    fn test_solve_formulation_rejects_non_finite() {
        let xs = arr1(&[0.0, 1.0]);
        let ys = arr1(&[0.0, 1.0]);
        let splits = SplitIndex::empty();
        let fit = fit_problem(&xs, &ys, &splits, 1);
        let result = solve_formulation(&fit, &qp(&fit), &FailingSolver);
        assert!(matches!(result, Err(RegressionError::SolverFailed(_))));
    }
}
