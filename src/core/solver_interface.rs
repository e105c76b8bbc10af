use clarabel::algebra::CscMatrix;
use clarabel::solver::{DefaultSettings, DefaultSolver, IPSolver, SolverStatus, SupportedConeT};
use ndarray::Array1;

use crate::core::constraints::{ConstraintKind, ConstraintRow};
use crate::error::{RegressionError, Result};

/// Cone of a block of consecutive constraint rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cone {
    /// `s = 0`: equality rows.
    Zero(usize),
    /// `s >= 0`: inequality rows.
    NonNegative(usize),
    /// `s_0 >= ||s_1..||_2`.
    SecondOrder(usize),
}

impl Cone {
    pub fn dim(&self) -> usize {
        match *self {
            Cone::Zero(n) | Cone::NonNegative(n) | Cone::SecondOrder(n) => n,
        }
    }
}

/// A convex problem in conic standard form:
///
/// ```text
/// minimize    0.5 z'Pz + q'z
/// subject to  Az + s = b,  s in K
/// ```
///
/// `P` holds upper-triangular entries only. `A` and `P` are stored as
/// `(row, col, value)` triplets so that backends can convert them to their own
/// sparse format. The cones in `cones` cover the rows of `A` in order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConicProblem {
    pub n_vars: usize,
    pub p_triplets: Vec<(usize, usize, f64)>,
    pub q: Vec<f64>,
    pub a_triplets: Vec<(usize, usize, f64)>,
    pub b: Vec<f64>,
    pub cones: Vec<Cone>,
}

impl ConicProblem {
    pub fn n_constraints(&self) -> usize {
        self.b.len()
    }

    pub fn is_quadratic(&self) -> bool {
        !self.p_triplets.is_empty()
    }
}

/// A backend able to solve a [`ConicProblem`].
///
/// Implementations return the primal solution `z` (length `n_vars`), or
/// `Infeasible` / `SolverFailed` when no usable solution was found. They must
/// never hand back partial or non-finite values.
pub trait ConvexSolver {
    fn solve(&self, problem: &ConicProblem) -> Result<Array1<f64>>;
}

#[derive(Debug, Clone, Default)]
struct SparseRow {
    entries: Vec<(usize, f64)>,
    rhs: f64,
}

/// Incremental assembly of a [`ConicProblem`].
///
/// Rows are collected per cone kind and laid out as equalities, then
/// inequalities, then one block per second-order cone.
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    n_vars: usize,
    q: Vec<f64>,
    p_triplets: Vec<(usize, usize, f64)>,
    eq_rows: Vec<SparseRow>,
    ineq_rows: Vec<SparseRow>,
    soc_blocks: Vec<Vec<SparseRow>>,
}

impl ProblemBuilder {
    pub fn new(n_vars: usize) -> Self {
        ProblemBuilder {
            n_vars,
            q: vec![0.0; n_vars],
            p_triplets: Vec::new(),
            eq_rows: Vec::new(),
            ineq_rows: Vec::new(),
            soc_blocks: Vec::new(),
        }
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn set_linear_cost(&mut self, var: usize, value: f64) {
        self.q[var] = value;
    }

    /// Adds `value` at `(i, j)` of `P`; lower-triangular positions are mirrored
    /// to the upper triangle.
    pub fn add_quadratic_cost(&mut self, i: usize, j: usize, value: f64) {
        if value != 0.0 {
            self.p_triplets.push((i.min(j), i.max(j), value));
        }
    }

    /// `entries . z (kind) rhs`.
    pub fn add_row(&mut self, entries: Vec<(usize, f64)>, rhs: f64, kind: ConstraintKind) {
        match kind {
            ConstraintKind::Equals => self.eq_rows.push(SparseRow { entries, rhs }),
            ConstraintKind::LessThanOrEqual => self.ineq_rows.push(SparseRow { entries, rhs }),
            ConstraintKind::GreaterThanOrEqual => self.ineq_rows.push(SparseRow {
                entries: entries.into_iter().map(|(c, v)| (c, -v)).collect(),
                rhs: -rhs,
            }),
        }
    }

    /// Adds a coefficient constraint row, extended with entries on auxiliary
    /// variables. `row.a_row` covers the leading variables of `z`.
    pub fn add_constraint_row(&mut self, row: &ConstraintRow, aux: &[(usize, f64)]) {
        let mut entries = dense_entries(&row.a_row);
        entries.extend_from_slice(aux);
        self.add_row(entries, row.rhs, row.kind);
    }

    /// Adds a second-order cone block. Each element `(entries, b)` yields the
    /// cone component `b - entries . z`; the first component bounds the norm of
    /// the others.
    pub fn add_second_order_cone(&mut self, components: Vec<(Vec<(usize, f64)>, f64)>) {
        let block = components
            .into_iter()
            .map(|(entries, rhs)| SparseRow { entries, rhs })
            .collect();
        self.soc_blocks.push(block);
    }

    pub fn build(self) -> ConicProblem {
        let mut a_triplets = Vec::new();
        let mut b = Vec::new();
        let mut cones = Vec::new();

        if !self.eq_rows.is_empty() {
            append_rows(&self.eq_rows, &mut a_triplets, &mut b);
            cones.push(Cone::Zero(self.eq_rows.len()));
        }
        if !self.ineq_rows.is_empty() {
            append_rows(&self.ineq_rows, &mut a_triplets, &mut b);
            cones.push(Cone::NonNegative(self.ineq_rows.len()));
        }
        for block in &self.soc_blocks {
            append_rows(block, &mut a_triplets, &mut b);
            cones.push(Cone::SecondOrder(block.len()));
        }

        ConicProblem {
            n_vars: self.n_vars,
            p_triplets: self.p_triplets,
            q: self.q,
            a_triplets,
            b,
            cones,
        }
    }
}

fn append_rows(rows: &[SparseRow], a_triplets: &mut Vec<(usize, usize, f64)>, b: &mut Vec<f64>) {
    for row in rows {
        let r = b.len();
        for &(col, val) in &row.entries {
            a_triplets.push((r, col, val));
        }
        b.push(row.rhs);
    }
}

/// Non-zero entries of a dense row as `(column, value)` pairs.
pub fn dense_entries(row: &Array1<f64>) -> Vec<(usize, f64)> {
    row.iter()
        .enumerate()
        .filter(|(_, &v)| v != 0.0)
        .map(|(c, &v)| (c, v))
        .collect()
}

/// Converts `(row, col, value)` triplets to a compressed sparse column matrix.
///
/// Duplicate positions are summed. Row indices are sorted within each column,
/// as Clarabel requires.
pub fn triplets_to_csc(m: usize, n: usize, triplets: &[(usize, usize, f64)]) -> Result<CscMatrix<f64>> {
    let mut sorted: Vec<(usize, usize, f64)> = Vec::with_capacity(triplets.len());
    for &(r, c, v) in triplets {
        if r >= m || c >= n {
            return Err(RegressionError::SolverFailed(format!(
                "entry ({}, {}) out of bounds for a {}x{} matrix",
                r, c, m, n
            )));
        }
        sorted.push((r, c, v));
    }
    // Column-major, then row-major.
    sorted.sort_unstable_by_key(|k| (k.1, k.0));

    let mut colptr = vec![0; n + 1];
    let mut rowval = Vec::with_capacity(sorted.len());
    let mut nzval: Vec<f64> = Vec::with_capacity(sorted.len());
    let mut last: Option<(usize, usize)> = None;

    for (r, c, v) in sorted {
        if last == Some((r, c)) {
            if let Some(tail) = nzval.last_mut() {
                *tail += v;
            }
            continue;
        }
        rowval.push(r);
        nzval.push(v);
        colptr[c + 1] += 1;
        last = Some((r, c));
    }
    for j in 0..n {
        colptr[j + 1] += colptr[j];
    }

    Ok(CscMatrix::new(m, n, colptr, rowval, nzval))
}

/// [`ConvexSolver`] backed by the Clarabel interior point solver.
///
/// Both the quadratic-program and the second-order-cone formulations are
/// handed to Clarabel, which accepts a quadratic objective together with
/// zero, non-negative and second-order cones.
#[derive(Debug, Clone, Default)]
pub struct ClarabelSolver {
    verbose: bool,
}

impl ClarabelSolver {
    pub fn new(verbose: bool) -> Self {
        ClarabelSolver { verbose }
    }
}

impl ConvexSolver for ClarabelSolver {
    fn solve(&self, problem: &ConicProblem) -> Result<Array1<f64>> {
        let n = problem.n_vars;
        let m = problem.n_constraints();

        if n == 0 {
            return Ok(Array1::zeros(0));
        }

        let p_csc = triplets_to_csc(n, n, &problem.p_triplets)?;
        let a_csc = triplets_to_csc(m, n, &problem.a_triplets)?;
        let cones: Vec<SupportedConeT<f64>> = problem
            .cones
            .iter()
            .map(|cone| match *cone {
                Cone::Zero(dim) => SupportedConeT::ZeroConeT(dim),
                Cone::NonNegative(dim) => SupportedConeT::NonnegativeConeT(dim),
                Cone::SecondOrder(dim) => SupportedConeT::SecondOrderConeT(dim),
            })
            .collect();

        log::debug!(
            "clarabel: {} variables, {} constraints, {} cones, quadratic objective: {}",
            n,
            m,
            cones.len(),
            problem.is_quadratic()
        );

        let mut settings = DefaultSettings::<f64>::default();
        settings.verbose = self.verbose;

        let mut solver = DefaultSolver::new(&p_csc, &problem.q, &a_csc, &problem.b, &cones, settings);
        solver.solve();

        let status = solver.solution.status;
        match status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                if matches!(status, SolverStatus::AlmostSolved) {
                    log::warn!("clarabel reached reduced accuracy only (status {:?})", status);
                }
                let x = Array1::from(solver.solution.x.clone());
                if x.len() != n || x.iter().any(|v| !v.is_finite()) {
                    return Err(RegressionError::SolverFailed(format!(
                        "{:?} with a non-finite or truncated solution",
                        status
                    )));
                }
                Ok(x)
            }
            SolverStatus::PrimalInfeasible
            | SolverStatus::DualInfeasible
            | SolverStatus::AlmostPrimalInfeasible
            | SolverStatus::AlmostDualInfeasible => Err(RegressionError::Infeasible(format!("{:?}", status))),
            _ => Err(RegressionError::SolverFailed(format!("{:?}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    const TOL_SOLVER: f64 = 1e-5;

    #[test]
    fn test_triplets_to_csc_sorts_and_sums() {
        // [[1, 0], [2, 3]] with the (1, 1) entry split in two.
        let triplets = vec![(1, 1, 1.0), (1, 0, 2.0), (0, 0, 1.0), (1, 1, 2.0)];
        let csc = triplets_to_csc(2, 2, &triplets).unwrap();
        assert_eq!(csc.colptr, vec![0, 2, 3]);
        assert_eq!(csc.rowval, vec![0, 1, 1]);
        assert_eq!(csc.nzval, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_triplets_to_csc_empty_and_out_of_bounds() {
        let csc = triplets_to_csc(0, 3, &[]).unwrap();
        assert_eq!(csc.colptr, vec![0, 0, 0, 0]);
        assert!(triplets_to_csc(2, 2, &[(2, 0, 1.0)]).is_err());
    }

    #[test]
    fn test_builder_orders_cones() {
        let mut builder = ProblemBuilder::new(2);
        builder.add_second_order_cone(vec![(vec![(1, -1.0)], 0.0), (vec![(0, 1.0)], 1.0)]);
        builder.add_row(vec![(0, 1.0)], 2.0, ConstraintKind::GreaterThanOrEqual);
        builder.add_row(vec![(0, 1.0), (1, 1.0)], 1.0, ConstraintKind::Equals);
        let problem = builder.build();

        assert_eq!(problem.cones, vec![Cone::Zero(1), Cone::NonNegative(1), Cone::SecondOrder(2)]);
        assert_eq!(problem.n_constraints(), 4);
        // The >= row is negated into <= form.
        assert_eq!(problem.b, vec![1.0, -2.0, 0.0, 1.0]);
        assert!(problem.a_triplets.contains(&(1, 0, -1.0)));
        assert_eq!(problem.cones.iter().map(Cone::dim).sum::<usize>(), problem.n_constraints());
    }

    #[test]
    fn test_add_constraint_row_appends_aux() {
        let mut builder = ProblemBuilder::new(3);
        let row = ConstraintRow {
            a_row: arr1(&[0.0, 2.0]),
            rhs: 1.0,
            kind: ConstraintKind::LessThanOrEqual,
        };
        builder.add_constraint_row(&row, &[(2, -1.0)]);
        let problem = builder.build();
        assert_eq!(problem.a_triplets, vec![(0, 1, 2.0), (0, 2, -1.0)]);
    }

    #[test]
    fn test_clarabel_solves_small_qp() {
        // minimize (x - 1)^2 + (y - 2)^2  s.t.  x + y = 1
        // => 0.5 z'(2I)z - [2, 4]'z
        let mut builder = ProblemBuilder::new(2);
        builder.add_quadratic_cost(0, 0, 2.0);
        builder.add_quadratic_cost(1, 1, 2.0);
        builder.set_linear_cost(0, -2.0);
        builder.set_linear_cost(1, -4.0);
        builder.add_row(vec![(0, 1.0), (1, 1.0)], 1.0, ConstraintKind::Equals);

        let x = ClarabelSolver::new(false).solve(&builder.build()).unwrap();
        assert!((x[0] - 0.0).abs() < TOL_SOLVER, "x = {}", x[0]);
        assert!((x[1] - 1.0).abs() < TOL_SOLVER, "y = {}", x[1]);
    }

    #[test]
    fn test_clarabel_solves_norm_minimisation() {
        // minimize t  s.t.  ||(x - 3)|| <= t  => x = 3, t = 0
        let mut builder = ProblemBuilder::new(2);
        builder.set_linear_cost(1, 1.0);
        builder.add_second_order_cone(vec![(vec![(1, -1.0)], 0.0), (vec![(0, 1.0)], 3.0)]);

        let z = ClarabelSolver::default().solve(&builder.build()).unwrap();
        assert!((z[0] - 3.0).abs() < 1e-4);
        assert!(z[1].abs() < 1e-4);
    }

    #[test]
    fn test_clarabel_reports_infeasible() {
        // x >= 1 and x <= 0.
        let mut builder = ProblemBuilder::new(1);
        builder.set_linear_cost(0, 1.0);
        builder.add_row(vec![(0, 1.0)], 1.0, ConstraintKind::GreaterThanOrEqual);
        builder.add_row(vec![(0, 1.0)], 0.0, ConstraintKind::LessThanOrEqual);

        let result = ClarabelSolver::default().solve(&builder.build());
        assert!(matches!(result, Err(RegressionError::Infeasible(_))), "{:?}", result);
    }
}
