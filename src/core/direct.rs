//! Closed-form least squares.
//!
//! Used for the unconstrained `l2` fit. The separated variant solves one
//! least-squares problem per segment; the continuous variant removes the
//! continuity equalities by parametrising the coefficients over the null space
//! of the continuity matrix and solves a single least-squares problem.
//!
//! Both go through an SVD so that the numerical rank of the design is known:
//! a rank-deficient design (for instance a segment with fewer samples than
//! `degree + 1`) is reported as an error instead of being pseudo-inverted.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{Array1, Array2};

use crate::core::constraints::continuity_matrix;
use crate::core::formulation::{coefficient_table, design_matrix};
use crate::core::splits::SplitIndex;
use crate::error::{RegressionError, Result};

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Solves `min ||a z - y||_2` through an SVD, requiring full column rank.
///
/// The rank threshold is `eps * max(rows, cols) * sigma_max`.
fn solve_least_squares(a: &DMatrix<f64>, y: &DVector<f64>, segment: Option<usize>) -> Result<DVector<f64>> {
    let (n, k) = a.shape();
    if k == 0 {
        return Ok(DVector::zeros(0));
    }
    if n < k {
        return Err(RegressionError::RankDeficient { rank: n, expected: k, segment });
    }

    let svd = a.clone().svd(true, true);
    let sigma_max = svd.singular_values.max();
    let tol = f64::EPSILON * n.max(k) as f64 * sigma_max;
    let rank = svd.singular_values.iter().filter(|&&s| s > tol).count();
    if rank < k {
        return Err(RegressionError::RankDeficient { rank, expected: k, segment });
    }

    let z = svd.solve(y, tol).map_err(|e| RegressionError::SolverFailed(e.to_string()))?;
    if z.iter().any(|v| !v.is_finite()) {
        return Err(RegressionError::SolverFailed("least-squares solution is not finite".to_string()));
    }
    Ok(z)
}

/// Independent least-squares fit of every segment.
///
/// `xs` must be sorted ascending. Returns the `(n_bins, degree + 1)`
/// coefficient table.
pub fn lsq_direct_separated(
    xs: &Array1<f64>,
    ys: &Array1<f64>,
    splits: &SplitIndex,
    degree: usize,
) -> Result<Array2<f64>> {
    let order = degree + 1;
    let mut table = Array2::zeros((splits.n_bins(), order));

    for (segment, range) in splits.segment_ranges(xs).into_iter().enumerate() {
        let n = range.len();
        let a = DMatrix::from_fn(n, order, |i, k| xs[range.start + i].powi(k as i32));
        let y = DVector::from_fn(n, |i, _| ys[range.start + i]);
        log::trace!("direct solve of segment {} with {} samples", segment, n);

        let c = solve_least_squares(&a, &y, Some(segment))?;
        for k in 0..order {
            table[[segment, k]] = c[k];
        }
    }
    Ok(table)
}

/// Orthonormal basis of the null space of `c` as the columns of a matrix.
///
/// Rows of `c` are normalised first; they are linearly independent for
/// continuity matrices, so the null space has dimension `ncols - nrows`.
fn null_space(c: &Array2<f64>) -> DMatrix<f64> {
    let (m, p) = c.dim();
    if m == 0 {
        return DMatrix::identity(p, p);
    }

    let mut normalised = to_dmatrix(c);
    for mut row in normalised.row_iter_mut() {
        let norm = row.norm();
        if norm > 0.0 {
            row /= norm;
        }
    }

    let gram = normalised.transpose() * &normalised;
    let eigen = SymmetricEigen::new(gram);
    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));

    let dim = p.saturating_sub(m);
    let columns: Vec<DVector<f64>> = order[..dim]
        .iter()
        .map(|&i| eigen.eigenvectors.column(i).into_owned())
        .collect();
    if columns.is_empty() {
        DMatrix::zeros(p, 0)
    } else {
        DMatrix::from_columns(&columns)
    }
}

/// Joint least-squares fit with value continuity at every split.
///
/// The coefficients are written `c = N z` with `N` a basis of the null space
/// of the continuity matrix, which satisfies the equalities exactly, and `z`
/// minimises `||A N z - y||`.
pub fn lsq_direct(xs: &Array1<f64>, ys: &Array1<f64>, splits: &SplitIndex, degree: usize) -> Result<Array2<f64>> {
    let design = to_dmatrix(&design_matrix(xs, splits, degree));
    let y = DVector::from_iterator(ys.len(), ys.iter().copied());

    let basis = null_space(&continuity_matrix(splits, degree));
    log::trace!(
        "direct continuous solve: {} samples, {} coefficients, {} free parameters",
        xs.len(),
        basis.nrows(),
        basis.ncols()
    );

    let reduced = &design * &basis;
    let z = solve_least_squares(&reduced, &y, None)?;
    let c = &basis * z;

    Ok(coefficient_table(&Array1::from_iter(c.iter().copied()), splits.n_bins(), degree))
}
