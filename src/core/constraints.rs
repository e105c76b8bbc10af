//! Linear constraint systems over the flattened coefficient vector.
//!
//! Coefficients of all segments are concatenated: segment `i`, power `k` lives
//! at column `i * (degree + 1) + k`. Two families of rows are produced here:
//! continuity equalities at split points and shape inequalities (monotonic,
//! convex/concave, peak/valley) evaluated at segment ends and, for higher
//! degrees, on a grid inside each segment.

use ndarray::{s, Array1, Array2, ArrayView1};

use crate::core::config::ShapeConstraint;
use crate::core::polynomial::{derivative_row, vandermonde_row};
use crate::core::splits::SplitIndex;

/// Relation between a constraint row applied to the variables and its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `a_row * c == rhs`.
    Equals,
    /// `a_row * c <= rhs`.
    LessThanOrEqual,
    /// `a_row * c >= rhs`.
    GreaterThanOrEqual,
}

/// A single linear constraint over the coefficient vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    pub a_row: Array1<f64>,
    pub rhs: f64,
    pub kind: ConstraintKind,
}

/// Shape constraint matrix `D` with the pivot row of a two-sided trend.
///
/// For peak and valley trends `pivot` is the first row that takes the second
/// sign; it is `None` for one-sided trends.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMatrix {
    pub d: Array2<f64>,
    pub pivot: Option<usize>,
}

/// Equality and inequality rows of a fit, kept apart for cone assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    pub equalities: Vec<ConstraintRow>,
    pub inequalities: Vec<ConstraintRow>,
}

impl ConstraintSet {
    pub fn len(&self) -> usize {
        self.equalities.len() + self.inequalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Routes a row to the equality or inequality list according to its kind.
    pub fn push(&mut self, row: ConstraintRow) {
        match row.kind {
            ConstraintKind::Equals => self.equalities.push(row),
            _ => self.inequalities.push(row),
        }
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = ConstraintRow>) {
        for row in rows {
            self.push(row);
        }
    }
}

/// Writes `segment_row` into the column block of `segment` of a flattened row.
fn place(row: &mut Array1<f64>, segment: usize, segment_row: &Array1<f64>, sign: f64) {
    let order = segment_row.len();
    let mut block = row.slice_mut(s![segment * order..(segment + 1) * order]);
    block.scaled_add(sign, segment_row);
}

/// Continuity matrix: one row per split point `b` between segments `i` and
/// `i + 1`, encoding `p_i(b) - p_{i+1}(b)`.
pub fn continuity_matrix(splits: &SplitIndex, degree: usize) -> Array2<f64> {
    let order = degree + 1;
    let n_coefficients = splits.n_bins() * order;
    let mut matrix = Array2::zeros((splits.n_splits(), n_coefficients));

    for (i, &b) in splits.splits().iter().enumerate() {
        let values = vandermonde_row(b, degree);
        let mut row = Array1::zeros(n_coefficients);
        place(&mut row, i, &values, 1.0);
        place(&mut row, i + 1, &values, -1.0);
        matrix.row_mut(i).assign(&row);
    }
    matrix
}

/// Continuity equalities `p_i(b) = p_{i+1}(b)`; none when `continuous` is false.
pub fn generate_continuity_rows(splits: &SplitIndex, degree: usize, continuous: bool) -> Vec<ConstraintRow> {
    if !continuous {
        return Vec::new();
    }
    continuity_matrix(splits, degree)
        .rows()
        .into_iter()
        .map(|row| ConstraintRow {
            a_row: row.to_owned(),
            rhs: 0.0,
            kind: ConstraintKind::Equals,
        })
        .collect()
}

/// Number of grid steps per segment at which the first derivative of a
/// degree >= 3 polynomial is constrained.
pub const SHAPE_GRID_INTERVALS: usize = 100;

/// Builds the shape constraint matrix for `trend`.
///
/// Rows are grouped by segment, left to right, over segment ends from
/// [`SplitIndex::segment_ends`]:
///
/// * Monotonic trends (ascending, descending, peak, valley): the first
///   derivative at both ends of every segment (degree >= 1) and, for
///   discontinuous fits, the jump `p_i(b) - p_{i-1}(b)` entering segment `i`.
///   From degree 3 on the derivative is no longer linear, so it is also
///   constrained on a uniform grid of [`SHAPE_GRID_INTERVALS`] steps inside
///   every segment. The jump into the turning segment of a peak or valley is
///   left free: either side of the turn may hold the extremum.
/// * Curvature trends (convex, concave): the change of slope
///   `p_i'(b) - p_{i-1}'(b)` entering segment `i`, plus the second derivative at
///   both segment ends for degree >= 2.
///
/// The pivot of a peak or valley is the first row of segment `turn`.
pub fn shape_matrix(
    trend: ShapeConstraint,
    splits: &SplitIndex,
    degree: usize,
    continuous: bool,
    x_min: f64,
    x_max: f64,
) -> ShapeMatrix {
    let order = degree + 1;
    let n_bins = splits.n_bins();
    let n_coefficients = n_bins * order;
    let ends = splits.segment_ends(x_min, x_max);

    let turn = match trend {
        ShapeConstraint::Peak { turn } | ShapeConstraint::Valley { turn } => Some(turn),
        _ => None,
    };

    let mut rows: Vec<Array1<f64>> = Vec::new();
    let mut group_starts = Vec::with_capacity(n_bins);

    for (i, &(lo, hi)) in ends.iter().enumerate() {
        group_starts.push(rows.len());

        if trend.is_curvature() {
            if i > 0 {
                let b = splits.splits()[i - 1];
                let slope = derivative_row(b, degree, 1);
                let mut row = Array1::zeros(n_coefficients);
                place(&mut row, i, &slope, 1.0);
                place(&mut row, i - 1, &slope, -1.0);
                rows.push(row);
            }
            if degree >= 2 {
                for point in [lo, hi] {
                    let mut row = Array1::zeros(n_coefficients);
                    place(&mut row, i, &derivative_row(point, degree, 2), 1.0);
                    rows.push(row);
                }
            }
        } else {
            if i > 0 && !continuous && turn != Some(i) {
                let b = splits.splits()[i - 1];
                let values = vandermonde_row(b, degree);
                let mut row = Array1::zeros(n_coefficients);
                place(&mut row, i, &values, 1.0);
                place(&mut row, i - 1, &values, -1.0);
                rows.push(row);
            }
            if degree >= 1 {
                let interior = if degree >= 3 { 1..SHAPE_GRID_INTERVALS } else { 0..0 };
                let grid = interior.map(|k| lo + (hi - lo) * k as f64 / SHAPE_GRID_INTERVALS as f64);
                for point in [lo, hi].into_iter().chain(grid) {
                    let mut row = Array1::zeros(n_coefficients);
                    place(&mut row, i, &derivative_row(point, degree, 1), 1.0);
                    rows.push(row);
                }
            }
        }
    }

    let pivot = turn.map(|turn| group_starts.get(turn).copied().unwrap_or(rows.len()));

    let mut d = Array2::zeros((rows.len(), n_coefficients));
    for (i, row) in rows.iter().enumerate() {
        d.row_mut(i).assign(row);
    }

    log::trace!("shape matrix for {:?}: {} rows, pivot {:?}", trend, d.nrows(), pivot);
    ShapeMatrix { d, pivot }
}

/// Applies the sign of `trend` to the rows of `D`, producing `D c >= 0` or
/// `D c <= 0` constraints (split at the pivot for peak and valley).
pub fn generate_shape_rows(trend: ShapeConstraint, shape: &ShapeMatrix) -> Vec<ConstraintRow> {
    let pivot = shape.pivot.unwrap_or(0);
    let kind_of = |i: usize| -> ConstraintKind {
        match trend {
            ShapeConstraint::Ascending | ShapeConstraint::Convex => ConstraintKind::GreaterThanOrEqual,
            ShapeConstraint::Descending | ShapeConstraint::Concave => ConstraintKind::LessThanOrEqual,
            ShapeConstraint::Valley { .. } if i < pivot => ConstraintKind::LessThanOrEqual,
            ShapeConstraint::Valley { .. } => ConstraintKind::GreaterThanOrEqual,
            ShapeConstraint::Peak { .. } if i < pivot => ConstraintKind::GreaterThanOrEqual,
            ShapeConstraint::Peak { .. } => ConstraintKind::LessThanOrEqual,
        }
    };

    shape
        .d
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| ConstraintRow {
            a_row: row.to_owned(),
            rhs: 0.0,
            kind: kind_of(i),
        })
        .collect()
}

/// Value bounds `lb <= A_j c <= ub` at every row of the design matrix.
pub fn generate_bound_rows(design: &Array2<f64>, lb: Option<f64>, ub: Option<f64>) -> Vec<ConstraintRow> {
    let mut rows = Vec::new();
    for design_row in design.rows() {
        if let Some(lb) = lb {
            rows.push(bound_row(design_row, lb, ConstraintKind::GreaterThanOrEqual));
        }
        if let Some(ub) = ub {
            rows.push(bound_row(design_row, ub, ConstraintKind::LessThanOrEqual));
        }
    }
    rows
}

fn bound_row(design_row: ArrayView1<f64>, rhs: f64, kind: ConstraintKind) -> ConstraintRow {
    ConstraintRow {
        a_row: design_row.to_owned(),
        rhs,
        kind,
    }
}

/// Collects the continuity and shape rows of a fit.
///
/// The separated and continuous formulations share this routine; the
/// `continuous` flag only controls whether continuity equalities are emitted
/// (and, for monotonic trends, whether jump rows are needed at the splits).
pub fn generate_constraint_rows(
    splits: &SplitIndex,
    degree: usize,
    continuous: bool,
    trend: Option<ShapeConstraint>,
    x_min: f64,
    x_max: f64,
) -> ConstraintSet {
    let mut set = ConstraintSet::default();
    set.extend(generate_continuity_rows(splits, degree, continuous));
    if let Some(trend) = trend {
        let shape = shape_matrix(trend, splits, degree, continuous, x_min, x_max);
        set.extend(generate_shape_rows(trend, &shape));
    }
    set
}
