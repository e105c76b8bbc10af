use ndarray::{Array1, ArrayView1};

/// Evaluates a polynomial with ascending-power coefficients `[c_0, ..., c_d]`
/// at `x` using Horner's rule.
pub fn horner(coefficients: ArrayView1<f64>, x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Coefficients of the derivative of a polynomial: `c_i` becomes `i * c_i`
/// and moves down one power.
///
/// The result keeps the input length (the highest power is zero-padded) so
/// that repeated derivatives stay aligned with the original coefficient
/// layout.
pub fn derivative(coefficients: ArrayView1<f64>) -> Array1<f64> {
    let n = coefficients.len();
    let mut result = Array1::zeros(n);
    for i in 1..n {
        result[i - 1] = i as f64 * coefficients[i];
    }
    result
}

/// Linear functional mapping the coefficients of a degree-`degree` polynomial
/// to its `derivative_order`-th derivative at `x`.
///
/// Entry `k` is the value at `x` of the `derivative_order`-th derivative of the
/// monomial `x^k`, computed by differentiating the unit coefficient vector and
/// evaluating it with [`horner`]. The dot product of the returned row with a
/// coefficient vector `c` equals `p^(m)(x)`.
pub fn derivative_row(x: f64, degree: usize, derivative_order: usize) -> Array1<f64> {
    let order = degree + 1;
    let mut row = Array1::zeros(order);
    for k in derivative_order..order {
        let mut unit = Array1::zeros(order);
        unit[k] = 1.0;
        for _ in 0..derivative_order {
            unit = derivative(unit.view());
        }
        row[k] = horner(unit.view(), x);
    }
    row
}

/// Row of the Vandermonde matrix at `x`: `[1, x, x^2, ..., x^degree]`.
pub fn vandermonde_row(x: f64, degree: usize) -> Array1<f64> {
    let mut row = Array1::zeros(degree + 1);
    let mut power = 1.0;
    for k in 0..=degree {
        row[k] = power;
        power *= x;
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_horner() {
        // 1 + 2x + 3x^2
        let c = arr1(&[1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(horner(c.view(), 0.0), 1.0, epsilon = TOL);
        assert_abs_diff_eq!(horner(c.view(), 2.0), 17.0, epsilon = TOL);
        assert_abs_diff_eq!(horner(c.view(), -1.0), 2.0, epsilon = TOL);
        assert_eq!(horner(Array1::<f64>::zeros(0).view(), 3.0), 0.0);
    }

    #[test]
    fn test_derivative_keeps_length() {
        // d/dx (1 + 2x + 3x^2 + 4x^3) = 2 + 6x + 12x^2
        let c = arr1(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(derivative(c.view()), arr1(&[2.0, 6.0, 12.0, 0.0]));
        assert_eq!(derivative(arr1(&[5.0]).view()), arr1(&[0.0]));
    }

    #[test]
    fn test_derivative_row_matches_direct_evaluation() {
        let c = arr1(&[0.5, -1.0, 2.0, 0.25, -0.1, 0.03]);
        let x = 1.7;
        let mut differentiated = c.clone();
        for m in 0..=5 {
            let row = derivative_row(x, 5, m);
            assert_abs_diff_eq!(row.dot(&c), horner(differentiated.view(), x), epsilon = 1e-10);
            differentiated = derivative(differentiated.view());
        }
    }

    #[test]
    fn test_derivative_row_values() {
        // First derivative of [1, x, x^2, x^3] at x = 2: [0, 1, 4, 12]
        assert_eq!(derivative_row(2.0, 3, 1), arr1(&[0.0, 1.0, 4.0, 12.0]));
        // Second derivative: [0, 0, 2, 12]
        assert_eq!(derivative_row(2.0, 3, 2), arr1(&[0.0, 0.0, 2.0, 12.0]));
        // Derivative beyond the degree vanishes.
        assert_eq!(derivative_row(2.0, 1, 2), arr1(&[0.0, 0.0]));
        // Order zero is the Vandermonde row.
        assert_eq!(derivative_row(3.0, 2, 0), vandermonde_row(3.0, 2));
    }

    #[test]
    fn test_vandermonde_row() {
        assert_eq!(vandermonde_row(2.0, 3), arr1(&[1.0, 2.0, 4.0, 8.0]));
        assert_eq!(vandermonde_row(5.0, 0), arr1(&[1.0]));
    }
}
